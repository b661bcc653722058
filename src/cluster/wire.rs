//! Wire framing.
//!
//! Every message on a peer connection is a frame: a 16-byte header — `u32`
//! payload length, `u32` handler id, `u64` sequence number, little-endian —
//! followed by the payload. Requests flow one way on a connection and
//! replies the other, so the header layout is shared: in a reply the id
//! slot carries the status word instead.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::ClusterError;
use crate::constants::{FRAME_HEADER_LEN, MAX_FRAME_LEN};
use crate::internal::prelude::*;

/// Reply status: the dispatch succeeded and the payload is the encoded
/// result.
pub(crate) const STATUS_OK: u32 = 0;
/// Reply status: the dispatch failed and the payload is the rendered error.
pub(crate) const STATUS_ERR: u32 = 1;

/// One decoded frame. `id` is the handler id of a request or the status
/// word of a reply.
#[derive(Debug)]
pub(crate) struct Frame {
    pub id: u32,
    pub seq: u64,
    pub payload: Vec<u8>,
}

/// Writes one frame and flushes it.
pub(crate) async fn write_frame<W>(writer: &mut W, id: u32, seq: u64, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut header = BytesMut::with_capacity(FRAME_HEADER_LEN);
    header.put_u32_le(payload.len() as u32);
    header.put_u32_le(id);
    header.put_u64_le(seq);

    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame. Returns `None` on a clean end of stream.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {},
        Err(why) if why.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(why) => return Err(why.into()),
    }

    let mut header = &header[..];
    let len = header.get_u32_le() as usize;
    let id = header.get_u32_le();
    let seq = header.get_u64_le();

    if len > MAX_FRAME_LEN {
        return Err(ClusterError::Codec("frame exceeds the payload bound").into());
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(Frame {
        id,
        seq,
        payload,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_round_trip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, 42, 7, b"hello").await.unwrap();
        write_frame(&mut buf, 43, 8, b"").await.unwrap();

        let mut cursor = &buf[..];
        let first = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!((first.id, first.seq, first.payload.as_slice()), (42, 7, &b"hello"[..]));

        let second = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!((second.id, second.seq), (43, 8));
        assert!(second.payload.is_empty());

        assert!(read_frame(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn header_is_little_endian() {
        let mut buf = Vec::new();
        write_frame(&mut buf, 0x0102_0304, 0x1122_3344_5566_7788, b"x").await.unwrap();
        assert_eq!(&buf[0..4], &[1, 0, 0, 0]);
        assert_eq!(&buf[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&buf[8..16], &[0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]);
    }

    #[tokio::test]
    async fn oversized_frames_are_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(u32::MAX).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());

        let mut cursor = &buf[..];
        assert!(read_frame(&mut cursor).await.is_err());
    }
}
