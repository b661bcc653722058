//! Peer RPC plumbing: the per-shard client half and the server half of a
//! peer connection.
//!
//! A client owns one TCP connection to one peer and correlates replies to
//! requests by sequence number. Clients are per-shard: a connection is
//! never shared across shards, so nothing here is locked.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::handshake::{HandshakeRequest, HandshakeResponse};
use super::wire::{self, STATUS_ERR, STATUS_OK};
use super::ClusterError;
use crate::constants::HANDSHAKE_WIRE_ID;
use crate::internal::prelude::*;

type Pending = Rc<RefCell<HashMap<u64, oneshot::Sender<Result<Vec<u8>>>>>>;

struct Outbound {
    id: u32,
    payload: Vec<u8>,
    reply: oneshot::Sender<Result<Vec<u8>>>,
}

/// The calling half of one peer connection, owned by one shard.
pub(crate) struct PeerClient {
    node: super::NodeDesc,
    tx: mpsc::UnboundedSender<Outbound>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl PeerClient {
    /// Dials the peer. `on_close` fires once if the connection is later
    /// observed closed by the peer; it does not fire when the client is
    /// closed locally.
    pub async fn connect(
        node: super::NodeDesc,
        on_close: Box<dyn FnOnce() + 'static>,
    ) -> Result<Self> {
        let stream = TcpStream::connect(node.addr()).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let pending: Pending = Rc::new(RefCell::new(HashMap::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        let writer = tokio::task::spawn_local(write_loop(write_half, rx, Rc::clone(&pending)));
        let reader = tokio::task::spawn_local(read_loop(node, read_half, pending, on_close));

        Ok(Self {
            node,
            tx,
            reader,
            writer,
        })
    }

    /// Issues one request, returning a future of the reply payload.
    pub fn call(&self, id: u32, payload: Vec<u8>) -> impl Future<Output = Result<Vec<u8>>> {
        let node = self.node;
        let (reply, rx) = oneshot::channel();
        let sent = self.tx.send(Outbound {
            id,
            payload,
            reply,
        });

        async move {
            if sent.is_err() {
                return Err(ClusterError::Disconnected(node).into());
            }
            rx.await.unwrap_or_else(|_| Err(ClusterError::Disconnected(node).into()))
        }
    }

    /// Performs the membership handshake over this connection.
    pub async fn handshake(&self, request: HandshakeRequest) -> Result<HandshakeResponse> {
        let reply = self.call(HANDSHAKE_WIRE_ID, request.encode()).await?;
        HandshakeResponse::decode(&reply)
    }

    /// Tears the connection down without firing `on_close`.
    pub fn close(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    pending: Pending,
) {
    let mut seq = 0u64;
    while let Some(out) = rx.recv().await {
        seq += 1;
        pending.borrow_mut().insert(seq, out.reply);
        if let Err(why) = wire::write_frame(&mut writer, out.id, seq, &out.payload).await {
            if let Some(reply) = pending.borrow_mut().remove(&seq) {
                let _ = reply.send(Err(why));
            }
            break;
        }
    }
}

async fn read_loop(
    node: super::NodeDesc,
    mut reader: OwnedReadHalf,
    pending: Pending,
    on_close: Box<dyn FnOnce() + 'static>,
) {
    loop {
        match wire::read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                let result = if frame.id == STATUS_OK {
                    Ok(frame.payload)
                } else {
                    Err(Error::Handler(String::from_utf8_lossy(&frame.payload).into_owned()))
                };
                if let Some(reply) = pending.borrow_mut().remove(&frame.seq) {
                    let _ = reply.send(result);
                }
            },
            Ok(None) => break,
            Err(why) => {
                debug!("connection to {} failed: {}", node, why);
                break;
            },
        }
    }

    for (_, reply) in pending.borrow_mut().drain() {
        let _ = reply.send(Err(ClusterError::Disconnected(node).into()));
    }
    on_close();
}

/// Serves one accepted peer connection: handshakes are answered inline,
/// user frames are dispatched through the trampoline registry, and replies
/// are written back in completion order (the sequence number correlates
/// them on the peer).
pub(crate) fn spawn_serve_connection(
    stream: TcpStream,
    on_handshake: Rc<dyn Fn(HandshakeRequest) -> HandshakeResponse>,
) {
    tokio::task::spawn_local(async move {
        if let Err(why) = stream.set_nodelay(true) {
            debug!("failed to set nodelay on an accepted connection: {}", why);
        }
        let (mut read_half, write_half) = stream.into_split();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        tokio::task::spawn_local(reply_loop(write_half, reply_rx));

        loop {
            match wire::read_frame(&mut read_half).await {
                Ok(Some(frame)) => serve_frame(frame, &on_handshake, &reply_tx),
                Ok(None) => break,
                Err(why) => {
                    debug!("peer connection failed: {}", why);
                    break;
                },
            }
        }
    });
}

fn serve_frame(
    frame: wire::Frame,
    on_handshake: &Rc<dyn Fn(HandshakeRequest) -> HandshakeResponse>,
    reply_tx: &mpsc::UnboundedSender<(u32, u64, Vec<u8>)>,
) {
    if frame.id == HANDSHAKE_WIRE_ID {
        let reply = match HandshakeRequest::decode(&frame.payload) {
            Ok(request) => (STATUS_OK, frame.seq, on_handshake(request).encode()),
            Err(why) => (STATUS_ERR, frame.seq, why.to_string().into_bytes()),
        };
        let _ = reply_tx.send(reply);
        return;
    }

    let Some(trampoline) = super::registry::lookup(frame.id) else {
        warn!("no handler registered under wire id {:#010x}", frame.id);
        let message = format!("unknown handler id {:#010x}", frame.id);
        let _ = reply_tx.send((STATUS_ERR, frame.seq, message.into_bytes()));
        return;
    };

    let reply_tx = reply_tx.clone();
    tokio::task::spawn_local(async move {
        let reply = match trampoline(frame.payload).await {
            Ok(payload) => (STATUS_OK, frame.seq, payload),
            Err(why) => (STATUS_ERR, frame.seq, why.to_string().into_bytes()),
        };
        let _ = reply_tx.send(reply);
    });
}

async fn reply_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<(u32, u64, Vec<u8>)>,
) {
    while let Some((status, seq, payload)) = rx.recv().await {
        if let Err(why) = wire::write_frame(&mut writer, status, seq, &payload).await {
            debug!("failed to write a reply frame: {}", why);
            break;
        }
    }
}
