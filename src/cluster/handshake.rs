//! The handshake exchanged on first peer contact.
//!
//! The client sends its own identity plus every peer it knows; the server
//! replies in kind, adding its shard count. Both sides then know of each
//! other's peers, which is the only gossip the membership layer does:
//! discovery is transitive through handshakes alone.

use bytes::{Buf, BufMut, BytesMut};

use super::{ClusterError, NodeDesc};
use crate::internal::prelude::*;

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct HandshakeRequest {
    /// The dialing node.
    pub origin: NodeDesc,
    /// Peers the dialing node is connected to.
    pub known_nodes: Vec<NodeDesc>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct HandshakeResponse {
    /// Peers the serving node is connected to.
    pub known_nodes: Vec<NodeDesc>,
    /// The serving node's shard count.
    pub shard_count: u32,
}

fn put_node(buf: &mut BytesMut, node: NodeDesc) {
    buf.put_u32_le(u32::from(node.ip));
    buf.put_u16_le(node.port);
}

fn get_node(buf: &mut &[u8]) -> Result<NodeDesc> {
    if buf.remaining() < 6 {
        return Err(ClusterError::Codec("truncated node descriptor").into());
    }
    let ip = buf.get_u32_le();
    let port = buf.get_u16_le();
    Ok(NodeDesc::new(ip.into(), port))
}

fn put_nodes(buf: &mut BytesMut, nodes: &[NodeDesc]) {
    buf.put_u32_le(nodes.len() as u32);
    for node in nodes {
        put_node(buf, *node);
    }
}

fn get_nodes(buf: &mut &[u8]) -> Result<Vec<NodeDesc>> {
    if buf.remaining() < 4 {
        return Err(ClusterError::Codec("truncated node list").into());
    }
    let count = buf.get_u32_le() as usize;
    if count > buf.remaining() / 6 {
        return Err(ClusterError::Codec("node list length out of bounds").into());
    }
    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        nodes.push(get_node(buf)?);
    }
    Ok(nodes)
}

impl HandshakeRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_node(&mut buf, self.origin);
        put_nodes(&mut buf, &self.known_nodes);
        buf.to_vec()
    }

    pub fn decode(mut payload: &[u8]) -> Result<Self> {
        let origin = get_node(&mut payload)?;
        let known_nodes = get_nodes(&mut payload)?;
        Ok(Self {
            origin,
            known_nodes,
        })
    }
}

impl HandshakeResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_nodes(&mut buf, &self.known_nodes);
        buf.put_u32_le(self.shard_count);
        buf.to_vec()
    }

    pub fn decode(mut payload: &[u8]) -> Result<Self> {
        let known_nodes = get_nodes(&mut payload)?;
        if payload.remaining() < 4 {
            return Err(ClusterError::Codec("truncated handshake response").into());
        }
        let shard_count = payload.get_u32_le();
        Ok(Self {
            known_nodes,
            shard_count,
        })
    }
}
