//! Networking primitives.
//!
//! Goals:
//! - Provide a reliable channel with length-prefixed JSON frames over TCP.
//! - Provide the message types exchanged between client and server, in the
//!   JSON shape clients consume (`conn`, `connRes`, `clientAct`, `scene`...).
//! - Keep serialization explicit and versionable.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use crate::prop::{Drawable, NameTagged, Positioned, PropId, PropPatch};

static NEXT_CLIENT_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u32);

impl ClientId {
    pub fn new_unique() -> Self {
        ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Input action codes a client can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionCode {
    Left,
    Right,
    Jump,
    Fire,
    Duck,
}

/// Whether an action key went down or up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pressed,
    Released,
}

/// Verdict of a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnStatus {
    Allowed,
    Restricted,
}

/// Payload of a `clientAct` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAct {
    pub code: ActionCode,
    pub status: ActionStatus,
}

/// Projection of a drawable prop for `load` lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropSnapshot {
    pub id: PropId,
    pub drawable: Drawable,
    pub positioned: Positioned,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_tagged: Option<NameTagged>,
}

/// Network-facing payload describing either a full snapshot (`load` only,
/// sent once to a newly connected client) or an incremental delta
/// (loads/updates/deletes, broadcast every tick). Fields are omitted, not
/// null, when empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OutboundBatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<Vec<PropSnapshot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<HashMap<PropId, PropPatch>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Vec<PropId>>,
}

impl OutboundBatch {
    pub fn is_empty(&self) -> bool {
        self.load.is_none() && self.update.is_none() && self.delete.is_none()
    }
}

/// Addressing for an outbound batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchTarget {
    /// Broadcast to every connected client.
    All,
    /// Deliver to a single client only.
    Client(ClientId),
}

/// High-level message envelope, internally tagged by a `name` field so
/// existing JSON consumers can dispatch on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum NetMsg {
    /// Client -> server: connection request.
    #[serde(rename_all = "camelCase")]
    Conn { client_name: String },
    /// Server -> client: connection verdict.
    #[serde(rename_all = "camelCase")]
    ConnRes {
        status: ConnStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
        #[serde(rename = "clientID", skip_serializing_if = "Option::is_none")]
        client_id: Option<ClientId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name_tag: Option<String>,
    },
    /// Explicit disconnect, either direction.
    Disc {
        #[serde(rename = "clientID")]
        client_id: ClientId,
    },
    /// Server -> client: request arrived before a successful handshake.
    NotReg,
    /// Client -> server: input action.
    ClientAct {
        #[serde(rename = "clientID")]
        client_id: ClientId,
        data: ClientAct,
    },
    /// Server -> client: scene state batch (full snapshot or delta).
    Scene {
        #[serde(rename = "clientID")]
        client_id: ClientId,
        data: OutboundBatch,
    },
}

fn frame(msg: &NetMsg) -> anyhow::Result<BytesMut> {
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> anyhow::Result<NetMsg> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .context("tcp read len")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream
        .read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    serde_json::from_slice(&payload).context("deserialize msg")
}

async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, msg: &NetMsg) -> anyhow::Result<()> {
    let buf = frame(msg)?;
    stream.write_all(&buf).await.context("tcp write")?;
    Ok(())
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        write_frame(&mut self.stream, msg).await
    }

    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        read_frame(&mut self.stream).await
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into independently owned read and write halves, so a server can
    /// run a reader task and a writer task per connection.
    pub fn into_split(self) -> (ReliableReader, ReliableWriter) {
        let (read, write) = self.stream.into_split();
        (ReliableReader { stream: read }, ReliableWriter { stream: write })
    }
}

/// Read half of a split [`ReliableConn`].
#[derive(Debug)]
pub struct ReliableReader {
    stream: OwnedReadHalf,
}

impl ReliableReader {
    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        read_frame(&mut self.stream).await
    }
}

/// Write half of a split [`ReliableConn`].
#[derive(Debug)]
pub struct ReliableWriter {
    stream: OwnedWriteHalf,
}

impl ReliableWriter {
    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        write_frame(&mut self.stream, msg).await
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Convenience codec helpers.
pub fn encode_to_bytes(msg: &NetMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<NetMsg> {
    serde_json::from_slice(b).context("deserialize")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netmsg_roundtrip_bytes() {
        let msg = NetMsg::Conn {
            client_name: "Bob".into(),
        };
        let bytes = encode_to_bytes(&msg).unwrap();
        let back = decode_from_bytes(&bytes).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn messages_use_tagged_wire_names() {
        let msg = NetMsg::ClientAct {
            client_id: ClientId(3),
            data: ClientAct {
                code: ActionCode::Left,
                status: ActionStatus::Pressed,
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["name"], "clientAct");
        assert_eq!(json["data"]["code"], "left");
        assert_eq!(json["data"]["status"], "pressed");

        let res = NetMsg::ConnRes {
            status: ConnStatus::Allowed,
            cause: None,
            client_id: Some(ClientId(7)),
            name_tag: Some("Bob".into()),
        };
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["name"], "connRes");
        assert_eq!(json["status"], "allowed");
        assert_eq!(json["clientID"], 7);
        assert!(json.get("cause").is_none());
    }

    #[test]
    fn empty_batch_fields_are_omitted() {
        let batch = OutboundBatch {
            delete: Some(vec![PropId("prop_1".into())]),
            ..Default::default()
        };
        let json = serde_json::to_value(&batch).unwrap();
        assert!(json.get("load").is_none());
        assert!(json.get("update").is_none());
        assert_eq!(json["delete"][0], "prop_1");
    }
}
