//! Wire protocol.
//!
//! Every message is one JSON object carrying a `"type"` discriminator:
//! - Client -> server: `Join`, `UpdatePosition`, `Leave`.
//! - Server -> client: `GameState`, `PlayerJoined`, `PlayerMoved`,
//!   `PlayerLeft`, `Error`.
//!
//! Inbound decoding is two-phase. The discriminator is read into a minimal
//! envelope first; only recognised kinds are re-parsed into their full shape.
//! Unrecognised kinds decode to [`ServerEvent::Unknown`] so newer servers can
//! add messages without breaking older clients.
//!
//! On stream transports each message travels in a length-prefixed frame
//! (`u32` big-endian length, then the JSON payload).

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};

use crate::math::Vec3;

/// Largest accepted frame payload.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Server-assigned player identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        PlayerId(s.to_string())
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One player entry inside a `GameState` snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl PlayerSnapshot {
    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

/// Client -> server messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientIntent {
    Join { player_name: String },
    UpdatePosition { x: f32, y: f32, z: f32 },
    Leave,
}

impl ClientIntent {
    pub fn update_position(pos: Vec3) -> Self {
        ClientIntent::UpdatePosition {
            x: pos.x,
            y: pos.y,
            z: pos.z,
        }
    }
}

/// Server -> client messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Authoritative full roster; replaces everything known so far.
    GameState { players: Vec<PlayerSnapshot> },
    PlayerJoined {
        player_id: PlayerId,
        player_name: String,
        x: f32,
        y: f32,
        z: f32,
    },
    PlayerMoved {
        player_id: PlayerId,
        x: f32,
        y: f32,
        z: f32,
    },
    PlayerLeft { player_id: PlayerId },
    Error { message: String },
    /// Structurally valid message with a discriminator this client does not know.
    ///
    /// Only ever produced by [`decode`]; it has no wire form of its own.
    #[serde(skip)]
    Unknown { kind: String },
}

impl ServerEvent {
    /// Discriminators that [`decode`] parses in full.
    pub const KNOWN_KINDS: [&'static str; 5] = [
        "GameState",
        "PlayerJoined",
        "PlayerMoved",
        "PlayerLeft",
        "Error",
    ];

    /// Returns the discriminator of this message.
    pub fn kind(&self) -> &str {
        match self {
            ServerEvent::GameState { .. } => "GameState",
            ServerEvent::PlayerJoined { .. } => "PlayerJoined",
            ServerEvent::PlayerMoved { .. } => "PlayerMoved",
            ServerEvent::PlayerLeft { .. } => "PlayerLeft",
            ServerEvent::Error { .. } => "Error",
            ServerEvent::Unknown { kind } => kind,
        }
    }
}

/// Inbound payload could not be understood.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Minimal first-phase view of an inbound message.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Serializes a client message to its textual wire form.
pub fn encode(intent: &ClientIntent) -> Bytes {
    // Plain strings and floats only; serde_json cannot fail on these.
    let payload = serde_json::to_vec(intent).expect("client intent serializes");
    Bytes::from(payload)
}

/// Parses one inbound message.
pub fn decode(payload: &[u8]) -> Result<ServerEvent, DecodeError> {
    let envelope: Envelope =
        serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    if !ServerEvent::KNOWN_KINDS.contains(&envelope.kind.as_str()) {
        return Ok(ServerEvent::Unknown {
            kind: envelope.kind,
        });
    }

    serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed(e.to_string()))
}

/// Transport-level failures reported by channels.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("channel not open")]
    NotOpen,

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("connection closed")]
    Closed,
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(payload);
    writer
        .write_all(&buf)
        .await
        .map_err(|e| TransportError::Io(e.to_string()))
}

/// Reads one length-prefixed frame.
///
/// A clean end of stream before the length prefix yields [`TransportError::Closed`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(TransportError::Closed)
        }
        Err(e) => return Err(TransportError::Io(e.to_string())),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?;
    Ok(Bytes::from(payload))
}

/// Framed TCP stream, used by hosts and tools that talk the protocol directly.
#[derive(Debug)]
pub struct FramedConn {
    stream: TcpStream,
}

impl FramedConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn send(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        write_frame(&mut self.stream, payload)
            .await
            .context("tcp write frame")
    }

    pub async fn send_json<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg).context("serialize msg")?;
        self.send(&payload).await
    }

    pub async fn recv(&mut self) -> anyhow::Result<Bytes> {
        read_frame(&mut self.stream)
            .await
            .context("tcp read frame")
    }

    pub async fn recv_intent(&mut self) -> anyhow::Result<ClientIntent> {
        let payload = self.recv().await?;
        serde_json::from_slice(&payload).context("deserialize client intent")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_encodes_with_discriminator() {
        let bytes = encode(&ClientIntent::Join {
            player_name: "Alice".to_string(),
        });
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "Join");
        assert_eq!(value["player_name"], "Alice");
    }

    #[test]
    fn update_position_encodes_flat_fields() {
        let bytes = encode(&ClientIntent::update_position(Vec3::new(10.5, 20.25, -3.0)));
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "UpdatePosition");
        assert_eq!(value["x"], 10.5);
        assert_eq!(value["y"], 20.25);
        assert_eq!(value["z"], -3.0);
    }

    #[test]
    fn decodes_game_state_with_integer_coordinates() {
        let raw = br#"{"type":"GameState","players":[
            {"id":"p1","name":"Alice","x":0,"y":0,"z":0},
            {"id":"p2","name":"Bob","x":1,"y":0,"z":0}]}"#;
        match decode(raw).unwrap() {
            ServerEvent::GameState { players } => {
                assert_eq!(players.len(), 2);
                assert_eq!(players[1].id, PlayerId::from("p2"));
                assert_eq!(players[1].position(), Vec3::new(1.0, 0.0, 0.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decodes_player_moved() {
        let raw = br#"{"type":"PlayerMoved","player_id":"p2","x":5,"y":0,"z":0}"#;
        assert_eq!(
            decode(raw).unwrap(),
            ServerEvent::PlayerMoved {
                player_id: PlayerId::from("p2"),
                x: 5.0,
                y: 0.0,
                z: 0.0,
            }
        );
    }

    #[test]
    fn unknown_discriminator_is_not_an_error() {
        let raw = br#"{"type":"ChatMessage","text":"hi"}"#;
        assert_eq!(
            decode(raw).unwrap(),
            ServerEvent::Unknown {
                kind: "ChatMessage".to_string()
            }
        );
    }

    #[test]
    fn missing_field_is_malformed() {
        let raw = br#"{"type":"PlayerMoved","player_id":"p2","x":5}"#;
        assert!(matches!(decode(raw), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn missing_discriminator_is_malformed() {
        assert!(matches!(
            decode(br#"{"player_id":"p2"}"#),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(decode(b"not json"), Err(DecodeError::Malformed(_))));
    }

    #[tokio::test]
    async fn frames_roundtrip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"{\"type\":\"Leave\"}").await.unwrap();
        let frame = read_frame(&mut b).await.unwrap();
        assert_eq!(&frame[..], b"{\"type\":\"Leave\"}");

        drop(a);
        assert_eq!(read_frame(&mut b).await, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes())
            .await
            .unwrap();
        assert_eq!(
            read_frame(&mut b).await,
            Err(TransportError::FrameTooLarge(MAX_FRAME_LEN + 1))
        );
    }
}
