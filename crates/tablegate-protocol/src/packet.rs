//! Packet kinds and the `type` discriminator codec.
//!
//! Every packet on the wire is a JSON object with a `type` field selecting
//! its concrete shape. Clients may send the discriminator either as the
//! numeric code (`{"type": 1}`) or as the symbolic name
//! (`{"type": "Ping"}`); responses always carry the numeric code.

use std::fmt;

use serde::de::{Deserializer, Error as DeError};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ProtocolError, Serial};

// ---------------------------------------------------------------------------
// PacketKind
// ---------------------------------------------------------------------------

/// The registry of packet kinds: numeric code ↔ symbolic name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Keep-alive probe; legal without any session.
    Ping,
    /// Generic acknowledgement.
    Ack,
    /// Error indicator carrying a human-readable message.
    Error,
    /// Player profile data (serial, name, locale).
    PlayerInfo,
    /// Holds the connection open for server-initiated delivery.
    LongPoll,
    /// Releases a held long poll.
    LongPollReturn,
}

impl PacketKind {
    /// The numeric wire code for this kind.
    pub const fn code(self) -> u16 {
        match self {
            Self::Ping => 1,
            Self::Ack => 2,
            Self::Error => 3,
            Self::PlayerInfo => 4,
            Self::LongPoll => 5,
            Self::LongPollReturn => 6,
        }
    }

    /// The symbolic wire name for this kind.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ping => "Ping",
            Self::Ack => "Ack",
            Self::Error => "Error",
            Self::PlayerInfo => "PlayerInfo",
            Self::LongPoll => "LongPoll",
            Self::LongPollReturn => "LongPollReturn",
        }
    }

    /// Looks up a kind by numeric code.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::Ping),
            2 => Some(Self::Ack),
            3 => Some(Self::Error),
            4 => Some(Self::PlayerInfo),
            5 => Some(Self::LongPoll),
            6 => Some(Self::LongPollReturn),
            _ => None,
        }
    }

    /// Looks up a kind by symbolic name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Ping" => Some(Self::Ping),
            "Ack" => Some(Self::Ack),
            "Error" => Some(Self::Error),
            "PlayerInfo" => Some(Self::PlayerInfo),
            "LongPoll" => Some(Self::LongPoll),
            "LongPollReturn" => Some(Self::LongPollReturn),
            _ => None,
        }
    }

    /// Long-poll kinds are exempt from the session-touch side effects that
    /// normally accompany dispatch.
    pub const fn is_long_poll(self) -> bool {
        matches!(self, Self::LongPoll | Self::LongPollReturn)
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A single wire packet.
///
/// The dispatch layer treats packets as opaque apart from their kind; the
/// fields below are the framework-level packets it needs to produce itself
/// (errors, player info) plus the kinds it must recognize (ping, long poll).
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Ping,
    Ack,
    Error { message: String },
    PlayerInfo { serial: Serial, name: String, locale: String },
    LongPoll,
    LongPollReturn,
}

impl Packet {
    /// The kind of this packet.
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Ping => PacketKind::Ping,
            Self::Ack => PacketKind::Ack,
            Self::Error { .. } => PacketKind::Error,
            Self::PlayerInfo { .. } => PacketKind::PlayerInfo,
            Self::LongPoll => PacketKind::LongPoll,
            Self::LongPollReturn => PacketKind::LongPollReturn,
        }
    }

    /// Shorthand for an error packet.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// Parses a packet from a JSON document.
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(raw).map_err(ProtocolError::Decode)?;
        Self::from_value(&value)
    }

    /// Parses a packet from an already-decoded JSON value.
    ///
    /// The `type` discriminator may be a numeric code or a symbolic name.
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let discriminator = value.get("type").ok_or_else(|| {
            ProtocolError::Malformed("packet has no type field".into())
        })?;

        let kind = match discriminator {
            Value::Number(n) => {
                let code = n.as_u64().and_then(|c| u16::try_from(c).ok());
                code.and_then(PacketKind::from_code).ok_or_else(|| {
                    ProtocolError::UnknownKind(n.to_string())
                })?
            }
            Value::String(s) => PacketKind::from_name(s)
                .ok_or_else(|| ProtocolError::UnknownKind(s.clone()))?,
            other => {
                return Err(ProtocolError::Malformed(format!(
                    "type discriminator must be a number or string, got {other}"
                )));
            }
        };

        let field_str = |name: &str| -> String {
            value
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(match kind {
            PacketKind::Ping => Self::Ping,
            PacketKind::Ack => Self::Ack,
            PacketKind::Error => Self::Error { message: field_str("message") },
            PacketKind::PlayerInfo => Self::PlayerInfo {
                serial: Serial(
                    value.get("serial").and_then(Value::as_u64).unwrap_or(0)
                        as u32,
                ),
                name: field_str("name"),
                locale: field_str("locale"),
            },
            PacketKind::LongPoll => Self::LongPoll,
            PacketKind::LongPollReturn => Self::LongPollReturn,
        })
    }
}

/// Packets serialize as `{"type": <code>, ...fields}` — always the numeric
/// code, never the symbolic name.
impl Serialize for Packet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra_fields = match self {
            Self::Error { .. } => 1,
            Self::PlayerInfo { .. } => 3,
            _ => 0,
        };
        let mut map = serializer.serialize_map(Some(1 + extra_fields))?;
        map.serialize_entry("type", &self.kind().code())?;
        match self {
            Self::Error { message } => {
                map.serialize_entry("message", message)?;
            }
            Self::PlayerInfo { serial, name, locale } => {
                map.serialize_entry("serial", serial)?;
                map.serialize_entry("name", name)?;
                map.serialize_entry("locale", locale)?;
            }
            _ => {}
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Packet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(DeError::custom)
    }
}

// =========================================================================
// Tests
// =========================================================================
