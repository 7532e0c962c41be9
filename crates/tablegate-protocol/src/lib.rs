//! Wire packets for Tablegate.
//!
//! This crate defines the "language" that clients and cooperating front-end
//! processes speak:
//!
//! - **Types** ([`Packet`], [`PacketKind`], [`Serial`], [`TableId`],
//!   [`GameId`]) — the message structures and identities that travel on
//!   the wire.
//! - **Discriminator codec** — every packet is a JSON object whose `type`
//!   field is either the numeric code or the symbolic name of its kind;
//!   decoding accepts both, encoding always emits the numeric code.
//! - **Response framing** ([`frame_response`]) — outgoing packets are
//!   serialized as a JSON array, optionally wrapped in a JSONP callback.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while encoding
//!   or decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and session
//! (player identity). It doesn't know about connections or sessions —
//! it only knows how to turn packets into JSON and back.
//!
//! ```text
//! Transport (bytes) → Protocol (Packet) → Dispatch (session context)
//! ```

mod error;
mod frame;
mod packet;
mod types;

pub use error::ProtocolError;
pub use frame::frame_response;
pub use packet::{Packet, PacketKind};
pub use types::{GameId, Serial, TableId};
