//! SwarmQ Wire Protocol
//!
//! Framing primitives shared by every SwarmQ TCP dialect

pub mod command;
pub mod errors;
pub mod frame;
pub mod wire;

pub use command::*;
pub use errors::*;
pub use frame::*;
pub use wire::*;

/// Protocol magic: the first four bytes sent on every new connection select
/// the dialect spoken for the rest of the stream.
pub const MAGIC_V1: &[u8; 4] = b"  V1";
