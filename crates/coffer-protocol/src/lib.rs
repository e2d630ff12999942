//! coffer-protocol: the binary command protocol spoken between nodes.
//!
//! Every inter-node message is a [`Command`] request answered by one
//! [`Reply`]. Both are encoded in a compact tag-byte binary format and
//! carried in length-prefixed frames over TCP.
//!
//! Compatibility matters: every node in an ensemble must speak the same
//! encoding, so tags and field layouts are append-only.

pub mod codec;
pub mod command;
pub mod membership;
pub mod reply;
mod wire;

pub use codec::{read_frame, write_frame, MAX_FRAME_SIZE};
pub use command::Command;
pub use membership::{Member, View};
pub use reply::Reply;
