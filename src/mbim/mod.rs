//! MBIM control channel.
//!
//! - [`services`]: service UUIDs and the `(UUID, CID)` command table
//! - [`message`]: host message builders
//! - [`frame`]: wire framing, fragmentation and reassembly
//! - [`port`]: the port-loop driver and the caller-side [`MbimPort`]
//! - [`procedures`]: init, shutdown and connect sequences
//! - [`status`]: status codes and activation states
//!
//! All multi-byte integers on the wire are little-endian.

pub mod frame;
pub mod message;
pub mod port;
pub mod procedures;
pub mod services;
pub mod status;

pub use frame::{FunctionMessage, MessageType};
pub use message::MbimMessage;
pub use port::{MbimPort, MbimProtocol};
pub use services::{CommandCode, Service};
pub use status::{ActivationState, Status};
