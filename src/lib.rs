//! Cellport - cellular modem control ports.
//!
//! Drives a modem's AT command port and MBIM control channel from ordinary
//! blocking caller threads.
//!
//! # Architecture
//!
//! - **Port loop** - one thread per device endpoint, polling its descriptor
//!   and alternating between an input phase and an idle (send) phase
//! - **Correlator** - callers enqueue a command and block on it until the
//!   loop delivers an answer, a failure, or their deadline passes
//! - **Protocols** - the AT line engine and the MBIM frame engine plug into
//!   the loop through [`port::PortProtocol`]
//!
//! # Modules
//!
//! - [`queue`] - lock-protected ordered container shared by loop and callers
//! - [`port`] - port loop, pending commands, event handler registry
//! - [`mbim`] - MBIM messages, framing, port driver and procedures
//! - [`at`] - AT answer parsing and port driver
//! - [`device`] - open a device path and start a port for a role
//! - [`config`] - configuration loading/saving

pub mod at;
pub mod config;
pub mod constants;
pub mod device;
pub mod mbim;
pub mod port;
pub mod queue;

// Re-export commonly used types
pub use at::{AtAnswer, AtPort};
pub use config::Config;
pub use device::{create_port, DevicePort, PortRole};
pub use mbim::{MbimMessage, MbimPort};
pub use port::{CommandError, PortHandle, PortOptions};
pub use queue::{Queue, QueueError};
