//! AT command channel.
//!
//! Commands are ASCII lines ending in `\r`. Answers are newline-terminated
//! lines closed by one of the [`line::TERMINATORS`]; anything arriving while
//! no command waits for an answer is an unsolicited result code (URC),
//! handed to handlers registered by line prefix or logged.

pub mod line;
pub mod port;

pub use line::{AtAnswer, ResultCode};
pub use port::{AtPort, AtProtocol};
