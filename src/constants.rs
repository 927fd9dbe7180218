//! Crate-wide constants.
//!
//! Magic numbers for the port loop and the two wire protocols live here,
//! grouped by domain, so that timing and sizing decisions are visible in one
//! place.
//!
//! # Categories
//!
//! - **Port loop**: receive buffer and poll timeouts
//! - **MBIM**: control transfer sizing
//! - **Commands**: caller-side deadlines

use std::time::Duration;

// ============================================================================
// Port loop
// ============================================================================

/// Size of the per-port receive buffer.
///
/// A single MBIM fragment can never exceed the negotiated max control
/// transfer, which is far below this. An AT answer longer than this without
/// a terminator is treated as garbage and discarded.
pub const RECEIVE_BUFFER_SIZE: usize = 64 * 1024;

/// Poll timeout (and idle tick) for AT ports.
///
/// AT traffic is human-scale; 100ms keeps the idle write latency low without
/// spinning.
pub const AT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Poll timeout (and idle tick) for MBIM ports.
///
/// MBIM pipelines many commands, and each waits for an idle tick before it
/// is written, so the tick is short.
pub const MBIM_POLL_TIMEOUT: Duration = Duration::from_millis(10);

// ============================================================================
// MBIM
// ============================================================================

/// Max control transfer used when the device does not say otherwise.
pub const DEFAULT_MAX_CONTROL_TRANSFER: u32 = 4096;

// ============================================================================
// Commands
// ============================================================================

/// Default deadline for a synchronous command issued from the CLI.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mbim_tick_is_shorter_than_at_tick() {
        assert!(MBIM_POLL_TIMEOUT < AT_POLL_TIMEOUT);
    }

    #[test]
    fn test_receive_buffer_holds_a_max_transfer_fragment() {
        assert!(RECEIVE_BUFFER_SIZE >= DEFAULT_MAX_CONTROL_TRANSFER as usize);
    }
}
