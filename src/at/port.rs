//! AT protocol driver for the port loop.
//!
//! Strictly one command in flight: the head of the queue is written on an
//! idle tick and nothing else is sent until its final result arrives. Lines
//! received while no command awaits an answer are unsolicited result codes.

use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use super::line::{self, AtAnswer};
use crate::constants::{AT_POLL_TIMEOUT, DEFAULT_COMMAND_TIMEOUT};
use crate::port::{
    self, CommandError, CommandState, EventHandler, IdleOutcome, PortContext, PortHandle,
    PortOptions, PortProtocol,
};

/// AT line engine. Stateless apart from what the port already holds.
#[derive(Debug, Default)]
pub struct AtProtocol;

impl AtProtocol {
    fn dispatch_urc(port: &PortContext<'_, Self>, urc: String) {
        let spawned = port
            .events()
            .dispatch(|prefix: &String| urc.starts_with(prefix.as_str()), &urc, "urc");
        if spawned.is_empty() {
            log::info!("[at:{}] URC> {urc}", port.name());
        }
    }
}

impl PortProtocol for AtProtocol {
    type Request = Vec<u8>;
    type Response = AtAnswer;
    type EventKey = String;
    type Event = String;

    fn label(&self) -> &'static str {
        "AT"
    }

    fn process_input(&mut self, port: &PortContext<'_, Self>, input: &[u8]) -> usize {
        let waiting = port
            .commands()
            .find_map(|c| (c.state() == CommandState::WaitingForAnswer).then(|| Arc::clone(c)));

        if let Some(command) = waiting {
            let Some(found) = line::find_answer(input) else {
                return 0;
            };
            log::debug!(
                "[at:{}] {} -> {} ({} bytes)",
                port.name(),
                command.name(),
                found.answer.result,
                found.consumed
            );
            port.finish(&command, Ok(found.answer));
            return found.consumed;
        }

        let (urcs, consumed) = line::take_lines(input);
        for urc in urcs {
            Self::dispatch_urc(port, urc);
        }
        consumed
    }

    fn process_idle(&mut self, port: &PortContext<'_, Self>) -> Result<IdleOutcome> {
        let Some(head) = port.commands().front() else {
            return Ok(IdleOutcome::Finished);
        };
        if head.state() != CommandState::WaitingToSend {
            return Ok(IdleOutcome::Finished);
        }

        port.write_all(head.request())
            .with_context(|| format!("writing {}", head.name()))?;
        head.mark_sent();
        log::debug!("[at:{}] sent {}", port.name(), head.name());
        Ok(IdleOutcome::Finished)
    }
}

// ─── Caller-side handle ────────────────────────────────────────────────────

/// A running AT port.
#[derive(Debug)]
pub struct AtPort {
    handle: PortHandle<AtProtocol>,
    command_timeout: Option<Duration>,
}

impl AtPort {
    /// Start an AT port loop on `fd`.
    pub fn spawn(name: &str, fd: OwnedFd) -> Result<Self> {
        let options = PortOptions {
            timeout: AT_POLL_TIMEOUT,
            notify_only: false,
        };
        Self::with_options(name, fd, options)
    }

    /// Start an AT port loop with explicit loop options.
    pub fn with_options(name: &str, fd: OwnedFd, options: PortOptions) -> Result<Self> {
        let handle = port::spawn(name, fd, options, AtProtocol)
            .with_context(|| format!("Failed to start AT port {name}"))?;
        Ok(Self {
            handle,
            command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
        })
    }

    /// Change the deadline applied by [`Self::send`]; `None` waits forever.
    pub fn set_command_timeout(&mut self, timeout: Option<Duration>) {
        self.command_timeout = timeout;
    }

    /// Send `command` and wait for its final result.
    ///
    /// Trailing line endings are replaced by a single carriage return.
    pub fn send(&self, command: &str) -> Result<AtAnswer, CommandError> {
        self.send_with_timeout(command, self.command_timeout)
    }

    /// Like [`Self::send`] with an explicit deadline.
    pub fn send_with_timeout(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<AtAnswer, CommandError> {
        let name = command.trim_end_matches(['\r', '\n']).to_string();
        self.handle
            .call(name, line::normalize_command(command), timeout)
    }

    /// Run `entry` on its own thread for every URC starting with `prefix`.
    pub fn on_urc<F>(&self, name: &str, prefix: &str, entry: F) -> Arc<EventHandler<String, String>>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.handle.events().register(name, prefix.to_string(), entry)
    }

    /// The underlying port handle.
    pub fn handle(&self) -> &PortHandle<AtProtocol> {
        &self.handle
    }
}
