//! MBIM protocol driver for the port loop.
//!
//! # Flow
//!
//! ```text
//! caller ── MbimPort::request(msg) ──▶ queue [WaitingToSend]
//!                                        │ idle tick
//!                                        ▼
//!            encode_message(msg, next transaction id) ──▶ fd
//!                                        │ [WaitingForAnswer]
//! fd ──▶ decode_frames ──▶ Reassembler ──┤
//!                                        ├─ tid > 0 ─────────▶ command awaiting tid
//!                                        ├─ tid 0 INDICATE ──▶ handlers by CommandCode
//!                                        └─ lost chain, tid > 0 ▶ CorrelationLost
//! ```
//!
//! Commands are pipelined: every queued command is written on the next idle
//! tick and answers are matched by transaction id, in any order.

use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use super::frame::{self, decode_frames, encode_message, FunctionMessage, LostChain, MessageType, Reassembler};
use super::message::MbimMessage;
use super::procedures;
use super::services::CommandCode;
use crate::constants::{DEFAULT_COMMAND_TIMEOUT, MBIM_POLL_TIMEOUT};
use crate::port::{
    self, CommandError, CommandState, EventHandler, IdleOutcome, PortContext, PortHandle,
    PortOptions, PortProtocol,
};

/// Per-port MBIM state, owned by the port thread.
#[derive(Debug)]
pub struct MbimProtocol {
    max_control_transfer: u32,
    next_transaction_id: u32,
    reassembler: Reassembler,
}

impl MbimProtocol {
    /// New driver for a device accepting transfers up to `max_control_transfer`.
    pub fn new(max_control_transfer: u32) -> Self {
        Self {
            max_control_transfer,
            next_transaction_id: 1,
            reassembler: Reassembler::new(),
        }
    }

    fn take_transaction_id(&mut self) -> u32 {
        let id = self.next_transaction_id;
        // 0 is reserved for unsolicited indications.
        self.next_transaction_id = self.next_transaction_id.checked_add(1).unwrap_or(1);
        id
    }

    fn fail_lost_chain(port: &PortContext<'_, Self>, lost: LostChain) {
        log::warn!(
            "[mbim:{}] dropped incomplete {:?} chain tid={} after {} fragment(s)",
            port.name(),
            lost.message_type,
            lost.transaction_id,
            lost.fragments
        );
        if lost.transaction_id == 0 {
            return;
        }
        if let Some(command) = port.commands().take_first(|c| c.awaits(lost.transaction_id)) {
            command.complete(Err(CommandError::CorrelationLost));
        }
    }

    fn dispatch(port: &PortContext<'_, Self>, msg: FunctionMessage) {
        if msg.transaction_id == 0 {
            if msg.message_type == MessageType::IndicateStatus {
                Self::dispatch_indication(port, &msg);
            } else {
                log::warn!(
                    "[mbim:{}] dropping {:?} without transaction id",
                    port.name(),
                    msg.message_type
                );
            }
            return;
        }

        let tid = msg.transaction_id;
        match port.commands().take_first(|c| c.awaits(tid)) {
            Some(command) => {
                log::debug!(
                    "[mbim:{}] {:?} tid={} answers {}",
                    port.name(),
                    msg.message_type,
                    tid,
                    command.name()
                );
                command.complete(Ok(msg));
            }
            None => log::warn!(
                "[mbim:{}] no command waiting for {:?} tid={}, dropped",
                port.name(),
                msg.message_type,
                tid
            ),
        }
    }

    fn dispatch_indication(port: &PortContext<'_, Self>, msg: &FunctionMessage) {
        let Some(code) = msg.command_code() else {
            log::warn!("[mbim:{}] indication for unknown service/CID dropped", port.name());
            return;
        };
        let spawned = port
            .events()
            .dispatch(|key| *key == code, msg, &code.to_string());
        if spawned.is_empty() {
            log::info!("[mbim:{}] unhandled {code} indication", port.name());
        } else {
            log::debug!(
                "[mbim:{}] {code} indication to {} handler(s)",
                port.name(),
                spawned.len()
            );
        }
    }
}

impl PortProtocol for MbimProtocol {
    type Request = MbimMessage;
    type Response = FunctionMessage;
    type EventKey = CommandCode;
    type Event = FunctionMessage;

    fn label(&self) -> &'static str {
        "MBIM"
    }

    fn on_created(&mut self, port: &PortContext<'_, Self>) {
        port.events().register(
            "connect-event",
            CommandCode::Connect,
            procedures::log_connect_indication,
        );
    }

    fn process_input(&mut self, port: &PortContext<'_, Self>, input: &[u8]) -> usize {
        let decoded = decode_frames(input);
        for err in &decoded.errors {
            log::warn!("[mbim:{}] {err}", port.name());
        }

        for frame in decoded.frames {
            log::debug!(
                "[mbim:{}] <- {:?} tid={} frag={:?} ({} bytes)",
                port.name(),
                frame.message_type,
                frame.transaction_id,
                frame.fragment,
                frame.data.len()
            );
            let out = self.reassembler.push(frame);
            for lost in out.lost {
                Self::fail_lost_chain(port, lost);
            }
            if let Some(msg) = out.message {
                Self::dispatch(port, msg);
            }
        }
        decoded.consumed
    }

    fn process_idle(&mut self, port: &PortContext<'_, Self>) -> Result<IdleOutcome> {
        while let Some(command) = port
            .commands()
            .find_map(|c| (c.state() == CommandState::WaitingToSend).then(|| Arc::clone(c)))
        {
            let tid = self.take_transaction_id();
            let frames = match encode_message(command.request(), tid, self.max_control_transfer) {
                Ok(frames) => frames,
                Err(e) => {
                    log::error!("[mbim:{}] cannot frame {}: {e}", port.name(), command.name());
                    port.finish(&command, Err(CommandError::SendFailed(e.to_string())));
                    continue;
                }
            };

            command.assign_sequence_id(tid);
            for raw in &frames {
                log::debug!("[mbim:{}] -> {}", port.name(), frame::hex_dump(raw));
                port.write_all(raw)
                    .with_context(|| format!("writing {} (tid={tid})", command.name()))?;
            }
            command.mark_sent();
            log::debug!(
                "[mbim:{}] sent {} tid={tid} in {} fragment(s)",
                port.name(),
                command.request().describe(),
                frames.len()
            );
        }
        Ok(IdleOutcome::Finished)
    }

    fn on_exiting(&mut self, port: &PortContext<'_, Self>) {
        if let Some(lost) = self.reassembler.clear() {
            log::debug!(
                "[mbim:{}] discarding partial chain tid={} on exit",
                port.name(),
                lost.transaction_id
            );
        }
    }
}

// ─── Caller-side handle ────────────────────────────────────────────────────

/// A running MBIM port.
#[derive(Debug)]
pub struct MbimPort {
    handle: PortHandle<MbimProtocol>,
    max_control_transfer: u32,
    command_timeout: Option<Duration>,
}

impl MbimPort {
    /// Start an MBIM port loop on `fd`.
    pub fn spawn(name: &str, fd: OwnedFd, max_control_transfer: u32) -> Result<Self> {
        let options = PortOptions {
            timeout: MBIM_POLL_TIMEOUT,
            notify_only: false,
        };
        Self::with_options(name, fd, max_control_transfer, options)
    }

    /// Start an MBIM port loop with explicit loop options.
    pub fn with_options(
        name: &str,
        fd: OwnedFd,
        max_control_transfer: u32,
        options: PortOptions,
    ) -> Result<Self> {
        let handle = port::spawn(name, fd, options, MbimProtocol::new(max_control_transfer))
            .with_context(|| format!("Failed to start MBIM port {name}"))?;
        Ok(Self {
            handle,
            max_control_transfer,
            command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
        })
    }

    /// Change the deadline applied by [`Self::request`]; `None` waits forever.
    pub fn set_command_timeout(&mut self, timeout: Option<Duration>) {
        self.command_timeout = timeout;
    }

    /// Max control transfer this port frames against.
    pub fn max_control_transfer(&self) -> u32 {
        self.max_control_transfer
    }

    /// Send `msg` and wait for its function message.
    pub fn request(&self, msg: MbimMessage) -> Result<FunctionMessage, CommandError> {
        self.request_with_timeout(msg, self.command_timeout)
    }

    /// Send `msg` and wait at most `timeout` for its function message.
    pub fn request_with_timeout(
        &self,
        msg: MbimMessage,
        timeout: Option<Duration>,
    ) -> Result<FunctionMessage, CommandError> {
        let name = msg.describe();
        self.handle.call(name, msg, timeout)
    }

    /// Run `entry` on its own thread for every `code` indication.
    pub fn on_indication<F>(
        &self,
        name: &str,
        code: CommandCode,
        entry: F,
    ) -> Arc<EventHandler<CommandCode, FunctionMessage>>
    where
        F: Fn(FunctionMessage) + Send + Sync + 'static,
    {
        self.handle.events().register(name, code, entry)
    }

    /// The underlying port handle.
    pub fn handle(&self) -> &PortHandle<MbimProtocol> {
        &self.handle
    }
}
