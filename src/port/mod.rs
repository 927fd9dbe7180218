//! Per-port event loop.
//!
//! One thread per modem endpoint owns the descriptor and multiplexes
//! descriptor I/O against synchronous requests coming from arbitrary caller
//! threads. The wire protocol is pluggable through [`PortProtocol`]; the AT
//! line engine and the MBIM frame engine are the two implementations.
//!
//! # Loop
//!
//! ```text
//!            ┌──────────── terminate requested ──────────────┐
//!            ▼                                               │
//! on_created → poll(fd, timeout) ─┬─ timeout ──▶ process_idle ┤ Continue / Finished
//!                                 │                           └─ Terminate ──┐
//!                                 ├─ input ────▶ read → process_input        │
//!                                 │              (residue shifts to front)   │
//!                                 └─ err/hup ──────────────────────────────┐ │
//!                                                                          ▼ ▼
//!                                   on_exiting → fail queued commands → close fd
//! ```
//!
//! The loop only ever suspends inside `poll`. Writes happen from the idle
//! phase; reads are accumulated in a bounded receive buffer and handed to the
//! protocol, which reports how many leading bytes it consumed.
//!
//! Transport errors are fatal to the port and come back as the `Err` of
//! [`PortHandle::join`]. Commands still queued at that point fail with
//! [`CommandError::PortClosed`].

// Rust guideline compliant 2026-02

pub mod command;
pub mod events;
pub mod fd;

use std::io;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

pub use command::{CommandError, CommandState, PendingCommand};
pub use events::{EventHandler, EventRegistry};

use crate::constants::RECEIVE_BUFFER_SIZE;
use crate::queue::Queue;
use fd::{Descriptor, Readiness};

/// What the idle phase decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// Keep looping.
    Continue,
    /// Nothing left to do this tick.
    Finished,
    /// Stop the loop cleanly.
    Terminate,
}

/// Capability interface every wire protocol implements.
///
/// All four hooks run on the port thread.
pub trait PortProtocol: Send + Sized + 'static {
    /// Request payload carried by a [`PendingCommand`].
    type Request: Send + Sync + 'static;
    /// Response delivered to the waiting caller.
    type Response: Send + 'static;
    /// Key unsolicited-event handlers register against.
    type EventKey: Send + Sync + 'static;
    /// Unsolicited event handed to matching handlers.
    type Event: Clone + Send + 'static;

    /// Short protocol label for logs ("AT", "MBIM").
    fn label(&self) -> &'static str;

    /// Called once before the first poll.
    fn on_created(&mut self, _port: &PortContext<'_, Self>) {}

    /// Consume buffered input and return how many leading bytes were used.
    ///
    /// Notify-only ports are called with an empty slice whenever the
    /// descriptor signals readiness.
    fn process_input(&mut self, port: &PortContext<'_, Self>, input: &[u8]) -> usize;

    /// Called whenever a poll interval passes with no input.
    ///
    /// An `Err` is a transport failure and ends the loop.
    fn process_idle(&mut self, port: &PortContext<'_, Self>) -> Result<IdleOutcome>;

    /// Called once after the loop stops, before queued commands are failed.
    fn on_exiting(&mut self, _port: &PortContext<'_, Self>) {}
}

/// Command type queued on a port running protocol `P`.
pub type PortCommand<P> =
    PendingCommand<<P as PortProtocol>::Request, <P as PortProtocol>::Response>;

/// State shared between a port's thread and its callers.
struct PortShared<P: PortProtocol> {
    name: String,
    commands: Queue<PortCommand<P>>,
    events: EventRegistry<P::EventKey, P::Event>,
    terminate: AtomicBool,
}

impl<P: PortProtocol> PortShared<P> {
    fn new(name: String) -> Self {
        Self {
            name,
            commands: Queue::new(),
            events: EventRegistry::default(),
            terminate: AtomicBool::new(false),
        }
    }
}

/// View of the port handed to protocol hooks.
pub struct PortContext<'a, P: PortProtocol> {
    shared: &'a PortShared<P>,
    fd: &'a Descriptor,
    timeout: Duration,
}

impl<P: PortProtocol> std::fmt::Debug for PortContext<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortContext")
            .field("name", &self.shared.name)
            .field("fd", &self.fd.raw())
            .finish_non_exhaustive()
    }
}

impl<P: PortProtocol> PortContext<'_, P> {
    /// Port name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The pending command queue.
    pub fn commands(&self) -> &Queue<PortCommand<P>> {
        &self.shared.commands
    }

    /// The unsolicited event handler registry.
    pub fn events(&self) -> &EventRegistry<P::EventKey, P::Event> {
        &self.shared.events
    }

    /// Remove `command` from the queue and deliver its outcome.
    ///
    /// Returns `false` if the command was no longer queued (timed out or
    /// cancelled by its caller in the meantime).
    pub fn finish(
        &self,
        command: &Arc<PortCommand<P>>,
        outcome: Result<P::Response, CommandError>,
    ) -> bool {
        if self.shared.commands.remove(command).is_err() {
            log::debug!("[port:{}] {} already detached", self.name(), command.name());
            return false;
        }
        command.complete(outcome)
    }

    /// Write `data` to the descriptor, blocking until all of it is out.
    pub fn write_all(&self, data: &[u8]) -> io::Result<()> {
        self.fd.write_all(data, self.timeout)
    }
}

/// Loop configuration.
#[derive(Debug, Clone, Copy)]
pub struct PortOptions {
    /// Poll timeout; also the idle tick period.
    pub timeout: Duration,
    /// Readiness-only port: input is not read, `process_input` gets `&[]`.
    pub notify_only: bool,
}

/// Caller-side handle to a running port.
///
/// Dropping the handle requests termination and joins the port thread.
pub struct PortHandle<P: PortProtocol> {
    shared: Arc<PortShared<P>>,
    thread: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl<P: PortProtocol> std::fmt::Debug for PortHandle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortHandle")
            .field("name", &self.shared.name)
            .field("pending", &self.shared.commands.len())
            .field("closed", &self.shared.commands.is_closed())
            .finish()
    }
}

/// Start a port loop thread on `fd`.
///
/// The descriptor is switched to non-blocking mode and is owned by the port
/// thread from here on; it is closed when the loop exits.
pub fn spawn<P: PortProtocol>(
    name: impl Into<String>,
    fd: OwnedFd,
    options: PortOptions,
    protocol: P,
) -> Result<PortHandle<P>> {
    let name = name.into();
    let descriptor = Descriptor::new(fd)
        .with_context(|| format!("Failed to configure descriptor for port {name}"))?;
    let shared = Arc::new(PortShared::new(name.clone()));

    let loop_shared = Arc::clone(&shared);
    let thread = thread::Builder::new()
        .name(format!("port-{name}"))
        .spawn(move || run_loop(&loop_shared, &descriptor, options, protocol))
        .with_context(|| format!("Failed to spawn thread for port {name}"))?;

    Ok(PortHandle {
        shared,
        thread: Mutex::new(Some(thread)),
    })
}

impl<P: PortProtocol> PortHandle<P> {
    /// Port name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Queue `request` without waiting for the answer.
    pub fn submit(
        &self,
        name: impl Into<String>,
        request: P::Request,
    ) -> Result<Arc<PortCommand<P>>, CommandError> {
        let command = PendingCommand::new(name, request);
        command::submit(&self.shared.commands, &command)?;
        Ok(command)
    }

    /// Send `request` and block until the answer, a failure, or `timeout`.
    pub fn call(
        &self,
        name: impl Into<String>,
        request: P::Request,
        timeout: Option<Duration>,
    ) -> Result<P::Response, CommandError> {
        let command = PendingCommand::new(name, request);
        command::call(&self.shared.commands, &command, timeout)
    }

    /// Withdraw a command returned by [`Self::submit`].
    pub fn cancel(&self, command: &Arc<PortCommand<P>>) -> bool {
        command::cancel(&self.shared.commands, command)
    }

    /// Unsolicited event handler registry.
    pub fn events(&self) -> &EventRegistry<P::EventKey, P::Event> {
        &self.shared.events
    }

    /// Number of commands still queued.
    pub fn pending(&self) -> usize {
        self.shared.commands.len()
    }

    /// Whether the loop has exited.
    pub fn is_closed(&self) -> bool {
        self.shared.commands.is_closed()
    }

    /// Ask the loop to stop at its next iteration.
    pub fn terminate(&self) {
        self.shared.terminate.store(true, Ordering::Release);
    }

    /// Wait for the loop thread to end and return how it ended.
    ///
    /// A second call returns `Ok(())`.
    pub fn join(&self) -> Result<()> {
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match thread {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("port {} thread panicked", self.shared.name))?,
            None => Ok(()),
        }
    }
}

impl<P: PortProtocol> Drop for PortHandle<P> {
    fn drop(&mut self) {
        self.terminate();
        if let Err(e) = self.join() {
            log::debug!("[port:{}] exited with: {e:#}", self.shared.name);
        }
    }
}

// ─── Loop ──────────────────────────────────────────────────────────────────

fn run_loop<P: PortProtocol>(
    shared: &PortShared<P>,
    fd: &Descriptor,
    options: PortOptions,
    mut protocol: P,
) -> Result<()> {
    let port = PortContext {
        shared,
        fd,
        timeout: options.timeout,
    };
    log::info!(
        "[port:{}] {} loop started on fd {}",
        shared.name,
        protocol.label(),
        fd.raw()
    );

    protocol.on_created(&port);
    let result = drive(&port, options, &mut protocol);
    match &result {
        Ok(()) => log::info!("[port:{}] loop terminated", shared.name),
        Err(e) => log::error!("[port:{}] loop failed: {e:#}", shared.name),
    }
    protocol.on_exiting(&port);

    command::fail_all(shared.commands.close(), &CommandError::PortClosed);
    result
}

fn drive<P: PortProtocol>(
    port: &PortContext<'_, P>,
    options: PortOptions,
    protocol: &mut P,
) -> Result<()> {
    let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
    let mut filled = 0usize;

    loop {
        if port.shared.terminate.load(Ordering::Acquire) {
            log::debug!("[port:{}] terminate requested", port.name());
            return Ok(());
        }

        match port.fd.wait_readable(options.timeout).context("poll failed")? {
            Readiness::Timeout => match protocol.process_idle(port)? {
                IdleOutcome::Continue | IdleOutcome::Finished => {}
                IdleOutcome::Terminate => return Ok(()),
            },
            Readiness::Hangup(revents) => {
                bail!("descriptor error or hangup (revents=0x{revents:x})");
            }
            Readiness::Ready if options.notify_only => {
                protocol.process_input(port, &[]);
            }
            Readiness::Ready => {
                let n = match port.fd.read(&mut buf[filled..]) {
                    Ok(0) => bail!("end of stream"),
                    Ok(n) => n,
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                        ) =>
                    {
                        continue
                    }
                    Err(e) => return Err(e).context("read failed"),
                };
                filled += n;

                let consumed = protocol.process_input(port, &buf[..filled]).min(filled);
                buf.copy_within(consumed..filled, 0);
                filled -= consumed;

                if filled == buf.len() {
                    log::warn!(
                        "[port:{}] receive buffer full with no complete unit, discarding {filled} bytes",
                        port.name()
                    );
                    filled = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::sync::mpsc;

    /// Echo protocol: a request is written verbatim, each input byte answers
    /// the head command with that byte.
    struct ByteEcho {
        created: mpsc::Sender<&'static str>,
    }

    impl PortProtocol for ByteEcho {
        type Request = Vec<u8>;
        type Response = u8;
        type EventKey = ();
        type Event = ();

        fn label(&self) -> &'static str {
            "ECHO"
        }

        fn on_created(&mut self, _port: &PortContext<'_, Self>) {
            self.created.send("created").unwrap();
        }

        fn process_input(&mut self, port: &PortContext<'_, Self>, input: &[u8]) -> usize {
            for byte in input {
                if let Some(cmd) = port.commands().front() {
                    port.finish(&cmd, Ok(*byte));
                }
            }
            input.len()
        }

        fn process_idle(&mut self, port: &PortContext<'_, Self>) -> Result<IdleOutcome> {
            if let Some(cmd) = port.commands().front() {
                if cmd.state() == CommandState::WaitingToSend {
                    port.write_all(cmd.request())?;
                    cmd.mark_sent();
                }
            }
            Ok(IdleOutcome::Finished)
        }

        fn on_exiting(&mut self, _port: &PortContext<'_, Self>) {
            self.created.send("exiting").unwrap();
        }
    }

    fn options() -> PortOptions {
        PortOptions {
            timeout: Duration::from_millis(5),
            notify_only: false,
        }
    }

    fn start() -> (PortHandle<ByteEcho>, UnixStream, mpsc::Receiver<&'static str>) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let (tx, rx) = mpsc::channel();
        let port = spawn("echo", OwnedFd::from(ours), options(), ByteEcho { created: tx }).unwrap();
        assert_eq!(rx.recv().unwrap(), "created");
        (port, theirs, rx)
    }

    #[test]
    fn call_round_trips_through_descriptor() {
        let (port, mut device, _rx) = start();
        let device_thread = thread::spawn(move || {
            let mut req = [0u8; 3];
            device.read_exact(&mut req).unwrap();
            assert_eq!(&req, b"abc");
            device.write_all(b"Z").unwrap();
            device
        });

        let answer = port.call("probe", b"abc".to_vec(), Some(Duration::from_secs(5)));
        assert_eq!(answer, Ok(b'Z'));
        let _device = device_thread.join().unwrap();
    }

    #[test]
    fn terminate_is_clean_and_runs_exit_hook() {
        let (port, _device, rx) = start();
        port.terminate();
        port.join().unwrap();
        assert_eq!(rx.recv().unwrap(), "exiting");
        assert!(port.is_closed());
    }

    #[test]
    fn hangup_fails_pending_commands() {
        let (port, device, _rx) = start();
        let cmd = port.submit("orphan", b"x".to_vec()).unwrap();
        drop(device);

        assert_eq!(cmd.wait(Some(Duration::from_secs(5))), Err(CommandError::PortClosed));
        assert!(port.join().is_err());
        assert_eq!(
            port.call("late", b"y".to_vec(), None),
            Err(CommandError::PortClosed)
        );
    }

    #[test]
    fn residue_is_kept_until_consumed() {
        struct Pairs(mpsc::Sender<Vec<u8>>);
        impl PortProtocol for Pairs {
            type Request = ();
            type Response = ();
            type EventKey = ();
            type Event = ();
            fn label(&self) -> &'static str {
                "PAIRS"
            }
            fn process_input(&mut self, _port: &PortContext<'_, Self>, input: &[u8]) -> usize {
                let whole = input.len() / 2 * 2;
                for pair in input[..whole].chunks(2) {
                    self.0.send(pair.to_vec()).unwrap();
                }
                whole
            }
            fn process_idle(&mut self, _port: &PortContext<'_, Self>) -> Result<IdleOutcome> {
                Ok(IdleOutcome::Continue)
            }
        }

        let (ours, mut device) = UnixStream::pair().unwrap();
        let (tx, rx) = mpsc::channel();
        let port = spawn("pairs", OwnedFd::from(ours), options(), Pairs(tx)).unwrap();

        device.write_all(b"abc").unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), b"ab");
        device.write_all(b"d").unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), b"cd");

        port.terminate();
        port.join().unwrap();
    }

    #[test]
    fn notify_only_port_leaves_input_unread() {
        struct Notified {
            seen: mpsc::Sender<(usize, Vec<u8>)>,
            reported: bool,
        }
        impl PortProtocol for Notified {
            type Request = ();
            type Response = ();
            type EventKey = ();
            type Event = ();
            fn label(&self) -> &'static str {
                "NOTIFY"
            }
            fn process_input(&mut self, port: &PortContext<'_, Self>, input: &[u8]) -> usize {
                if !self.reported {
                    // The bytes must still be on the descriptor.
                    let mut buf = [0u8; 16];
                    let n = port.fd.read(&mut buf).unwrap_or(0);
                    self.seen.send((input.len(), buf[..n].to_vec())).unwrap();
                    self.reported = true;
                }
                0
            }
            fn process_idle(&mut self, _port: &PortContext<'_, Self>) -> Result<IdleOutcome> {
                Ok(IdleOutcome::Continue)
            }
        }

        let (ours, mut device) = UnixStream::pair().unwrap();
        let (tx, rx) = mpsc::channel();
        let options = PortOptions {
            notify_only: true,
            ..options()
        };
        let protocol = Notified {
            seen: tx,
            reported: false,
        };
        let port = spawn("notify", OwnedFd::from(ours), options, protocol).unwrap();

        device.write_all(b"xyz").unwrap();
        let (len, unread) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(len, 0);
        assert_eq!(unread, b"xyz");

        port.terminate();
        port.join().unwrap();
    }

    #[test]
    fn idle_terminate_ends_loop_and_fails_queued_commands() {
        struct StopWhenQueued(mpsc::Sender<&'static str>);
        impl PortProtocol for StopWhenQueued {
            type Request = ();
            type Response = ();
            type EventKey = ();
            type Event = ();
            fn label(&self) -> &'static str {
                "STOP"
            }
            fn process_input(&mut self, _port: &PortContext<'_, Self>, input: &[u8]) -> usize {
                input.len()
            }
            fn process_idle(&mut self, port: &PortContext<'_, Self>) -> Result<IdleOutcome> {
                Ok(if port.commands().is_empty() {
                    IdleOutcome::Continue
                } else {
                    IdleOutcome::Terminate
                })
            }
            fn on_exiting(&mut self, _port: &PortContext<'_, Self>) {
                self.0.send("exiting").unwrap();
            }
        }

        let (ours, _device) = UnixStream::pair().unwrap();
        let (tx, rx) = mpsc::channel();
        let port = spawn("stop", OwnedFd::from(ours), options(), StopWhenQueued(tx)).unwrap();

        let cmd = port.submit("queued", ()).unwrap();
        assert_eq!(cmd.wait(Some(Duration::from_secs(5))), Err(CommandError::PortClosed));
        port.join().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "exiting");
        assert!(port.is_closed());
    }
}
