//! Synchronous command/response correlation.
//!
//! A caller thread wraps its request in a [`PendingCommand`], appends it to a
//! port's command queue and blocks on the command's own condition variable.
//! The port loop writes the request during an idle tick
//! (`WaitingToSend` → `WaitingForAnswer`), and once the matching answer is
//! parsed it removes the command from the queue and delivers the outcome.
//!
//! ```text
//! caller                       queue                      port loop
//!   │── submit ───────────────▶ [cmd WaitingToSend]
//!   │   wait(cond)                                 ◀── idle: write, mark
//!   │                          [cmd WaitingForAnswer]
//!   │                                              ◀── input: take_first
//!   │◀──────────── complete(outcome) + notify ─────────────┘
//! ```
//!
//! Lock order is always queue lock first, then the command's lock. The loop
//! removes a command from the queue *before* completing it, so a caller that
//! times out and fails to remove its own command knows a delivery is already
//! in flight and simply waits for it.

// Rust guideline compliant 2026-02

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::queue::{Queue, QueueError};

/// Why a command finished without a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The port closed (or was never open) before an answer arrived.
    PortClosed,
    /// The response fragments for this command were lost during reassembly.
    CorrelationLost,
    /// No answer arrived within the caller's deadline.
    Timeout,
    /// The caller cancelled the command.
    Cancelled,
    /// The port refused or failed to write the request.
    SendFailed(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PortClosed => write!(f, "Port closed before the command was answered"),
            Self::CorrelationLost => write!(f, "Response lost during fragment reassembly"),
            Self::Timeout => write!(f, "Command timed out"),
            Self::Cancelled => write!(f, "Command cancelled"),
            Self::SendFailed(msg) => write!(f, "Send failed: {msg}"),
        }
    }
}

impl std::error::Error for CommandError {}

/// Where a command is in its request/response lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Queued, not yet written to the descriptor.
    WaitingToSend,
    /// Written; waiting for the matching answer.
    WaitingForAnswer,
}

#[derive(Debug)]
struct Slot<R> {
    state: CommandState,
    sequence_id: Option<u32>,
    outcome: Option<Result<R, CommandError>>,
    delivered: bool,
}

/// A request travelling through a port, shared by the caller and the queue.
#[derive(Debug)]
pub struct PendingCommand<Q, R> {
    name: String,
    request: Q,
    slot: Mutex<Slot<R>>,
    ready: Condvar,
}

impl<Q, R> PendingCommand<Q, R> {
    /// Wrap `request` in a new command in state `WaitingToSend`.
    pub fn new(name: impl Into<String>, request: Q) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            request,
            slot: Mutex::new(Slot {
                state: CommandState::WaitingToSend,
                sequence_id: None,
                outcome: None,
                delivered: false,
            }),
            ready: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Slot<R>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Human-readable name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The request payload.
    pub fn request(&self) -> &Q {
        &self.request
    }

    /// Current correlation state.
    pub fn state(&self) -> CommandState {
        self.lock().state
    }

    /// Sequence id assigned when the command was framed, if any.
    pub fn sequence_id(&self) -> Option<u32> {
        self.lock().sequence_id
    }

    /// Whether an outcome has been delivered.
    pub fn is_complete(&self) -> bool {
        self.lock().delivered
    }

    /// Whether this command is written and waiting for answer `sequence_id`.
    pub fn awaits(&self, sequence_id: u32) -> bool {
        let slot = self.lock();
        slot.state == CommandState::WaitingForAnswer && slot.sequence_id == Some(sequence_id)
    }

    /// Record the sequence id stamped on the outbound frames.
    pub fn assign_sequence_id(&self, sequence_id: u32) {
        self.lock().sequence_id = Some(sequence_id);
    }

    /// Mark the request as written.
    pub fn mark_sent(&self) {
        self.lock().state = CommandState::WaitingForAnswer;
    }

    /// Deliver the outcome and wake the waiter.
    ///
    /// Only the first delivery counts; returns `false` if an outcome was
    /// already delivered. The caller must already have removed the command
    /// from its queue.
    pub fn complete(&self, outcome: Result<R, CommandError>) -> bool {
        let mut slot = self.lock();
        if slot.delivered {
            return false;
        }
        slot.delivered = true;
        slot.outcome = Some(outcome);
        self.ready.notify_one();
        true
    }

    /// Block until an outcome is delivered or `timeout` elapses.
    ///
    /// Returns [`CommandError::Timeout`] when the deadline passes with no
    /// delivery. This does not detach the command from its queue; use
    /// [`call`] or [`cancel`] for that.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<R, CommandError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.lock();
        loop {
            if slot.delivered {
                return slot.outcome.take().unwrap_or(Err(CommandError::Cancelled));
            }
            slot = match deadline {
                None => self.ready.wait(slot).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(CommandError::Timeout);
                    }
                    self.ready
                        .wait_timeout(slot, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

// ─── Correlator ────────────────────────────────────────────────────────────

/// Queue a command for sending.
///
/// Fails with [`CommandError::PortClosed`] if the queue has been closed.
pub fn submit<Q, R>(
    queue: &Queue<PendingCommand<Q, R>>,
    command: &Arc<PendingCommand<Q, R>>,
) -> Result<(), CommandError> {
    queue.append(Arc::clone(command)).map_err(|e| match e {
        QueueError::Closed | QueueError::NotFound => CommandError::PortClosed,
    })
}

/// Submit `command` and block until it is answered, fails, or times out.
pub fn call<Q, R>(
    queue: &Queue<PendingCommand<Q, R>>,
    command: &Arc<PendingCommand<Q, R>>,
    timeout: Option<Duration>,
) -> Result<R, CommandError> {
    submit(queue, command)?;
    match command.wait(timeout) {
        Err(CommandError::Timeout) => {
            log::warn!("[cmd] {} timed out", command.name());
            detach(queue, command, CommandError::Timeout)
        }
        outcome => outcome,
    }
}

/// Withdraw a queued command and wake its waiter with [`CommandError::Cancelled`].
///
/// Returns `false` if the command already left the queue (an answer or a
/// failure is being delivered).
pub fn cancel<Q, R>(queue: &Queue<PendingCommand<Q, R>>, command: &Arc<PendingCommand<Q, R>>) -> bool {
    if queue.remove(command).is_err() {
        return false;
    }
    command.complete(Err(CommandError::Cancelled))
}

fn detach<Q, R>(
    queue: &Queue<PendingCommand<Q, R>>,
    command: &Arc<PendingCommand<Q, R>>,
    reason: CommandError,
) -> Result<R, CommandError> {
    match queue.remove(command) {
        Ok(()) => {
            command.complete(Err(reason.clone()));
            Err(reason)
        }
        // Already taken by the port loop; its delivery is imminent.
        Err(_) => command.wait(None),
    }
}

/// Fail every command in `commands` with `error`.
pub fn fail_all<Q, R>(commands: Vec<Arc<PendingCommand<Q, R>>>, error: &CommandError) {
    for command in commands {
        log::debug!("[cmd] failing {}: {error}", command.name());
        command.complete(Err(error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    type Cmd = PendingCommand<&'static str, String>;

    #[test]
    fn new_command_waits_to_send() {
        let cmd: Arc<Cmd> = PendingCommand::new("probe", "AT");
        assert_eq!(cmd.state(), CommandState::WaitingToSend);
        assert_eq!(cmd.sequence_id(), None);
        assert!(!cmd.is_complete());
        assert_eq!(*cmd.request(), "AT");
    }

    #[test]
    fn awaits_requires_sent_state_and_matching_id() {
        let cmd: Arc<Cmd> = PendingCommand::new("probe", "AT");
        cmd.assign_sequence_id(5);
        assert!(!cmd.awaits(5));
        cmd.mark_sent();
        assert!(cmd.awaits(5));
        assert!(!cmd.awaits(6));
    }

    #[test]
    fn call_returns_response_delivered_by_another_thread() {
        let queue: Arc<Queue<Cmd>> = Arc::new(Queue::new());
        let cmd: Arc<Cmd> = PendingCommand::new("probe", "AT");

        let loop_queue = Arc::clone(&queue);
        let responder = thread::spawn(move || loop {
            if let Some(c) = loop_queue.take_first(|_| true) {
                c.mark_sent();
                c.complete(Ok(format!("answer to {}", c.request())));
                break;
            }
            thread::yield_now();
        });

        let answer = call(&queue, &cmd, Some(Duration::from_secs(5)));
        responder.join().unwrap();
        assert_eq!(answer, Ok("answer to AT".to_string()));
        assert!(queue.is_empty());
    }

    #[test]
    fn timeout_detaches_command_from_queue() {
        let queue: Queue<Cmd> = Queue::new();
        let cmd: Arc<Cmd> = PendingCommand::new("slow", "AT");

        let res = call(&queue, &cmd, Some(Duration::from_millis(20)));
        assert_eq!(res, Err(CommandError::Timeout));
        assert!(queue.is_empty());
        // A late answer has nobody to go to.
        assert!(!cmd.complete(Ok("late".into())));
    }

    #[test]
    fn submit_to_closed_queue_is_port_closed() {
        let queue: Queue<Cmd> = Queue::new();
        queue.close();
        let cmd: Arc<Cmd> = PendingCommand::new("late", "AT");
        assert_eq!(submit(&queue, &cmd), Err(CommandError::PortClosed));
        assert_eq!(call(&queue, &cmd, None), Err(CommandError::PortClosed));
    }

    #[test]
    fn closing_queue_fails_blocked_caller() {
        let queue: Arc<Queue<Cmd>> = Arc::new(Queue::new());
        let cmd: Arc<Cmd> = PendingCommand::new("stuck", "AT");

        let caller_queue = Arc::clone(&queue);
        let caller_cmd = Arc::clone(&cmd);
        let caller = thread::spawn(move || call(&caller_queue, &caller_cmd, None));

        while !queue.contains(&cmd) {
            thread::yield_now();
        }
        fail_all(queue.close(), &CommandError::PortClosed);
        assert_eq!(caller.join().unwrap(), Err(CommandError::PortClosed));
    }

    #[test]
    fn cancel_wakes_waiter() {
        let queue: Arc<Queue<Cmd>> = Arc::new(Queue::new());
        let cmd: Arc<Cmd> = PendingCommand::new("cancel-me", "AT");
        submit(&queue, &cmd).unwrap();

        let waiter_cmd = Arc::clone(&cmd);
        let waiter = thread::spawn(move || waiter_cmd.wait(None));

        assert!(cancel(&queue, &cmd));
        assert_eq!(waiter.join().unwrap(), Err(CommandError::Cancelled));
        assert!(!cancel(&queue, &cmd));
    }

    #[test]
    fn only_first_outcome_is_delivered() {
        let cmd: Arc<Cmd> = PendingCommand::new("once", "AT");
        assert!(cmd.complete(Ok("first".into())));
        assert!(!cmd.complete(Err(CommandError::CorrelationLost)));
        assert_eq!(cmd.wait(None), Ok("first".to_string()));
    }
}
