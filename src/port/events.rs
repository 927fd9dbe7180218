//! Unsolicited event handler registry.
//!
//! Handlers are registered against a protocol-specific key (an MBIM command
//! code, an AT URC prefix). When the port loop recognizes an unsolicited
//! event it asks the registry to dispatch it: every matching handler runs on
//! its own short-lived thread with its own copy of the event, so a slow
//! handler never stalls the loop.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::queue::{Queue, QueueError};

/// Entry point invoked for each matching event.
pub type HandlerFn<E> = dyn Fn(E) + Send + Sync;

/// A named handler registered for events matching `key`.
pub struct EventHandler<K, E> {
    name: String,
    key: K,
    entry: Arc<HandlerFn<E>>,
}

impl<K: std::fmt::Debug, E> std::fmt::Debug for EventHandler<K, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandler")
            .field("name", &self.name)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<K, E> EventHandler<K, E> {
    /// Handler name, used for thread names and logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key this handler is registered for.
    pub fn key(&self) -> &K {
        &self.key
    }
}

/// The per-port handler registry.
#[derive(Debug)]
pub struct EventRegistry<K, E> {
    handlers: Queue<EventHandler<K, E>>,
}

impl<K, E> Default for EventRegistry<K, E> {
    fn default() -> Self {
        Self {
            handlers: Queue::new(),
        }
    }
}

impl<K, E> EventRegistry<K, E>
where
    K: Send + Sync + 'static,
    E: Clone + Send + 'static,
{
    /// Register `entry` for events matching `key`.
    ///
    /// The returned handle identifies the registration for [`Self::unregister`].
    pub fn register<F>(&self, name: impl Into<String>, key: K, entry: F) -> Arc<EventHandler<K, E>>
    where
        F: Fn(E) + Send + Sync + 'static,
    {
        let handler = Arc::new(EventHandler {
            name: name.into(),
            key,
            entry: Arc::new(entry),
        });
        // The registry is never closed, so append cannot fail.
        let _ = self.handlers.append(Arc::clone(&handler));
        handler
    }

    /// Remove a registration.
    pub fn unregister(&self, handler: &Arc<EventHandler<K, E>>) -> Result<(), QueueError> {
        self.handlers.remove(handler)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Spawn one thread per handler whose key satisfies `matches`.
    ///
    /// `tag` distinguishes the thread names of successive dispatches. Returns
    /// the join handles of the spawned threads; an empty vector means nobody
    /// was interested.
    pub fn dispatch(
        &self,
        matches: impl Fn(&K) -> bool,
        event: &E,
        tag: &str,
    ) -> Vec<JoinHandle<()>> {
        let mut spawned = Vec::new();
        for handler in self.handlers.filtered(|h| matches(&h.key)) {
            let entry = Arc::clone(&handler.entry);
            let event = event.clone();
            let thread_name = format!("{}-{}", handler.name, tag);
            match thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || entry(event))
            {
                Ok(join) => spawned.push(join),
                Err(e) => log::error!("[events] failed to spawn {thread_name}: {e}"),
            }
        }
        spawned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn dispatch_runs_only_matching_handlers() {
        let registry: EventRegistry<u32, String> = EventRegistry::default();
        let (tx, rx) = mpsc::channel();

        for key in [1, 2, 1] {
            let tx = tx.clone();
            registry.register(format!("h{key}"), key, move |ev: String| {
                tx.send((key, ev)).unwrap();
            });
        }

        let joins = registry.dispatch(|k| *k == 1, &"hello".to_string(), "t1");
        assert_eq!(joins.len(), 2);
        for j in joins {
            j.join().unwrap();
        }

        let got: Vec<(u32, String)> = rx.try_iter().collect();
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|(k, ev)| *k == 1 && ev == "hello"));
        assert!(rx.recv_timeout(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn dispatch_without_match_spawns_nothing() {
        let registry: EventRegistry<u32, u8> = EventRegistry::default();
        registry.register("only", 3, |_| {});
        assert!(registry.dispatch(|k| *k == 4, &0, "t").is_empty());
    }

    #[test]
    fn unregister_removes_handler() {
        let registry: EventRegistry<&'static str, u8> = EventRegistry::default();
        let h = registry.register("urc", "+CREG", |_| {});
        assert_eq!(registry.len(), 1);
        registry.unregister(&h).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.unregister(&h), Err(QueueError::NotFound));
    }

    #[test]
    fn handler_thread_is_named_after_handler() {
        let registry: EventRegistry<u32, ()> = EventRegistry::default();
        let (tx, rx) = mpsc::channel();
        registry.register("connect", 12, move |()| {
            let name = thread::current().name().map(str::to_owned);
            tx.send(name).unwrap();
        });
        for j in registry.dispatch(|_| true, &(), "00000007") {
            j.join().unwrap();
        }
        assert_eq!(rx.recv().unwrap().as_deref(), Some("connect-00000007"));
    }
}
