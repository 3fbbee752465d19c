use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::parsing::Message;

#[derive(Debug, Default)]
struct QueueInner {
    items: VecDeque<Message>,
    closed: bool,
}

/// Unbounded FIFO that worker tasks push decoded messages into.
///
/// Once closed, pushes are dropped and pops return nothing.
#[derive(Debug)]
pub struct EventQueue {
    inner: Mutex<QueueInner>,
    notify: Arc<Notify>,
}

impl EventQueue {
    fn new(notify: Arc<Notify>) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            notify,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `message`; returns false (and drops the message) when the queue was closed
    pub fn push(&self, message: Message) -> bool {
        {
            let mut inner = self.lock();
            if inner.closed {
                trace!("dropping message pushed into a closed queue");
                return false;
            }
            inner.items.push_back(message);
        }

        self.notify.notify_one();
        true
    }

    pub fn try_pop(&self) -> Option<Message> {
        let mut inner = self.lock();
        if inner.closed {
            return None;
        }
        inner.items.pop_front()
    }

    pub fn len(&self) -> usize {
        let inner = self.lock();
        if inner.closed { 0 } else { inner.items.len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Closes the queue and drops whatever it still holds, returning how many were discarded
    fn close(&self) -> usize {
        let stale = {
            let mut inner = self.lock();
            inner.closed = true;
            std::mem::take(&mut inner.items)
        };

        stale.len()
    }
}

/// Consumer-side handle over the current [`EventQueue`].
///
/// `reset` swaps in a fresh queue; messages from the old one are never handed out afterwards.
#[derive(Debug)]
pub struct ChatSource {
    current: RwLock<Arc<EventQueue>>,
    resetting: AtomicUsize,
    /// Completed resets
    epoch: AtomicUsize,
    notify: Arc<Notify>,
}

impl Default for ChatSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSource {
    pub fn new() -> Self {
        let notify = Arc::new(Notify::new());
        Self {
            current: RwLock::new(Arc::new(EventQueue::new(Arc::clone(&notify)))),
            resetting: AtomicUsize::new(0),
            epoch: AtomicUsize::new(0),
            notify,
        }
    }

    /// The queue currently being filled. Producers keep this handle for the lifetime of one
    /// session, so their pushes land in a closed queue once the session is reset.
    pub fn queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn push(&self, message: Message) -> bool {
        self.queue().push(message)
    }

    pub fn is_resetting(&self) -> bool {
        self.resetting.load(Ordering::SeqCst) > 0
    }

    /// Whether a message is ready for the consumer; always false while a reset is in flight
    pub fn has_ready(&self) -> bool {
        !self.is_resetting() && !self.queue().is_empty()
    }

    pub fn try_pop(&self) -> Option<Message> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        if self.is_resetting() {
            return None;
        }

        let message = self.queue().try_pop()?;

        // a reset that started while we held the old queue owns this message now
        if self.is_resetting() || self.epoch.load(Ordering::SeqCst) != epoch {
            trace!("discarding message popped during reset");
            return None;
        }

        Some(message)
    }

    /// Replaces the queue with an empty one, discarding everything the old one held.
    ///
    /// Returns the number of discarded messages.
    pub fn reset(&self) -> usize {
        self.resetting.fetch_add(1, Ordering::SeqCst);

        let stale = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let fresh = Arc::new(EventQueue::new(Arc::clone(&self.notify)));
            std::mem::replace(&mut *current, fresh)
        };
        let discarded = stale.close();

        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.resetting.fetch_sub(1, Ordering::SeqCst);
        debug!(discarded, "event queue reset");

        discarded
    }

    /// Resolves once [`has_ready`](Self::has_ready) is true
    pub async fn ready(&self) {
        loop {
            let notified = self.notify.notified();
            if self.has_ready() {
                return;
            }
            notified.await;
        }
    }

    /// Pops one message into `callback`.
    ///
    /// Returns the callback's verdict (`false` to stop), or `None` when nothing was ready.
    pub fn dispatch<F>(&self, callback: F) -> Option<bool>
    where
        F: FnOnce(Message) -> bool,
    {
        self.try_pop().map(callback)
    }

    /// Waits for and dispatches messages until `callback` returns false
    pub async fn run<F>(&self, mut callback: F)
    where
        F: FnMut(Message) -> bool,
    {
        loop {
            self.ready().await;
            if let Some(false) = self.dispatch(&mut callback) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::parsing::commands::{Command, EmoteRef, Privmsg, UserModes};
    use crate::util::services::ImageHandle;

    fn chat(target: &str, marker: Option<&Arc<dyn Any + Send + Sync>>) -> Message {
        let emotes = marker
            .map(|marker| {
                vec![EmoteRef {
                    start: 0,
                    end: 4,
                    id: 25,
                    image: Some(ImageHandle::from_arc(Arc::clone(marker))),
                }]
            })
            .unwrap_or_default();

        Message {
            nick: Some("foo".to_string()),
            user: None,
            host: None,
            tags: None,
            command: Command::Privmsg(Privmsg {
                target: target.to_string(),
                message: "Kappa".to_string(),
                action: false,
                user_modes: UserModes::empty(),
                colour: None,
                display_name: None,
                badges: Vec::new(),
                emotes,
            }),
        }
    }

    fn target(message: &Message) -> &str {
        match &message.command {
            Command::Privmsg(privmsg) => &privmsg.target,
            _ => "",
        }
    }

    #[test]
    fn test_fifo() {
        let source = ChatSource::new();
        assert!(!source.has_ready());

        source.push(chat("#a", None));
        source.push(chat("#b", None));
        assert!(source.has_ready());

        assert_eq!(source.try_pop().as_ref().map(target), Some("#a"));
        assert_eq!(source.try_pop().as_ref().map(target), Some("#b"));
        assert!(source.try_pop().is_none());
        assert!(!source.has_ready());
    }

    #[test]
    fn test_reset_discards_and_closes_old_queue() {
        let source = ChatSource::new();
        let old = source.queue();

        old.push(chat("#a", None));
        old.push(chat("#b", None));
        assert_eq!(source.reset(), 2);

        assert!(old.is_closed());
        assert!(!old.push(chat("#late", None)));
        assert!(!source.has_ready());
        assert!(source.try_pop().is_none());

        assert!(source.push(chat("#fresh", None)));
        assert_eq!(source.try_pop().as_ref().map(target), Some("#fresh"));
    }

    #[test]
    fn test_not_ready_while_resetting() {
        let source = ChatSource::new();
        source.push(chat("#a", None));

        source.resetting.fetch_add(1, Ordering::SeqCst);
        assert!(!source.has_ready());
        assert!(source.try_pop().is_none());
        source.resetting.fetch_sub(1, Ordering::SeqCst);

        assert!(source.has_ready());
    }

    #[test]
    fn test_dispatch() {
        let source = ChatSource::new();
        assert_eq!(source.dispatch(|_| true), None);

        source.push(chat("#a", None));
        let mut seen = Vec::new();
        assert_eq!(
            source.dispatch(|msg| {
                seen.push(target(&msg).to_string());
                false
            }),
            Some(false)
        );
        assert_eq!(seen, vec!["#a"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_run_until_callback_stops() {
        let source = Arc::new(ChatSource::new());

        let producer = Arc::clone(&source);
        tokio::spawn(async move {
            for channel in ["#a", "#b", "#c", "#d"] {
                producer.push(chat(channel, None));
                tokio::task::yield_now().await;
            }
        });

        let mut seen = Vec::new();
        tokio::time::timeout(
            Duration::from_secs(5),
            source.run(|msg| {
                seen.push(target(&msg).to_string());
                seen.len() < 3
            }),
        )
        .await
        .unwrap();

        assert_eq!(seen, vec!["#a", "#b", "#c"]);
    }

    #[test]
    fn test_stress_no_stale_delivery_and_no_leaks() {
        let source = Arc::new(ChatSource::new());
        // number of completed resets; held across reset so producers read a matching tag
        let generation = Arc::new(RwLock::new(0usize));
        let stop = Arc::new(AtomicBool::new(false));
        let marker: Arc<dyn Any + Send + Sync> = Arc::new(());

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let source = Arc::clone(&source);
                let generation = Arc::clone(&generation);
                let stop = Arc::clone(&stop);
                let marker = Arc::clone(&marker);
                thread::spawn(move || {
                    while !stop.load(Ordering::SeqCst) {
                        let (queue, tag) = {
                            let generation = generation.read().unwrap();
                            (source.queue(), *generation)
                        };
                        for _ in 0..16 {
                            queue.push(chat(&tag.to_string(), Some(&marker)));
                        }
                    }
                })
            })
            .collect();

        let resetter = {
            let source = Arc::clone(&source);
            let generation = Arc::clone(&generation);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    {
                        let mut generation = generation.write().unwrap();
                        source.reset();
                        *generation += 1;
                    }
                    thread::sleep(Duration::from_micros(50));
                }
            })
        };

        let mut delivered = 0usize;
        for _ in 0..200_000 {
            let floor = *generation.read().unwrap();
            if let Some(msg) = source.try_pop() {
                let tag: usize = target(&msg).parse().unwrap();
                assert!(tag >= floor, "message from queue {tag} delivered after reset {floor}");
                delivered += 1;
            }
        }

        stop.store(true, Ordering::SeqCst);
        for producer in producers {
            producer.join().unwrap();
        }
        resetter.join().unwrap();

        source.reset();
        assert!(delivered > 0);
        assert_eq!(Arc::strong_count(&marker), 1);
    }
}
