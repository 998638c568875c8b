//! Playback listener registry
//!
//! Listeners are held weakly: registering a listener never keeps it alive, and
//! dropped listeners are pruned on the next notification. Notifications take a
//! snapshot of the live listeners and call them with the registry lock
//! released, so a callback may register or remove listeners (or call back into
//! the manager) without deadlocking.

use super::interfaces::PlaybackListener;
use parking_lot::Mutex;
use reel_common::PlayMode;
use std::sync::{Arc, Weak};
use tracing::trace;

#[derive(Default)]
pub struct ListenerSet {
    listeners: Mutex<Vec<Weak<dyn PlaybackListener>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener (held weakly, appended in order)
    pub fn add(&self, listener: Arc<dyn PlaybackListener>) {
        self.listeners.lock().push(Arc::downgrade(&listener));
    }

    /// Unregister a listener; returns whether it was registered
    pub fn remove<L: PlaybackListener + ?Sized>(&self, listener: &Arc<L>) -> bool {
        let target = Arc::as_ptr(listener) as *const ();
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|w| w.as_ptr() as *const () != target);
        listeners.len() != before
    }

    /// Number of live listeners
    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn PlaybackListener>> {
        let mut listeners = self.listeners.lock();
        listeners.retain(|w| w.strong_count() > 0);
        listeners.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn notify_play_mode_changed(&self, mode: PlayMode) {
        trace!("Notifying listeners: play mode {}", mode);
        for listener in self.snapshot() {
            listener.on_play_mode_changed(mode);
        }
    }

    pub fn notify_current_frame_changed(&self, frame: u64) {
        for listener in self.snapshot() {
            listener.on_current_frame_changed(frame);
        }
    }

    pub fn notify_check_pending_timeline_switch(&self) {
        for listener in self.snapshot() {
            listener.on_check_pending_timeline_switch();
        }
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct Counter {
        frames: AtomicU64,
    }

    impl PlaybackListener for Counter {
        fn on_current_frame_changed(&self, _frame: u64) {
            self.frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_add_notify_remove() {
        let set = ListenerSet::new();
        let counter = Arc::new(Counter::default());
        set.add(counter.clone());
        assert_eq!(set.len(), 1);

        set.notify_current_frame_changed(3);
        set.notify_current_frame_changed(4);
        assert_eq!(counter.frames.load(Ordering::Relaxed), 2);

        assert!(set.remove(&counter));
        assert!(!set.remove(&counter));
        set.notify_current_frame_changed(5);
        assert_eq!(counter.frames.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_listeners_are_held_weakly() {
        let set = ListenerSet::new();
        let counter = Arc::new(Counter::default());
        set.add(counter.clone());
        drop(counter);
        assert!(set.is_empty());
        // Pruned without panicking
        set.notify_play_mode_changed(PlayMode::Playing);
    }

    struct Reentrant {
        set: Arc<ListenerSet>,
        added: Mutex<Option<Arc<Counter>>>,
    }

    impl PlaybackListener for Reentrant {
        fn on_check_pending_timeline_switch(&self) {
            let counter = Arc::new(Counter::default());
            self.set.add(counter.clone());
            *self.added.lock() = Some(counter);
        }
    }

    #[test]
    fn test_callback_may_modify_registry() {
        let set = Arc::new(ListenerSet::new());
        let reentrant = Arc::new(Reentrant {
            set: Arc::clone(&set),
            added: Mutex::new(None),
        });
        set.add(reentrant.clone());
        set.notify_check_pending_timeline_switch();
        assert_eq!(set.len(), 2);
    }
}
