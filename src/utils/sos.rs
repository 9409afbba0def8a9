use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

type Listener = Box<dyn Fn() + Send + Sync>;

/// Cooperative stop request shared between the controller and every stream.
///
/// Clones observe the same flag. Listeners registered with [`on_cancel`]
/// run once, on the thread that calls [`cancel`], so blocked waits elsewhere
/// (the frame pacer) can be woken without polling.
///
/// [`on_cancel`]: SignalOfStop::on_cancel
/// [`cancel`]: SignalOfStop::cancel
#[derive(Clone)]
pub struct SignalOfStop {
    // Shared state between clones
    shared: Arc<SharedState>,
}

struct SharedState {
    closing: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
    listeners: Mutex<Vec<Listener>>,
}

impl Default for SignalOfStop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SignalOfStop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalOfStop")
            .field("cancelled", &self.cancelled())
            .finish()
    }
}

impl SignalOfStop {
    pub fn new() -> SignalOfStop {
        SignalOfStop {
            shared: Arc::new(SharedState {
                closing: AtomicBool::new(false),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn cancel(&self) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            // Lock briefly to synchronize with waiting threads
            let _guard = self
                .shared
                .mutex
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.shared.condvar.notify_all();
        }

        let listeners = std::mem::take(
            &mut *self
                .shared
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for listener in listeners {
            listener();
        }
    }

    pub fn cancelled(&self) -> bool {
        self.shared.closing.load(Ordering::SeqCst)
    }

    /// Register a callback fired on cancellation. Fires immediately when the
    /// signal is already cancelled.
    pub fn on_cancel(&self, listener: impl Fn() + Send + Sync + 'static) {
        {
            let mut listeners = self
                .shared
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !self.cancelled() {
                listeners.push(Box::new(listener));
                return;
            }
        }
        listener();
    }

    pub fn wait_cancellation(&self) {
        let mut guard = self
            .shared
            .mutex
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while !self.cancelled() {
            guard = self
                .shared
                .condvar
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Returns `true` when the signal was cancelled before `timeout` elapsed.
    pub fn wait_cancellation_timeout(&self, timeout: Duration) -> bool {
        let guard = self
            .shared
            .mutex
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let (_guard, _) = self
            .shared
            .condvar
            .wait_timeout_while(guard, timeout, |_| !self.cancelled())
            .unwrap_or_else(PoisonError::into_inner);
        self.cancelled()
    }
}
