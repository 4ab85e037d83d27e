//! Table readiness gate.
//!
//! Data operations wait on the gate until the setup pipeline opens it. The
//! gate opens exactly once; waiters queued before that are released in the
//! order they arrived and later waiters pass straight through.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::oneshot;

enum GateState {
    NotReady(VecDeque<oneshot::Sender<()>>),
    Ready,
}

/// One-shot FIFO release gate.
pub struct ReadinessGate {
    state: Mutex<GateState>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::NotReady(VecDeque::new())),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.lock(), GateState::Ready)
    }

    /// Number of queued waiters.
    pub fn pending(&self) -> usize {
        match &*self.state.lock() {
            GateState::NotReady(waiters) => waiters.len(),
            GateState::Ready => 0,
        }
    }

    /// Wait until the gate is open.
    ///
    /// Never resolves if the gate is never opened.
    pub async fn wait(&self) {
        let receiver = {
            let mut state = self.state.lock();
            match &mut *state {
                GateState::Ready => return,
                GateState::NotReady(waiters) => {
                    let (sender, receiver) = oneshot::channel();
                    waiters.push_back(sender);
                    receiver
                }
            }
        };
        let _ = receiver.await;
    }

    /// Open the gate and release queued waiters in FIFO order.
    ///
    /// Returns the number of released waiters; opening twice releases nothing.
    pub fn open(&self) -> usize {
        let waiters = match std::mem::replace(&mut *self.state.lock(), GateState::Ready) {
            GateState::NotReady(waiters) => waiters,
            GateState::Ready => return 0,
        };
        let released = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(());
        }
        released
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("ready", &self.is_ready())
            .field("pending", &self.pending())
            .finish()
    }
}
