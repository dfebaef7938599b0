//! C2/C3: `Awakable`, the blocking `Waiter` variant, and `AwakableList`.
//!
//! `Waiter` is the L∞ lock in the hierarchy in §3: nothing else may be
//! acquired while its internal mutex is held, so its `awake()` body is kept
//! to "record the result, notify one condvar waiter".

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{IpcResult, Status};
use crate::signals::{HandleSignalsState, Signals};

/// Callback object a resource notifies on a signal-state transition.
pub trait Awakable: Send + Sync {
    /// `Ok(())` is a success wake; `Err(status)` is `FailedPrecondition` (mask
    /// became permanently unsatisfiable) or `Cancelled` (owning dispatcher
    /// closed). `context` is the opaque value the caller registered with.
    fn awake(&self, outcome: IpcResult<()>, context: u64);
}

struct WaiterState {
    woken: bool,
    outcome: IpcResult<()>,
    context: u64,
}

/// Blocking `Awakable`. One per call to `Core::wait`/`Core::wait_many`;
/// cheap to allocate, discarded after use.
pub struct Waiter {
    state: Mutex<WaiterState>,
    condvar: Condvar,
}

impl Waiter {
    pub fn new() -> Arc<Waiter> {
        Arc::new(Waiter {
            state: Mutex::new(WaiterState {
                woken: false,
                outcome: Ok(()),
                context: 0,
            }),
            condvar: Condvar::new(),
        })
    }

    /// Blocks until woken or `deadline` passes. `deadline = None` blocks
    /// indefinitely; `Some(Instant::now())` (or earlier) is "do not block".
    pub fn wait(&self, deadline: Option<Instant>) -> IpcResult<u64> {
        let mut state = self.state.lock();
        if !state.woken {
            match deadline {
                None => {
                    while !state.woken {
                        self.condvar.wait(&mut state);
                    }
                }
                Some(when) => {
                    if when <= Instant::now() && !state.woken {
                        return Err(Status::DeadlineExceeded);
                    }
                    while !state.woken {
                        let timed_out = self.condvar.wait_until(&mut state, when).timed_out();
                        if timed_out && !state.woken {
                            return Err(Status::DeadlineExceeded);
                        }
                    }
                }
            }
        }
        state.outcome.map(|_| state.context)
    }
}

impl Awakable for Waiter {
    fn awake(&self, outcome: IpcResult<()>, context: u64) {
        let mut state = self.state.lock();
        if state.woken {
            // First wake wins; later wakes (e.g. a second dispatcher firing
            // for the same wait-many call) find the waiter already settled.
            return;
        }
        state.woken = true;
        state.outcome = outcome;
        state.context = context;
        drop(state);
        self.condvar.notify_one();
    }
}

struct Entry {
    awakable: Arc<dyn Awakable>,
    mask: Signals,
    context: u64,
    persistent: bool,
}

/// Per-resource collection of registered awakables. Not internally
/// thread-safe: the caller must hold the owning resource's mutex (L2/L3)
/// for every method here.
#[derive(Default)]
pub struct AwakableList {
    entries: Vec<Entry>,
}

impl AwakableList {
    pub fn new() -> AwakableList {
        AwakableList { entries: Vec::new() }
    }

    pub fn add(&mut self, awakable: Arc<dyn Awakable>, mask: Signals, context: u64, persistent: bool) {
        self.entries.push(Entry { awakable, mask, context, persistent });
    }

    /// `match_context = false` removes the unique entry pointing at
    /// `awakable`; `match_context = true` removes every entry whose context
    /// equals `context`. Removing a non-existent entry is a no-op.
    pub fn remove(&mut self, match_context: bool, awakable: &Arc<dyn Awakable>, context: u64) {
        if match_context {
            self.entries.retain(|e| e.context != context);
        } else {
            self.entries.retain(|e| !Arc::ptr_eq(&e.awakable, awakable));
        }
    }

    /// Notify every registered entry of a state transition. Non-persistent
    /// entries that fire (either branch) are removed; persistent entries
    /// always remain registered (see design note on open question #1).
    pub fn on_state_change(&mut self, new: HandleSignalsState) {
        self.entries.retain(|e| {
            let fired = if new.satisfies(e.mask) {
                e.awakable.awake(Ok(()), e.context);
                true
            } else if !new.can_satisfy(e.mask) {
                e.awakable.awake(Err(Status::FailedPrecondition), e.context);
                true
            } else {
                false
            };
            !fired || e.persistent
        });
    }

    /// Wake every entry with `Cancelled` and drop them all. Called from
    /// `Dispatcher::close`.
    pub fn cancel_and_remove_all(&mut self) {
        for e in self.entries.drain(..) {
            e.awakable.awake(Err(Status::Cancelled), e.context);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Recorder {
        last: Mutex<Option<IpcResult<u64>>>,
        fires: AtomicU64,
    }

    impl Recorder {
        fn new() -> Arc<Recorder> {
            Arc::new(Recorder { last: Mutex::new(None), fires: AtomicU64::new(0) })
        }
    }

    impl Awakable for Recorder {
        fn awake(&self, outcome: IpcResult<()>, context: u64) {
            self.fires.fetch_add(1, Ordering::SeqCst);
            *self.last.lock() = Some(outcome.map(|_| context));
        }
    }

    #[test]
    fn waiter_wakes_with_context() {
        let waiter = Waiter::new();
        waiter.awake(Ok(()), 7);
        assert_eq!(waiter.wait(None), Ok(7));
    }

    #[test]
    fn waiter_zero_deadline_is_deadline_exceeded_when_unsatisfied() {
        let waiter = Waiter::new();
        assert_eq!(waiter.wait(Some(Instant::now())), Err(Status::DeadlineExceeded));
    }

    #[test]
    fn non_persistent_entry_is_removed_after_firing() {
        let mut list = AwakableList::new();
        let r = Recorder::new();
        list.add(r.clone(), Signals::READABLE, 0, false);
        list.on_state_change(HandleSignalsState::new(Signals::READABLE, Signals::READABLE));
        assert_eq!(r.fires.load(Ordering::SeqCst), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn persistent_entry_survives_firing() {
        let mut list = AwakableList::new();
        let r = Recorder::new();
        list.add(r.clone(), Signals::READABLE, 0, true);
        list.on_state_change(HandleSignalsState::new(Signals::READABLE, Signals::READABLE));
        assert_eq!(r.fires.load(Ordering::SeqCst), 1);
        assert!(!list.is_empty());
    }

    #[test]
    fn unsatisfiable_mask_wakes_with_failed_precondition() {
        let mut list = AwakableList::new();
        let r = Recorder::new();
        list.add(r.clone(), Signals::WRITABLE, 3, false);
        list.on_state_change(HandleSignalsState::new(Signals::NONE, Signals::READABLE));
        assert_eq!(*r.last.lock(), Some(Err(Status::FailedPrecondition)));
    }

    #[test]
    fn cancel_wakes_everyone_with_cancelled() {
        let mut list = AwakableList::new();
        let r = Recorder::new();
        list.add(r.clone(), Signals::READABLE, 1, true);
        list.cancel_and_remove_all();
        assert_eq!(*r.last.lock(), Some(Err(Status::Cancelled)));
        assert!(list.is_empty());
    }

    #[test]
    fn remove_by_identity_is_noop_for_missing_entry() {
        let mut list = AwakableList::new();
        let r = Recorder::new();
        list.remove(false, &(r as Arc<dyn Awakable>), 0);
        assert!(list.is_empty());
    }
}
