//! The scripting runtime host and its execution lock.
//!
//! Every piece of scripting code runs while holding the runtime's single
//! execution lock, whether it was started by host code through
//! [`ScriptRuntime::enter`] or by a native callback thread through a bridge.
//! A thread-local flag records whether the current thread holds the lock so
//! that a nested attempt is rejected instead of deadlocking.
//!
//! A callback thread waiting for the lock gives up as soon as its bridge is
//! released. Code that holds the lock may therefore release an Api whose
//! native `Release` joins that callback thread.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{BridgeError, Result};
use crate::script::ScriptContext;

/// How long a callback waits for the lock before re-checking its release flag.
const LOCK_POLL: Duration = Duration::from_millis(5);

thread_local! {
    static IN_RUNTIME: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside the runtime until dropped, including
/// during unwinding.
struct RuntimeGuard {
    previous: bool,
}

impl RuntimeGuard {
    fn enter() -> Self {
        Self {
            previous: IN_RUNTIME.with(|flag| flag.replace(true)),
        }
    }
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        IN_RUNTIME.with(|flag| flag.set(self.previous));
    }
}

/// A callback failure recorded instead of being raised into native code.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultReport {
    pub bridge: Uuid,
    pub interface: String,
    pub method: String,
    pub error: BridgeError,
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} [{}]: {}", self.interface, self.method, self.bridge, self.error)
    }
}

/// Host of the scripting runtime state.
#[derive(Debug, Default)]
pub struct ScriptRuntime {
    context: Mutex<ScriptContext>,
    faults: Mutex<Vec<FaultReport>>,
}

impl ScriptRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// True while the current thread holds the execution lock.
    pub fn in_runtime() -> bool {
        IN_RUNTIME.with(Cell::get)
    }

    /// Run host-side scripting code under the execution lock.
    ///
    /// Blocks while a callback is being handled on another thread. Fails
    /// with [`BridgeError::ReentrantEnter`] if this thread is already inside
    /// the runtime.
    pub fn enter<R>(&self, f: impl FnOnce(&mut ScriptContext) -> R) -> Result<R> {
        if Self::in_runtime() {
            return Err(BridgeError::ReentrantEnter);
        }
        let mut context = self.context.lock();
        let _guard = RuntimeGuard::enter();
        Ok(f(&mut context))
    }

    /// Run a callback handler under the execution lock, catching panics.
    ///
    /// Returns `Ok(None)` without running `f` if `cancelled` is set before
    /// the lock is acquired. The caller has already checked that this thread
    /// is not inside the runtime.
    pub(crate) fn run_handler<R>(
        &self,
        cancelled: &AtomicBool,
        f: impl FnOnce(&mut ScriptContext) -> R,
    ) -> std::result::Result<Option<R>, String> {
        let Some(mut context) = self.lock_unless(cancelled) else {
            return Ok(None);
        };
        let _guard = RuntimeGuard::enter();
        panic::catch_unwind(AssertUnwindSafe(|| f(&mut context)))
            .map(Some)
            .map_err(panic_message)
    }

    fn lock_unless(&self, cancelled: &AtomicBool) -> Option<MutexGuard<'_, ScriptContext>> {
        loop {
            if cancelled.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(context) = self.context.try_lock_for(LOCK_POLL) {
                return Some(context);
            }
        }
    }

    /// Wait until no handler is running.
    ///
    /// Must not be called from inside the runtime.
    pub(crate) fn barrier(&self) {
        drop(self.context.lock());
    }

    pub fn report(&self, fault: FaultReport) {
        tracing::warn!(
            bridge = %fault.bridge,
            interface = %fault.interface,
            method = %fault.method,
            "callback fault: {}",
            fault.error
        );
        self.faults.lock().push(fault);
    }

    /// Take every fault recorded since the last drain, oldest first.
    pub fn drain_faults(&self) -> Vec<FaultReport> {
        std::mem::take(&mut *self.faults.lock())
    }

    pub fn fault_count(&self) -> usize {
        self.faults.lock().len()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_runs_with_context() {
        let runtime = ScriptRuntime::new();
        let n = runtime.enter(|ctx| ctx.bump("n", 5)).unwrap();
        assert_eq!(n, 5);
        assert!(!ScriptRuntime::in_runtime());
    }

    #[test]
    fn nested_enter_is_rejected() {
        let runtime = ScriptRuntime::new();
        let inner = runtime.enter(|_| runtime.enter(|_| ())).unwrap();
        assert_eq!(inner, Err(BridgeError::ReentrantEnter));
    }

    #[test]
    fn handler_panic_is_caught_and_flag_reset() {
        let runtime = ScriptRuntime::new();
        let live = AtomicBool::new(false);
        let result: std::result::Result<Option<()>, String> =
            runtime.run_handler(&live, |_| panic!("boom"));
        assert_eq!(result, Err("boom".to_string()));
        assert!(!ScriptRuntime::in_runtime());
        // lock is usable after the panic
        assert_eq!(runtime.enter(|ctx| ctx.bump("n", 1)), Ok(1));
    }

    #[test]
    fn waiting_handler_gives_up_when_cancelled() {
        let runtime = ScriptRuntime::new();
        let cancelled = Arc::new(AtomicBool::new(false));
        let waiter = runtime
            .enter(|_| {
                let (rt, flag) = (runtime.clone(), cancelled.clone());
                let waiter = std::thread::spawn(move || {
                    rt.run_handler(&flag, |ctx| ctx.bump("ran", 1))
                });
                std::thread::sleep(Duration::from_millis(30));
                cancelled.store(true, Ordering::SeqCst);
                // joined while this thread still holds the lock
                waiter.join().unwrap()
            })
            .unwrap();
        assert_eq!(waiter, Ok(None));
        assert_eq!(runtime.enter(|ctx| ctx.get("ran").cloned()).unwrap(), None);
    }

    #[test]
    fn faults_drain_in_order() {
        let runtime = ScriptRuntime::new();
        for method in ["A", "B"] {
            runtime.report(FaultReport {
                bridge: Uuid::nil(),
                interface: "Spi".into(),
                method: method.into(),
                error: BridgeError::ReentrantDispatch { method: method.into() },
            });
        }
        assert_eq!(runtime.fault_count(), 2);
        let drained = runtime.drain_faults();
        assert_eq!(drained[0].method, "A");
        assert_eq!(drained[1].method, "B");
        assert_eq!(runtime.fault_count(), 0);
    }
}
