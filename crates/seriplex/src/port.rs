//! Host concurrency primitives
//!
//! The one seam between the node and the platform's threading support. The
//! hosted port wraps std's mutex and condvar; an RTOS port supplies the same
//! surface from its own primitives, and a target with neither uses
//! [`PollingNode`](crate::PollingNode) and none of this.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub(crate) type PortMutex<T> = Mutex<T>;
pub(crate) type PortCondvar = Condvar;

/// Lock, shrugging off poisoning: a panicking subscriber callback must not
/// brick the node for every other thread.
pub(crate) fn lock<T>(mutex: &PortMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Suspend on `condvar` until `condition` goes false or the timeout runs
/// out, releasing the guard while parked. Checking the condition under the
/// lock means a wakeup that lands before the wait starts is never lost.
pub(crate) fn wait_timeout_while<'a, T>(
    condvar: &PortCondvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
    condition: impl FnMut(&mut T) -> bool,
) -> MutexGuard<'a, T> {
    condvar
        .wait_timeout_while(guard, timeout, condition)
        .unwrap_or_else(PoisonError::into_inner)
        .0
}
