//! Apply-then-confirm updates over lock-guarded state.
//!
//! The local change and its snapshot are taken under a single write lock,
//! the remote call runs with no lock held, and a failed call puts the
//! snapshot back verbatim. Restoring the recorded values rather than
//! re-deriving an inverse keeps counters exact when the change was lossy
//! (for example a decrement that was clamped at zero).

use std::future::Future;

use parking_lot::RwLock;

/// Run an optimistic update against `target`.
///
/// `apply` records a snapshot and mutates the state; returning `None` means
/// there was nothing to change and the remote call is skipped, in which case
/// the whole operation yields `None`. `publish` observes the state after the
/// optimistic change and again after a rollback.
pub async fn run_optimistic<T, S, R, E, Apply, Call, Fut, Restore, Publish>(
    target: &RwLock<T>,
    apply: Apply,
    call: Call,
    restore: Restore,
    publish: Publish,
) -> Option<Result<R, E>>
where
    Apply: FnOnce(&mut T) -> Option<S>,
    Call: FnOnce(&S) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    Restore: FnOnce(&mut T, S),
    Publish: Fn(&T),
{
    let snapshot = {
        let mut guard = target.write();
        let snapshot = apply(&mut *guard)?;
        publish(&*guard);
        snapshot
    };

    let outcome = call(&snapshot).await;

    if outcome.is_err() {
        let mut guard = target.write();
        restore(&mut *guard, snapshot);
        publish(&*guard);
    }
    Some(outcome)
}
