//! Task spawning, bulk cancellation, and deadlines
//!
//! A thin layer over tokio's spawner that keeps a process-wide inventory of
//! abort handles, so that everything started through [`spawn`] or
//! [`spawn_logged`] can be told to stop in one call. Cancellation is
//! tokio's: an aborted task stops at its next suspension point, which for
//! channel code means its next pending send, receive, select, or sleep. A
//! value that a channel already accepted is never un-delivered by aborting
//! the task that sent it.

use std::panic::resume_unwind;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};

/// every handle spawned through the tracked entry points, until the next
/// stop_all
static INVENTORY: Mutex<Vec<AbortHandle>> = Mutex::new(Vec::new());

fn track(handle: AbortHandle) {
    INVENTORY.lock().unwrap().push(handle);
}

/// signal cancellation to everything tracked and reset the inventory
fn signal_all() -> Vec<AbortHandle> {
    let handles = std::mem::take(&mut *INVENTORY.lock().unwrap());
    for handle in &handles {
        handle.abort();
    }
    handles
}

/// Spawn a task and record it in the process-wide inventory
///
/// The task runs to completion unless [`stop_all`] or [`shutdown`] cancels
/// it first. The returned handle joins the task as usual; a panicking task
/// surfaces through the handle's `JoinError`.
///
/// # Panics
///
/// Panics if called from outside a tokio runtime.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handle = tokio::spawn(future);
    track(handle.abort_handle());
    handle
}

/// Spawn a fire-and-forget background task
///
/// Not recorded in the inventory and no handle is kept, so nothing can join
/// or cancel it; it simply runs until it finishes. Returns only the task's
/// identity.
///
/// # Panics
///
/// Panics if called from outside a tokio runtime.
pub fn spawn_detached<F>(future: F) -> tokio::task::Id
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handle = tokio::spawn(future);
    handle.id()
}

/// Spawn a tracked task whose failures are logged instead of joined
///
/// Meant for long-running loops that nothing ever joins: a panic inside the
/// task is reported through `tracing`, and being cancelled (normally by
/// [`stop_all`]) is treated as an expected way to end and logged nothing.
///
/// # Panics
///
/// Panics if called from outside a tokio runtime.
pub fn spawn_logged<F>(future: F) -> AbortHandle
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handle = tokio::spawn(future);
    let abort = handle.abort_handle();
    track(abort.clone());
    tokio::spawn(async move {
        match handle.await {
            Ok(_) => {}
            Err(err) if err.is_cancelled() => {}
            Err(err) => error!("background task failed: {err}"),
        }
    });
    abort
}

/// Signal cancellation to every task in the inventory and reset it
///
/// Returns once the signals are sent, not once the tasks have wound down;
/// each task stops at its next suspension point. Tasks spawned after this
/// call start a fresh inventory.
pub fn stop_all() {
    signal_all();
}

/// [`stop_all`], then wait for the signalled tasks to actually finish
pub async fn shutdown() {
    let handles = signal_all();
    while handles.iter().any(|handle| !handle.is_finished()) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Run `body` as its own task, waiting at most `limit` for its result
///
/// On expiry the task is cancelled and `None` is returned. The task is not
/// recorded in the inventory; its lifetime is this call. A panic inside
/// `body` resumes in the caller.
///
/// # Panics
///
/// Panics if called from outside a tokio runtime.
pub async fn with_timeout<F>(limit: Duration, body: F) -> Option<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let mut handle = tokio::spawn(body);
    match tokio::time::timeout(limit, &mut handle).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            if err.is_panic() {
                resume_unwind(err.into_panic());
            }
            // aborted from elsewhere; nothing to return
            None
        }
        Err(_elapsed) => {
            handle.abort();
            None
        }
    }
}
