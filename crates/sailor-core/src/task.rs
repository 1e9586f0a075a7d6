// Background task spawning.
//
// Registries capture the runtime they are built on and hand it down to
// their collections and records, so background work never depends on
// the thread that happens to trigger it.

use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::CoreError;

/// The runtime of the calling thread.
pub(crate) fn current() -> Result<Handle, CoreError> {
    Handle::try_current().map_err(|_| CoreError::NoRuntime)
}

pub(crate) fn spawn<F>(runtime: &Handle, what: &'static str, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    trace!(task = what, "spawning background task");
    runtime.spawn(future)
}
