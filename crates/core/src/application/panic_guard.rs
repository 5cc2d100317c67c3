// Panic isolation for item processors
// A panicking processor must fail its own job, never the batch or the loop.
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Future completed
    Completed(T),
    /// Future panicked; contains the panic message
    Panicked(String),
}

/// Poll `future` to completion, converting a panic into `Panicked`.
///
/// # Example
/// ```text
/// match execute_guarded(processor.process(&job)).await {
///     PanicGuardResult::Completed(result) => result,
///     PanicGuardResult::Panicked(msg) => Err(ProcessError::Fatal(msg)),
/// }
/// ```
pub async fn execute_guarded<F, T>(future: F) -> PanicGuardResult<T>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => PanicGuardResult::Completed(value),
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            error!(panic_msg = %msg, "Item processor panicked");
            PanicGuardResult::Panicked(msg)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
