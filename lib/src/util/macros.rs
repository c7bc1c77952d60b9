/// Evaluates the tokens, logging at `debug` when they start and how long
/// they took.
#[doc(hidden)]
#[macro_export]
macro_rules! time {
    ($label:expr => $($token:tt)*) => ({
        tracing::debug!("{} started", $label);
        let start = std::time::Instant::now();
        let value = { $($token)* };
        tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "{} done", $label);
        value
    });
}

pub use time;
