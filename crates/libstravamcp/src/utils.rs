use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use tracing::debug;

/// Await `future` and log how long it took at debug level.
pub async fn timed<F, S>(title: S, future: F) -> F::Output
where
    F: Future,
    S: Display,
{
    let start = Instant::now();
    let output = future.await;

    debug!(
        "{} in {:.2}ms",
        title,
        start.elapsed().as_secs_f64() * 1000.0,
    );

    output
}
