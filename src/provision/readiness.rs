//! Bounded TCP readiness probe for freshly started services.

use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

const MIN_ATTEMPT: Duration = Duration::from_millis(100);

/// Polls `host:port` until a TCP connection succeeds or `budget` elapses.
///
/// Returns `true` when the port accepted a connection. A budget too large
/// to represent as a deadline polls without limit.
pub async fn wait_until_reachable(host: &str, port: u16, budget: Duration, interval: Duration) -> bool {
    let deadline = Instant::now().checked_add(budget);
    let attempt = interval.max(MIN_ATTEMPT);

    loop {
        if let Ok(Ok(_)) = timeout(attempt, TcpStream::connect((host, port))).await {
            return true;
        }
        if deadline.is_some_and(|limit| Instant::now() >= limit) {
            return false;
        }
        tracing::debug!(host, port, "service not accepting connections yet");
        sleep(interval).await;
    }
}
