//! Deadline translation: absolute context deadline -> relative timeout.
//!
//! Runs before any network I/O so an already-overdue call never dials.

use crate::context::CallContext;
use tmrpc_common::{RemoteEndpoint, TimeoutError};
use tokio::time::{Duration, Instant};

/// The connect timeout for `method` against `endpoint`.
///
/// `Ok(None)` when the context has no deadline. Fails with a
/// [`TimeoutError`] when the deadline is not in the future.
pub fn connect_timeout(
    ctx: &CallContext,
    endpoint: &RemoteEndpoint,
    method: &str,
) -> Result<Option<Duration>, TimeoutError> {
    remaining(ctx, || {
        format!(
            "timeout connecting to TabletManager.{} on {}",
            method, endpoint.alias
        )
    })
}

/// The wait budget forwarded to the agent for operations that block
/// remotely (`InitReplica`, `SetPrimary`), in nanoseconds. Zero means
/// "no limit".
pub fn wait_timeout_nanos(
    ctx: &CallContext,
    endpoint: &RemoteEndpoint,
    method: &str,
) -> Result<i64, TimeoutError> {
    let timeout = connect_timeout(ctx, endpoint, method)?;
    Ok(timeout.map(duration_to_nanos).unwrap_or(0))
}

/// Saturating conversion used for every duration sent on the wire.
pub fn duration_to_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

/// Negative values clamp to zero.
pub fn nanos_to_duration(nanos: i64) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(0))
}

fn remaining(
    ctx: &CallContext,
    message: impl FnOnce() -> String,
) -> Result<Option<Duration>, TimeoutError> {
    match ctx.deadline() {
        None => Ok(None),
        Some(deadline) => {
            let now = Instant::now();
            if deadline <= now {
                Err(TimeoutError::new(message()))
            } else {
                Ok(Some(deadline - now))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tmrpc_common::{is_timeout_error, TabletAlias};

    fn endpoint() -> RemoteEndpoint {
        RemoteEndpoint::new(TabletAlias::new("zone1", 100), "127.0.0.1:15999")
    }

    #[test]
    fn test_no_deadline_means_no_timeout() {
        let ctx = CallContext::background();
        assert_eq!(connect_timeout(&ctx, &endpoint(), "Ping").unwrap(), None);
        assert_eq!(wait_timeout_nanos(&ctx, &endpoint(), "SetPrimary").unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_future_deadline_is_relative() {
        let ctx = CallContext::with_timeout(Duration::from_secs(3));
        let timeout = connect_timeout(&ctx, &endpoint(), "Ping").unwrap().unwrap();
        assert_eq!(timeout, Duration::from_secs(3));

        tokio::time::advance(Duration::from_secs(1)).await;
        let timeout = connect_timeout(&ctx, &endpoint(), "Ping").unwrap().unwrap();
        assert_eq!(timeout, Duration::from_secs(2));
        assert_eq!(
            wait_timeout_nanos(&ctx, &endpoint(), "InitReplica").unwrap(),
            2_000_000_000
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_is_timeout() {
        let ctx = CallContext::with_timeout(Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(20)).await;

        let err = connect_timeout(&ctx, &endpoint(), "GetSchema").unwrap_err();
        assert!(is_timeout_error(&err));
        assert_eq!(
            err.to_string(),
            "timeout connecting to TabletManager.GetSchema on zone1-0000000100"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_equal_to_now_is_expired() {
        let ctx = CallContext::with_deadline(Instant::now());
        assert!(connect_timeout(&ctx, &endpoint(), "Ping").is_err());
    }

    #[test]
    fn test_nanos_conversions() {
        assert_eq!(duration_to_nanos(Duration::from_millis(5)), 5_000_000);
        assert_eq!(duration_to_nanos(Duration::MAX), i64::MAX);
        assert_eq!(nanos_to_duration(-5), Duration::ZERO);
        assert_eq!(nanos_to_duration(1_500), Duration::from_nanos(1_500));
    }
}
