//! Startup readiness gate.
//!
//! Polls every pooled connection concurrently until each one reports
//! `SERVING` or the shared deadline passes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::ServiceError;
use crate::services::connection::{Connection, ServingStatus};
use crate::services::pool::ConnectionPool;

/// Default delay between probes of a service that is not yet serving.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Deadline used when `now + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Result of waiting on one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthOutcome {
    pub service: String,
    pub healthy: bool,
    /// Last probe error or status seen before giving up.
    pub detail: Option<String>,
}

impl fmt::Display for HealthOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.healthy {
            return write!(f, "{}: serving", self.service);
        }
        write!(f, "{}: health check timeout", self.service)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ReadinessGate {
    poll_interval: Duration,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ReadinessGate {
    /// Create a gate that probes every `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Wait until every connection in `pool` is serving.
    ///
    /// All services are polled in parallel against one deadline, so the
    /// total wait is bounded by `timeout` regardless of pool size. Every
    /// service that missed the deadline is listed in the error.
    pub async fn await_healthy(
        &self,
        pool: &ConnectionPool,
        timeout: Duration,
    ) -> Result<(), ServiceError> {
        let connections = pool.connections();
        if connections.is_empty() {
            return Ok(());
        }

        let deadline = deadline_after(timeout);
        info!(
            services = connections.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Waiting for services to become healthy"
        );

        let handles: Vec<_> = connections
            .into_iter()
            .map(|(name, conn)| {
                let interval = self.poll_interval;
                let handle = tokio::spawn(poll_until_serving(conn, interval, deadline));
                (name, handle)
            })
            .collect();

        let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(handles).await;

        let failures: Vec<HealthOutcome> = names
            .into_iter()
            .zip(results)
            .map(|(name, joined)| match joined {
                Ok(outcome) => outcome,
                Err(e) => HealthOutcome {
                    service: name,
                    healthy: false,
                    detail: Some(format!("poller failed: {e}")),
                },
            })
            .filter(|outcome| !outcome.healthy)
            .collect();

        if failures.is_empty() {
            info!("All services healthy");
            Ok(())
        } else {
            for failure in &failures {
                warn!(service = %failure.service, detail = ?failure.detail, "Service not ready");
            }
            Err(ServiceError::Unhealthy { failures })
        }
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}

async fn poll_until_serving(
    conn: Arc<dyn Connection>,
    poll_interval: Duration,
    deadline: Instant,
) -> HealthOutcome {
    let service = conn.name().to_string();
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_error: Option<String> = None;

    loop {
        tokio::select! {
            biased;
            _ = tokio::time::sleep_until(deadline) => break,
            _ = ticker.tick() => {}
        }

        match tokio::time::timeout_at(deadline, conn.check()).await {
            Ok(Ok(ServingStatus::Serving)) => {
                debug!(service = %service, "Service serving");
                return HealthOutcome {
                    service,
                    healthy: true,
                    detail: None,
                };
            }
            Ok(Ok(status)) => {
                debug!(service = %service, ?status, "Service not serving yet");
                last_error = Some(format!("status {status:?}"));
            }
            Ok(Err(e)) => {
                warn!(service = %service, error = %e, "Health probe failed");
                last_error = Some(e.to_string());
            }
            Err(_) => {
                last_error.get_or_insert_with(|| "probe did not complete".to_string());
                break;
            }
        }
    }

    HealthOutcome {
        service,
        healthy: false,
        detail: last_error,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::services::connection::ServiceConfig;
    use crate::services::testing::{Behavior, MockConnection, MockConnector};

    fn pool_of(conns: &[Arc<MockConnection>]) -> ConnectionPool {
        let mut connector = MockConnector::default();
        let mut configs = Vec::new();
        for conn in conns {
            connector = connector.with(Arc::clone(conn));
            configs.push(ServiceConfig::new(conn.name(), ":1", |_conn: Arc<dyn Connection>| ()));
        }
        ConnectionPool::build(&configs, &connector).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn reports_only_the_service_that_never_serves() {
        let a = MockConnection::new("a", Behavior::ServingAfter(Duration::from_millis(200)));
        let b = MockConnection::new("b", Behavior::ServingAfter(Duration::from_millis(200)));
        let c = MockConnection::new("c", Behavior::Refused);
        let pool = pool_of(&[a, b, c]);

        let gate = ReadinessGate::new(Duration::from_millis(50));
        let start = Instant::now();
        let err = gate
            .await_healthy(&pool, Duration::from_millis(500))
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        match err {
            ServiceError::Unhealthy { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].service, "c");
                assert_eq!(
                    failures[0].to_string(),
                    "c: health check timeout (Health probe for c failed: connection refused)"
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn all_serving_returns_immediately() {
        let a = MockConnection::new("a", Behavior::Always(ServingStatus::Serving));
        let b = MockConnection::new("b", Behavior::Always(ServingStatus::Serving));
        let pool = pool_of(&[a.clone(), b.clone()]);

        let start = Instant::now();
        ReadinessGate::default()
            .await_healthy(&pool, Duration::from_secs(10))
            .await
            .unwrap();

        assert!(start.elapsed() < Duration::from_millis(10));
        assert_eq!(a.probes.load(Ordering::SeqCst), 1);
        assert_eq!(b.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn not_serving_times_out() {
        let a = MockConnection::new("a", Behavior::Always(ServingStatus::NotServing));
        let pool = pool_of(&[a]);

        let err = ReadinessGate::new(Duration::from_millis(100))
            .await_healthy(&pool, Duration::from_secs(1))
            .await
            .unwrap_err();

        let ServiceError::Unhealthy { failures } = err else {
            panic!("expected Unhealthy");
        };
        assert_eq!(failures[0].detail.as_deref(), Some("status NotServing"));
        assert!(err_message(&failures).starts_with("Health check failed: a: health check timeout"));
    }

    fn err_message(failures: &[HealthOutcome]) -> String {
        ServiceError::Unhealthy {
            failures: failures.to_vec(),
        }
        .to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_probe_is_bounded_by_deadline() {
        let slow = MockConnection::new("slow", Behavior::Hang);
        let ok = MockConnection::new("ok", Behavior::Always(ServingStatus::Serving));
        let pool = pool_of(&[slow, ok]);

        let start = Instant::now();
        let err = ReadinessGate::default()
            .await_healthy(&pool, Duration::from_secs(2))
            .await
            .unwrap_err();

        let ServiceError::Unhealthy { failures } = err else {
            panic!("expected Unhealthy");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].service, "slow");
        assert_eq!(failures[0].detail.as_deref(), Some("probe did not complete"));
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let a = MockConnection::new("a", Behavior::ServingAfter(Duration::from_millis(300)));
        let pool = pool_of(&[a.clone()]);

        ReadinessGate::new(Duration::from_millis(100))
            .await_healthy(&pool, Duration::from_secs(5))
            .await
            .unwrap();

        assert!(a.probes.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_timeout_does_not_overflow() {
        let a = MockConnection::new("a", Behavior::Always(ServingStatus::Serving));
        let pool = pool_of(&[a]);

        ReadinessGate::default()
            .await_healthy(&pool, Duration::MAX)
            .await
            .unwrap();

        let deadline = deadline_after(Duration::from_secs(u64::MAX));
        assert!(deadline > Instant::now() + Duration::from_secs(86_400 * 365));
    }

    #[tokio::test]
    async fn empty_pool_is_ready() {
        let pool = ConnectionPool::empty();
        ReadinessGate::default()
            .await_healthy(&pool, Duration::from_millis(1))
            .await
            .unwrap();
    }
}
