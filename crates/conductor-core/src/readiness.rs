use std::time::Duration;

use conductor_types::ReadinessPolicy;
use tokio_util::sync::CancellationToken;

use crate::process_manager::{ExitWatch, ProcessExit};

/// Outcome of waiting for a freshly spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    ExitedEarly(ProcessExit),
    NotHealthy,
    Cancelled,
}

impl Readiness {
    #[must_use]
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

/// Race the startup signal of `policy` against process exit and cancellation.
///
/// An exit observed before the signal always wins, so a crash is never reported as ready.
pub async fn await_ready(
    mut exited: ExitWatch,
    policy: ReadinessPolicy,
    health_url: String,
    cancel: CancellationToken,
) -> Readiness {
    let signal = async {
        match policy {
            ReadinessPolicy::GracePeriod(grace) => {
                tokio::time::sleep(grace).await;
                true
            }
            ReadinessPolicy::HealthCheck {
                interval,
                max_attempts,
                request_timeout,
            } => poll_health(&health_url, interval, max_attempts, request_timeout).await,
        }
    };

    tokio::select! {
        biased;

        () = cancel.cancelled() => Readiness::Cancelled,
        exit = exited.exited() => Readiness::ExitedEarly(exit),
        healthy = signal => {
            // Exit and signal may settle in the same tick.
            if let Some(exit) = exited.try_exited() {
                Readiness::ExitedEarly(exit)
            } else if healthy {
                Readiness::Ready
            } else {
                Readiness::NotHealthy
            }
        }
    }
}

/// Poll `url` until it answers with a success status or attempts run out.
pub async fn poll_health(
    url: &str,
    interval: Duration,
    max_attempts: u32,
    request_timeout: Duration,
) -> bool {
    let client = match reqwest::Client::builder().timeout(request_timeout).build() {
        Ok(client) => client,
        Err(err) => {
            tracing::error!("Failed to build health check client: {err}");
            return false;
        }
    };

    for attempt in 1..=max_attempts {
        match client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Health check {url} succeeded after {attempt} attempt(s)");
                return true;
            }
            Ok(response) => {
                tracing::trace!("Health check {url} answered {}", response.status());
            }
            Err(err) => {
                tracing::trace!("Health check {url} failed: {err}");
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }

    tracing::warn!("Health check {url} gave up after {max_attempts} attempt(s)");
    false
}
