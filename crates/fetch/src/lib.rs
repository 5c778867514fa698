//! Fan-out/fan-in resource fetcher.
//!
//! A logical describe is split into independent sub-requests, each running in
//! its own task. The collector returns on the first error, on completion of
//! all sub-requests, or when the shared deadline elapses, whichever comes
//! first. Sub-requests receive a child cancellation token which is fired (and
//! their tasks aborted) whenever the collector stops waiting, so abandoned
//! work does not outlive the fetch.
//!
//! The fetcher never touches the page cache or the UI; callers decide what to
//! do with the returned result.

#![forbid(unsafe_code)]

use std::future::Future;
use std::time::Duration;

use cinder_api::ApiError;
use metrics::{counter, histogram};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod describe;
mod manage;

pub use describe::{
    ClusterOverview, Fetcher, GroupLag, NodeConfig, SchemaDetail, TopicDescription,
};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FetchError {
    /// The provider rejected or failed one of the sub-requests.
    #[error("{0}")]
    Remote(ApiError),
    /// The composite deadline elapsed before every sub-request answered.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// The owning dispatcher shut down.
    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

impl From<ApiError> for FetchError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Cancelled => FetchError::Cancelled,
            other => FetchError::Remote(other),
        }
    }
}

/// One composite fetch stage: spawn sub-requests, then `collect`.
pub struct FanOut<P> {
    label: &'static str,
    deadline: Instant,
    budget: Duration,
    cancel: CancellationToken,
    set: JoinSet<Result<P, ApiError>>,
}

impl<P: Send + 'static> FanOut<P> {
    /// `deadline` is absolute so several stages of one describe share a budget;
    /// `budget` is only reported back in timeout errors.
    pub fn new(
        label: &'static str,
        deadline: Instant,
        budget: Duration,
        parent: &CancellationToken,
    ) -> Self {
        Self { label, deadline, budget, cancel: parent.child_token(), set: JoinSet::new() }
    }

    /// Start a sub-request. The closure receives the token it must hand to the
    /// provider call.
    pub fn spawn<F, Fut>(&mut self, sub: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<P, ApiError>> + Send + 'static,
    {
        let fut = sub(self.cancel.clone());
        self.set.spawn(fut);
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Wait for all sub-requests. Completion order is not preserved.
    pub async fn collect(self) -> Result<Vec<P>, FetchError> {
        let Self { label, deadline, budget, cancel, mut set } = self;
        let expected = set.len();
        let mut parts = Vec::with_capacity(expected);
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(FetchError::Cancelled),
                joined = set.join_next() => match joined {
                    None => break Ok(()),
                    Some(Ok(Ok(part))) => parts.push(part),
                    Some(Ok(Err(e))) => break Err(FetchError::from(e)),
                    Some(Err(join_err)) => {
                        break Err(FetchError::Remote(ApiError::Remote(format!(
                            "sub-request aborted: {join_err}"
                        ))))
                    }
                },
                _ = &mut sleep => break Err(FetchError::Timeout(budget)),
            }
        };

        match outcome {
            Ok(()) => {
                debug!(op = label, parts = parts.len(), "fan-in complete");
                Ok(parts)
            }
            Err(e) => {
                let pending = set.len();
                cancel.cancel();
                set.abort_all();
                if e.is_timeout() {
                    counter!("fetch_timeouts_total", 1, "op" => label);
                }
                warn!(op = label, expected, pending, error = %e, "fan-in abandoned");
                Err(e)
            }
        }
    }
}

/// Record duration and outcome of one logical describe.
pub(crate) async fn observed<T, Fut>(label: &'static str, op: Fut) -> Result<T, FetchError>
where
    Fut: Future<Output = Result<T, FetchError>>,
{
    let t0 = std::time::Instant::now();
    let fetch_id = uuid::Uuid::new_v4();
    debug!(op = label, %fetch_id, "fetch start");
    counter!("fetch_total", 1, "op" => label);
    let res = op.await;
    let took_ms = t0.elapsed().as_secs_f64() * 1000.0;
    histogram!("fetch_ms", took_ms, "op" => label);
    match &res {
        Ok(_) => info!(op = label, %fetch_id, took_ms, "fetch ok"),
        Err(e) => {
            counter!("fetch_errors_total", 1, "op" => label);
            warn!(op = label, %fetch_id, took_ms, error = %e, "fetch failed");
        }
    }
    res
}
