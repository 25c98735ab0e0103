//! Walk-forward executor: parallel windows, deadlines, bounded retries.
//!
//! Windows are independent and may complete in any order; results are
//! re-sorted by index before the validation record is assembled. A window
//! that exhausts its retries is recorded `Error` and does not fail the
//! validation unless the failure budget is exceeded; that decision belongs
//! to the caller via `failed_window_budget_exceeded`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Duration};

use research_models::{WindowResult, WindowStatus};
use research_store::WalkForwardConfig;

use crate::backend::{BacktestBackend, BacktestRequest};
use crate::metrics::compute_window_metrics;
use crate::regime::ReferenceData;
use crate::windows::slice_windows;

/// Executor-level failures (configuration, not window outcomes).
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("no windows produced for anchor year {0}")]
    NoWindows(i32),
}

pub struct WalkForwardExecutor {
    backend: Arc<dyn BacktestBackend>,
    reference: Arc<dyn ReferenceData>,
    config: WalkForwardConfig,
}

impl WalkForwardExecutor {
    pub fn new(
        backend: Arc<dyn BacktestBackend>,
        reference: Arc<dyn ReferenceData>,
        config: WalkForwardConfig,
    ) -> Self {
        Self {
            backend,
            reference,
            config,
        }
    }

    /// Run all windows for an artifact. Returns per-window results sorted
    /// by index; errored windows carry their final failure message.
    pub async fn execute(
        &self,
        code: &str,
        anchor_year: i32,
        seed: u64,
    ) -> Result<Vec<WindowResult>, ExecutorError> {
        let spans = slice_windows(
            anchor_year,
            self.config.window_count,
            self.config.window_span_years,
        );
        if spans.is_empty() {
            return Err(ExecutorError::NoWindows(anchor_year));
        }

        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut handles = Vec::with_capacity(spans.len());

        for (i, (start, end)) in spans.into_iter().enumerate() {
            let index = (i + 1) as u32;
            let backend = Arc::clone(&self.backend);
            let reference = Arc::clone(&self.reference);
            let semaphore = Arc::clone(&semaphore);
            let config = self.config.clone();
            let code = code.to_string();

            handles.push(tokio::spawn(async move {
                // Closing the semaphore is not part of this design; a
                // failed acquire means the runtime is shutting down.
                let Ok(_permit) = semaphore.acquire().await else {
                    return error_window(index, start, end, "executor shutting down");
                };
                run_window(&*backend, &*reference, &config, &code, index, start, end, seed).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(window) => results.push(window),
                Err(join_error) => {
                    tracing::error!(%join_error, "window task panicked");
                }
            }
        }
        results.sort_by_key(|w| w.index);
        Ok(results)
    }

    /// Whether the errored-window count exceeds the configured budget.
    pub fn failed_window_budget_exceeded(&self, windows: &[WindowResult]) -> bool {
        let failed = windows
            .iter()
            .filter(|w| w.status == WindowStatus::Error)
            .count() as u32;
        failed > self.config.max_failed_windows
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_window(
    backend: &dyn BacktestBackend,
    reference: &dyn ReferenceData,
    config: &WalkForwardConfig,
    code: &str,
    index: u32,
    start: NaiveDate,
    end: NaiveDate,
    seed: u64,
) -> WindowResult {
    let request = BacktestRequest {
        code: code.to_string(),
        start,
        end,
        seed: seed.wrapping_add(index as u64),
        parameters: BTreeMap::new(),
    };

    let mut last_error = String::new();
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.backoff_base_secs * (1 << (attempt - 1)) as u64;
            sleep(Duration::from_secs(backoff)).await;
        }

        let deadline = Duration::from_secs(config.dispatch_timeout_secs);
        match timeout(deadline, backend.submit(&request)).await {
            Ok(Ok(run)) => {
                let metrics = compute_window_metrics(&run);
                let regimes = crate::regime::RegimeTagger::new(reference).tag(start, end);
                tracing::info!(index, %start, %end, sharpe = metrics.sharpe, "window complete");
                return WindowResult {
                    index,
                    start,
                    end,
                    status: WindowStatus::Completed,
                    metrics: Some(metrics),
                    regimes,
                    error: None,
                };
            }
            Ok(Err(e)) => {
                last_error = e.to_string();
                tracing::warn!(index, attempt, error = %last_error, "window dispatch failed");
            }
            Err(_) => {
                last_error = format!("timeout after {}s", config.dispatch_timeout_secs);
                tracing::warn!(index, attempt, "window dispatch timed out");
            }
        }
    }

    error_window(index, start, end, &last_error)
}

fn error_window(index: u32, start: NaiveDate, end: NaiveDate, message: &str) -> WindowResult {
    WindowResult {
        index,
        start,
        end,
        status: WindowStatus::Error,
        metrics: None,
        regimes: None,
        error: Some(message.to_string()),
    }
}
