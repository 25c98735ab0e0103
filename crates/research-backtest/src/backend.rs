//! Backtest backend interface.
//!
//! The core is backend-agnostic: a local containerized engine or a cloud
//! service both satisfy this trait. Required guarantees: deterministic
//! output for identical inputs, explicit cost parameters, and no data
//! visible beyond the requested range.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;

/// One dispatch to the backend. Dates live here and only here.
#[derive(Debug, Clone)]
pub struct BacktestRequest {
    /// Generated artifact code (dateless by contract).
    pub code: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Seed forwarded for any stochastic fill modeling.
    pub seed: u64,
    /// Harness parameters injected into the run (cash, costs).
    pub parameters: BTreeMap<String, String>,
}

/// One closed trade.
#[derive(Debug, Clone)]
pub struct TradeRecord {
    /// Net profit in account currency.
    pub pnl: f64,
}

/// Raw result of one backtest run.
#[derive(Debug, Clone, Default)]
pub struct BacktestRun {
    /// Daily strategy returns in date order.
    pub daily_returns: Vec<(NaiveDate, f64)>,
    /// Daily benchmark returns over the same range.
    pub benchmark_returns: Vec<(NaiveDate, f64)>,
    pub trades: Vec<TradeRecord>,
}

/// The backend seam (C7's external dependency).
#[async_trait]
pub trait BacktestBackend: Send + Sync {
    async fn submit(&self, request: &BacktestRequest) -> anyhow::Result<BacktestRun>;
}
