//! # Research Backtest
//!
//! Walk-forward execution: calendar window slicing, parallel dispatch to a
//! pluggable backend, per-window metrics, and regime tagging.
//!
//! ## Guarantees
//! - Windows are non-overlapping, calendar-aligned, chronological.
//! - Dates flow from the executor to the backend; generated code never
//!   carries them.
//! - Every dispatch runs under a deadline with bounded retries and
//!   exponential backoff; a failed window is recorded, not fatal, until the
//!   failure budget is exceeded.

pub mod backend;
pub mod executor;
pub mod metrics;
pub mod regime;
pub mod windows;

pub use backend::{BacktestBackend, BacktestRequest, BacktestRun, TradeRecord};
pub use executor::{ExecutorError, WalkForwardExecutor};
pub use metrics::compute_window_metrics;
pub use regime::{RegimeTagger, ReferenceData, SeriesReferenceData};
pub use windows::slice_windows;
