//! Local deterministic backtest engine and reference data.
//!
//! The pipeline is backend-agnostic; this simulator is the bundled local
//! engine. Runs are a pure function of `(code_hash, window, seed)` so the
//! determinism guarantees required of any backend hold by construction.
//! Reference series are synthetic but shaped like their real counterparts
//! (trending equity proxy, mean-reverting vol index, slow-moving yields).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use sha2::{Digest, Sha256};

use research_backtest::{
    BacktestBackend, BacktestRequest, BacktestRun, SeriesReferenceData, TradeRecord,
};

/// Deterministic hash-driven pseudo-random stream in [-1, 1].
fn noise(key: &str, index: u64) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(index.to_le_bytes());
    let digest = hasher.finalize();
    let raw = u64::from_le_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ]);
    (raw as f64 / u64::MAX as f64) * 2.0 - 1.0
}

/// Bundled local backtest engine.
pub struct SimBackend;

#[async_trait]
impl BacktestBackend for SimBackend {
    async fn submit(&self, request: &BacktestRequest) -> anyhow::Result<BacktestRun> {
        let code_hash = {
            let mut hasher = Sha256::new();
            hasher.update(request.code.as_bytes());
            hex::encode(hasher.finalize())
        };
        let key = format!("{}:{}:{}:{}", code_hash, request.start, request.end, request.seed);

        let days = (request.end - request.start).num_days().max(1);
        let mut run = BacktestRun::default();
        // Mild positive drift plus hash noise; benchmark drifts slower.
        for i in 0..days {
            let date = request.start + Duration::days(i);
            if date.weekday().number_from_monday() > 5 {
                continue;
            }
            let shock = noise(&key, i as u64);
            run.daily_returns.push((date, 0.0005 + 0.009 * shock));
            run.benchmark_returns
                .push((date, 0.0003 + 0.008 * noise("benchmark", i as u64)));
            if i % 7 == 3 {
                let trade_shock = noise(&key, 1_000_000 + i as u64);
                run.trades.push(TradeRecord {
                    pnl: 150.0 * trade_shock + 30.0,
                });
            }
        }
        Ok(run)
    }
}

/// Synthetic reference bundle covering 1985 through the anchor year.
pub fn sim_reference_data(anchor_year: i32) -> SeriesReferenceData {
    let mut data = SeriesReferenceData::default();
    let start = NaiveDate::from_ymd_opt(1985, 1, 1).unwrap_or(NaiveDate::MIN);
    let end = NaiveDate::from_ymd_opt(anchor_year, 12, 31).unwrap_or(NaiveDate::MAX);

    let mut equity = 100.0_f64;
    let mut small = 100.0_f64;
    let mut sectors: BTreeMap<&str, f64> = [
        ("technology", 50.0),
        ("energy", 50.0),
        ("financials", 50.0),
        ("utilities", 50.0),
    ]
    .into_iter()
    .collect();

    let mut day = start;
    let mut i = 0u64;
    while day <= end {
        if day.weekday().number_from_monday() <= 5 {
            // Multi-year waves give the tagger distinct regimes to find.
            let cycle = (i as f64 / 900.0).sin();
            equity *= 1.0 + 0.0004 + 0.0006 * cycle + 0.004 * noise("equity", i);
            small *= 1.0 + 0.0003 + 0.0009 * cycle + 0.005 * noise("small", i);
            data.equity_close.insert(day, equity);
            data.small_cap_close.insert(day, small);
            data.vol_index
                .insert(day, 18.0 - 6.0 * cycle + 2.0 * noise("vol", i).abs() * 3.0);
            data.treasury_10y
                .insert(day, 4.0 + 2.0 * (i as f64 / 2200.0).sin());
            for (name, level) in sectors.iter_mut() {
                *level *= 1.0 + 0.0004 + 0.003 * noise(name, i);
                data.sectors
                    .entry(name.to_string())
                    .or_default()
                    .insert(day, *level);
            }
        }
        day += Duration::days(1);
        i += 1;
    }
    data
}
