//! Window metrics from raw backtest output.
//!
//! All annualization uses 252 trading days. Drawdown is reported as a
//! positive fraction.

use research_models::WindowMetrics;

use crate::backend::BacktestRun;

const TRADING_DAYS: f64 = 252.0;

/// Compute the full metric set for one window.
pub fn compute_window_metrics(run: &BacktestRun) -> WindowMetrics {
    let returns: Vec<f64> = run.daily_returns.iter().map(|(_, r)| *r).collect();
    let benchmark: Vec<f64> = run.benchmark_returns.iter().map(|(_, r)| *r).collect();

    let (wins, losses): (Vec<f64>, Vec<f64>) = run
        .trades
        .iter()
        .map(|t| t.pnl)
        .partition(|&pnl| pnl > 0.0);
    let gross_profit: f64 = wins.iter().sum();
    let gross_loss: f64 = losses.iter().map(|l| l.abs()).sum();

    WindowMetrics {
        cagr: cagr(&returns),
        sharpe: sharpe(&returns),
        sortino: sortino(&returns),
        max_drawdown: max_drawdown(&returns),
        win_rate: if run.trades.is_empty() {
            0.0
        } else {
            wins.len() as f64 / run.trades.len() as f64
        },
        profit_factor: if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        },
        trade_count: run.trades.len() as u32,
        volatility: annualized_vol(&returns),
        benchmark_sharpe: sharpe(&benchmark),
        benchmark_cagr: cagr(&benchmark),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64).sqrt()
}

fn cagr(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let growth: f64 = returns.iter().map(|r| 1.0 + r).product();
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(TRADING_DAYS / returns.len() as f64) - 1.0
}

fn sharpe(returns: &[f64]) -> f64 {
    let sd = std_dev(returns);
    if sd == 0.0 {
        return 0.0;
    }
    mean(returns) / sd * TRADING_DAYS.sqrt()
}

fn sortino(returns: &[f64]) -> f64 {
    let downside: Vec<f64> = returns.iter().copied().filter(|&r| r < 0.0).collect();
    if downside.len() < 2 {
        return 0.0;
    }
    let downside_dev = (downside.iter().map(|r| r * r).sum::<f64>() / downside.len() as f64).sqrt();
    if downside_dev == 0.0 {
        return 0.0;
    }
    mean(returns) / downside_dev * TRADING_DAYS.sqrt()
}

fn annualized_vol(returns: &[f64]) -> f64 {
    std_dev(returns) * TRADING_DAYS.sqrt()
}

/// Peak-to-trough drawdown of the cumulative equity path, positive.
fn max_drawdown(returns: &[f64]) -> f64 {
    let mut equity = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut worst = 0.0_f64;
    for r in returns {
        equity *= 1.0 + r;
        peak = peak.max(equity);
        if peak > 0.0 {
            worst = worst.max(1.0 - equity / peak);
        }
    }
    worst
}
