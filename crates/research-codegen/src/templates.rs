//! Tier-1 archetype templates and the tier-2/3 emitters.
//!
//! Templates are typed string assembly, not a template engine: every byte of
//! output is a function of the normalized definition, so determinism is
//! checkable by hashing. Emitted code reads its date range and cash from
//! harness-supplied parameters and never embeds a calendar date.

use std::fmt::Write;

use research_models::{Archetype, StrategyDefinition};

use crate::dsl::{compile_expr, Compiled, Expr};
use crate::GenerateError;

/// Default parameter values per archetype, applied when the definition does
/// not override them.
fn parameter(def: &StrategyDefinition, name: &str, default: f64) -> f64 {
    def.parameters.get(name).copied().unwrap_or(default)
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Shared file header. The archetype/entry/exit comment lines double as the
/// carrier for the logic fingerprint.
fn header(class_name: &str, label: &str, def: &StrategyDefinition) -> String {
    let mut out = String::new();
    out.push_str("from AlgorithmImports import *\n\n\n");
    let _ = writeln!(out, "# archetype: {label}");
    let _ = writeln!(out, "# entry: {}", def.entry.condition);
    for path in &def.exit.paths {
        let _ = writeln!(
            out,
            "# exit: {} {}",
            path.name,
            path.condition.as_deref().unwrap_or("")
        );
    }
    let _ = writeln!(out, "class {class_name}(QCAlgorithm):");
    out
}

/// Initialize() prologue: cash and resolution only. The harness owns dates.
fn initialize_prologue(out: &mut String) {
    out.push_str("    def Initialize(self):\n");
    out.push_str("        # Window dates are injected by the validation harness.\n");
    out.push_str(
        "        self.SetCash(int(self.GetParameter(\"initial_cash\", \"100000\")))\n",
    );
    out.push_str("        self.SetBenchmark(\"SPY\")\n");
}

fn add_universe(out: &mut String, def: &StrategyDefinition) {
    out.push_str("        self.symbols = []\n");
    for symbol in &def.universe.symbols {
        let _ = writeln!(
            out,
            "        self.symbols.append(self.AddEquity(\"{symbol}\", Resolution.Daily).Symbol)"
        );
    }
}

/// Expand a tier-1 archetype.
pub fn expand(
    archetype: Archetype,
    class_name: &str,
    def: &StrategyDefinition,
) -> Result<String, GenerateError> {
    if def.universe.symbols.is_empty() {
        return Err(GenerateError::Unsupported(
            "tier-1 templates require a static universe".into(),
        ));
    }
    Ok(match archetype {
        Archetype::MomentumRotation => momentum_rotation(class_name, def),
        Archetype::MeanReversion => mean_reversion(class_name, def),
        Archetype::TrendFollowing => trend_following(class_name, def),
        Archetype::DualMomentum => dual_momentum(class_name, def),
        Archetype::Breakout => breakout(class_name, def),
        Archetype::DividendCapture => dividend_capture(class_name, def),
    })
}

fn momentum_rotation(class_name: &str, def: &StrategyDefinition) -> String {
    let lookback = format_value(parameter(def, "lookback_days", 252.0));
    let skip = format_value(parameter(def, "skip_days", 21.0));
    let top_n = format_value(parameter(def, "hold_top_n", 1.0));

    let mut out = header(class_name, "momentum_rotation", def);
    initialize_prologue(&mut out);
    add_universe(&mut out, def);
    let _ = write!(
        out,
        r#"        self.lookback = {lookback}
        self.skip = {skip}
        self.top_n = {top_n}
        self.momentum = {{s: self.MOMP(s, self.lookback, Resolution.Daily) for s in self.symbols}}
        self.Schedule.On(
            self.DateRules.MonthStart(self.symbols[0]),
            self.TimeRules.AfterMarketOpen(self.symbols[0], 30),
            self.Rebalance,
        )

    def Rebalance(self):
        ready = [s for s in self.symbols if self.momentum[s].IsReady]
        if not ready:
            return
        ranked = sorted(ready, key=lambda s: self.momentum[s].Current.Value, reverse=True)
        winners = ranked[: int(self.top_n)]
        for s in self.symbols:
            if s not in winners and self.Portfolio[s].Invested:
                self.Liquidate(s)
        weight = 1.0 / max(1, len(winners))
        for s in winners:
            self.SetHoldings(s, weight)
"#
    );
    out
}

fn mean_reversion(class_name: &str, def: &StrategyDefinition) -> String {
    let period = format_value(parameter(def, "rsi_period", 2.0));
    let buy_below = format_value(parameter(def, "buy_below", 10.0));
    let sell_above = format_value(parameter(def, "sell_above", 70.0));

    let mut out = header(class_name, "mean_reversion", def);
    initialize_prologue(&mut out);
    add_universe(&mut out, def);
    let _ = write!(
        out,
        r#"        self.rsi = {{s: self.RSI(s, {period}, MovingAverageType.Wilders, Resolution.Daily) for s in self.symbols}}
        self.buy_below = {buy_below}
        self.sell_above = {sell_above}

    def OnData(self, data):
        for s in self.symbols:
            if not self.rsi[s].IsReady:
                continue
            value = self.rsi[s].Current.Value
            if value < self.buy_below and not self.Portfolio[s].Invested:
                self.SetHoldings(s, 1.0 / len(self.symbols))
            elif value > self.sell_above and self.Portfolio[s].Invested:
                self.Liquidate(s)
"#
    );
    out
}

fn trend_following(class_name: &str, def: &StrategyDefinition) -> String {
    let period = format_value(parameter(def, "sma_period", 200.0));

    let mut out = header(class_name, "trend_following", def);
    initialize_prologue(&mut out);
    add_universe(&mut out, def);
    let _ = write!(
        out,
        r#"        self.trend = {{s: self.SMA(s, {period}, Resolution.Daily) for s in self.symbols}}

    def OnData(self, data):
        for s in self.symbols:
            if not self.trend[s].IsReady or s not in data.Bars:
                continue
            price = data.Bars[s].Close
            if price > self.trend[s].Current.Value and not self.Portfolio[s].Invested:
                self.SetHoldings(s, 1.0 / len(self.symbols))
            elif price < self.trend[s].Current.Value and self.Portfolio[s].Invested:
                self.Liquidate(s)
"#
    );
    out
}

fn dual_momentum(class_name: &str, def: &StrategyDefinition) -> String {
    let lookback = format_value(parameter(def, "lookback_days", 252.0));

    let mut out = header(class_name, "dual_momentum", def);
    initialize_prologue(&mut out);
    add_universe(&mut out, def);
    let _ = write!(
        out,
        r#"        self.lookback = {lookback}
        # Last symbol is the defensive asset for the absolute-momentum leg.
        self.defensive = self.symbols[-1]
        self.risk_assets = self.symbols[:-1]
        self.momentum = {{s: self.MOMP(s, self.lookback, Resolution.Daily) for s in self.symbols}}
        self.Schedule.On(
            self.DateRules.MonthStart(self.symbols[0]),
            self.TimeRules.AfterMarketOpen(self.symbols[0], 30),
            self.Rebalance,
        )

    def Rebalance(self):
        ready = [s for s in self.risk_assets if self.momentum[s].IsReady]
        if not ready:
            return
        best = max(ready, key=lambda s: self.momentum[s].Current.Value)
        # Relative momentum picks the asset; absolute momentum gates it.
        target = best if self.momentum[best].Current.Value > 0 else self.defensive
        for s in self.symbols:
            if s != target and self.Portfolio[s].Invested:
                self.Liquidate(s)
        self.SetHoldings(target, 1.0)
"#
    );
    out
}

fn breakout(class_name: &str, def: &StrategyDefinition) -> String {
    let channel = format_value(parameter(def, "channel_days", 55.0));
    let exit_channel = format_value(parameter(def, "exit_channel_days", 20.0));

    let mut out = header(class_name, "breakout", def);
    initialize_prologue(&mut out);
    add_universe(&mut out, def);
    let _ = write!(
        out,
        r#"        self.highs = {{s: self.MAX(s, {channel}, Resolution.Daily) for s in self.symbols}}
        self.lows = {{s: self.MIN(s, {exit_channel}, Resolution.Daily) for s in self.symbols}}

    def OnData(self, data):
        for s in self.symbols:
            if not (self.highs[s].IsReady and self.lows[s].IsReady) or s not in data.Bars:
                continue
            price = data.Bars[s].Close
            if price >= self.highs[s].Current.Value and not self.Portfolio[s].Invested:
                self.SetHoldings(s, 1.0 / len(self.symbols))
            elif price <= self.lows[s].Current.Value and self.Portfolio[s].Invested:
                self.Liquidate(s)
"#
    );
    out
}

fn dividend_capture(class_name: &str, def: &StrategyDefinition) -> String {
    let entry_days = format_value(parameter(def, "days_before_ex", 2.0));
    let hold_days = format_value(parameter(def, "hold_days", 3.0));

    let mut out = header(class_name, "dividend_capture", def);
    initialize_prologue(&mut out);
    add_universe(&mut out, def);
    let _ = write!(
        out,
        r#"        self.entry_days = {entry_days}
        self.hold_days = {hold_days}
        self.entries = {{}}

    def OnData(self, data):
        for s in self.symbols:
            if s in data.Dividends and self.Portfolio[s].Invested:
                continue
            # Enter ahead of the ex-date published by the calendar feed.
            upcoming = self.Securities[s].Cache.GetData(Dividend)
            if upcoming is not None and not self.Portfolio[s].Invested:
                self.SetHoldings(s, 1.0 / len(self.symbols))
                self.entries[s] = self.Time
            if s in self.entries and self.Portfolio[s].Invested:
                held = (self.Time - self.entries[s]).days
                if held >= int(self.hold_days):
                    self.Liquidate(s)
                    del self.entries[s]
"#
    );
    out
}

// =============================================================================
// Tier 2
// =============================================================================

/// Expand a composed (DSL) strategy around compiled entry/exit conditions.
pub fn expand_composed(
    class_name: &str,
    def: &StrategyDefinition,
    entry: &Expr,
    exit: &Expr,
) -> String {
    let entry_compiled = compile_expr(entry);
    let exit_compiled = compile_expr(exit);

    let mut out = String::new();
    out.push_str("from AlgorithmImports import *\n\n\n");
    out.push_str("# archetype: composed\n");
    // Fingerprint comments carry the DSL source verbatim for the
    // pre-execution cross-check.
    if let research_models::StrategyLogic::Composed {
        entry_expr,
        exit_expr,
    } = &def.logic
    {
        let _ = writeln!(out, "# entry: {entry_expr}");
        let _ = writeln!(out, "# exit: {exit_expr}");
    }
    let _ = writeln!(out, "class {class_name}(QCAlgorithm):");
    initialize_prologue(&mut out);
    add_universe(&mut out, def);
    out.push_str("        self.primary = self.symbols[0]\n");
    out.push_str("        self.slots = {}\n");
    out.push_str("        self.slot_windows = {}\n");
    out.push_str("        self.bars = RollingWindow[TradeBar](2)\n");
    emit_slot_registrations(&mut out, &entry_compiled);
    emit_slot_registrations(&mut out, &exit_compiled);
    let _ = write!(
        out,
        r#"
    def slot_value(self, name):
        return self.slots[name].Current.Value

    def slot_previous(self, name):
        window = self.slot_windows[name]
        return window[1].Value if window.IsReady else self.slot_value(name)

    def series_value(self, name):
        bar = self.bars[0]
        return getattr(bar, name.capitalize())

    def series_previous(self, name):
        bar = self.bars[1] if self.bars.IsReady else self.bars[0]
        return getattr(bar, name.capitalize())

    def OnData(self, data):
        if self.primary not in data.Bars:
            return
        self.bars.Add(data.Bars[self.primary])
        if not all(ind.IsReady for ind in self.slots.values()):
            return
        if not self.bars.IsReady:
            return
        entry_signal = {entry}
        exit_signal = {exit}
        if entry_signal and not self.Portfolio[self.primary].Invested:
            self.SetHoldings(self.primary, 1.0)
        elif exit_signal and self.Portfolio[self.primary].Invested:
            self.Liquidate(self.primary)
        for name, ind in self.slots.items():
            self.slot_windows[name].Add(ind.Current)
"#,
        entry = entry_compiled.condition,
        exit = exit_compiled.condition,
    );
    out
}

fn emit_slot_registrations(out: &mut String, compiled: &Compiled) {
    for (slot, indicator, period) in &compiled.slots {
        let ctor = match indicator.as_str() {
            "sma" => format!("self.SMA(self.primary, {period}, Resolution.Daily)"),
            "ema" => format!("self.EMA(self.primary, {period}, Resolution.Daily)"),
            "roc" => format!("self.ROC(self.primary, {period}, Resolution.Daily)"),
            "rsi" => format!(
                "self.RSI(self.primary, {period}, MovingAverageType.Wilders, Resolution.Daily)"
            ),
            "std" => format!("self.STD(self.primary, {period}, Resolution.Daily)"),
            "max" => format!("self.MAX(self.primary, {period}, Resolution.Daily)"),
            "min" => format!("self.MIN(self.primary, {period}, Resolution.Daily)"),
            other => format!("self.SMA(self.primary, {period}, Resolution.Daily)  # {other}"),
        };
        let _ = writeln!(out, "        self.slots[\"{slot}\"] = {ctor}");
        let _ = writeln!(
            out,
            "        self.slot_windows[\"{slot}\"] = RollingWindow[IndicatorDataPoint](2)"
        );
    }
}

// =============================================================================
// Tier 3
// =============================================================================

/// Wrap free-form tier-3 code with the standard header. The artifact is
/// flagged `needs_review`; nothing here executes without a human approval.
pub fn wrap_custom(class_name: &str, body: &str) -> String {
    let mut out = String::new();
    out.push_str("from AlgorithmImports import *\n\n\n");
    out.push_str("# archetype: custom\n");
    out.push_str("# NOTE: free-form tier-3 code; review required before execution.\n");
    let _ = writeln!(out, "class {class_name}(QCAlgorithm):");
    out.push_str("    def Initialize(self):\n");
    out.push_str(
        "        self.SetCash(int(self.GetParameter(\"initial_cash\", \"100000\")))\n\n",
    );
    for line in body.lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            let _ = writeln!(out, "    {line}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use research_models::{
        Entry, EntryKind, Exit, ExitKind, ExitPath, Position, PositionManagement, SizingMethod,
        StrategyLogic, Tier, Universe,
    };
    use std::collections::BTreeMap;

    fn definition(symbols: &[&str]) -> StrategyDefinition {
        StrategyDefinition {
            tier: Tier::Templated,
            logic: StrategyLogic::Template {
                archetype: Archetype::MomentumRotation,
            },
            universe: Universe {
                symbols: symbols.iter().map(|s| s.to_string()).collect(),
                base: None,
                criteria: vec![],
                point_in_time: true,
            },
            entry: Entry {
                kind: EntryKind::Technical,
                condition: "rank by momentum".into(),
                indicators: vec![],
                filters: vec![],
            },
            position: Position {
                sizing: SizingMethod::EqualWeight,
                sizing_params: BTreeMap::new(),
                max_leverage: 1.0,
                max_positions: None,
                max_position_pct: None,
            },
            exit: Exit {
                paths: vec![ExitPath {
                    name: "rotate".into(),
                    kind: ExitKind::SignalReversal,
                    params: BTreeMap::new(),
                    condition: None,
                }],
            },
            position_management: PositionManagement::default(),
            regimes: None,
            data_requirements: vec![],
            parameters: BTreeMap::new(),
            assumptions: vec![],
            risks: vec![],
        }
    }

    #[test]
    fn test_momentum_template_includes_universe() {
        let def = definition(&["SPY", "EFA", "AGG"]);
        let code = momentum_rotation("StrategyAbc", &def);
        assert!(code.contains("self.AddEquity(\"SPY\""));
        assert!(code.contains("self.AddEquity(\"AGG\""));
        assert!(code.contains("class StrategyAbc(QCAlgorithm):"));
    }

    #[test]
    fn test_parameters_override_defaults() {
        let mut def = definition(&["SPY"]);
        def.parameters.insert("sma_period".into(), 100.0);
        let code = trend_following("S", &def);
        assert!(code.contains("self.SMA(s, 100, Resolution.Daily)"));
    }

    #[test]
    fn test_empty_universe_rejected() {
        let def = definition(&[]);
        assert!(expand(Archetype::Breakout, "S", &def).is_err());
    }

    #[test]
    fn test_custom_wrap_indents_body() {
        let code = wrap_custom("S", "def OnData(self, data):\n    pass");
        assert!(code.contains("    def OnData(self, data):"));
        assert!(code.contains("review required"));
    }
}
