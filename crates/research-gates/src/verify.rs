//! Static verification checks on the strategy document.
//!
//! Verification runs on the document, before generation and execution.
//! Each check is deterministic; any enabled check in `fail` blocks the
//! record. The fingerprint cross-check runs after generation and guards
//! the artifact against drift from its document.

use chrono::NaiveDate;

use research_codegen::{find_literal_date, LogicFingerprint};
use research_models::{SizingMethod, StrategyDefinition, StrategyDocument, StrategyLogic};

use crate::registry::DataRegistry;
use crate::{CheckResult, VerificationReport};

/// Keywords in a condition that read data not yet observable.
const LOOK_AHEAD_KEYWORDS: &[&str] = &[
    "tomorrow",
    "next_day",
    "next day",
    "next_bar",
    "next bar",
    "next_close",
    "next close",
    "future",
    "will be",
    "t+1",
    "t+2",
    "same-bar close",
    "today's release",
];

/// Universe phrasing that implies current-membership (survivorship) bias.
const SURVIVORSHIP_KEYWORDS: &[&str] = &[
    "current constituents",
    "current members",
    "today's index",
    "largest today",
];

pub struct VerificationEngine<'a> {
    registry: &'a DataRegistry,
    enabled: Vec<String>,
}

impl<'a> VerificationEngine<'a> {
    pub fn new(registry: &'a DataRegistry, enabled: &[String]) -> Self {
        Self {
            registry,
            enabled: enabled.to_vec(),
        }
    }

    fn run_check(
        &self,
        name: &'static str,
        check: impl FnOnce() -> CheckResult,
    ) -> CheckResult {
        if self.enabled.iter().any(|c| c == name) {
            check()
        } else {
            CheckResult::skip(name, "disabled by configuration")
        }
    }

    /// Run all enabled document checks for the given history window.
    pub fn verify_document(
        &self,
        doc: &StrategyDocument,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> VerificationReport {
        let def = &doc.definition;
        let checks = vec![
            self.run_check("look_ahead_bias", || check_look_ahead(def)),
            self.run_check("survivorship", || check_survivorship(def)),
            self.run_check("position_sizing", || check_position_sizing(def)),
            self.run_check("data_availability", || {
                check_data_availability(def, self.registry, window_start, window_end)
            }),
            self.run_check("parameter_sanity", || check_parameter_sanity(def)),
            self.run_check("hardcoded_values", || check_hardcoded_values(def)),
        ];
        let report = VerificationReport::new(checks);
        tracing::info!(
            id = %doc.id,
            passed = report.passed,
            failures = report.failures().count(),
            "document verification complete"
        );
        report
    }

    /// Cross-check the generated artifact's fingerprint against the
    /// document. A mismatch means the artifact no longer reflects the
    /// definition (stale regeneration or a generator bug) and fails the
    /// pre-execution gate.
    pub fn check_fingerprint(
        &self,
        doc: &StrategyDocument,
        fingerprint: &LogicFingerprint,
    ) -> CheckResult {
        let def = doc.definition.normalized();

        // Static universes must match exactly, both directions.
        if !def.universe.symbols.is_empty() {
            for symbol in &def.universe.symbols {
                if !fingerprint.universe.contains(symbol) {
                    return CheckResult::fail(
                        "fingerprint",
                        format!("artifact missing universe symbol {symbol}"),
                    );
                }
            }
            for symbol in &fingerprint.universe {
                if !def.universe.symbols.contains(symbol) {
                    return CheckResult::fail(
                        "fingerprint",
                        format!("artifact trades undeclared symbol {symbol}"),
                    );
                }
            }
        }

        match &def.logic {
            StrategyLogic::Template { archetype } => {
                let label = format!("{archetype:?}");
                let label = to_snake_case(&label);
                if fingerprint.archetype() != Some(label.as_str()) {
                    return CheckResult::fail(
                        "fingerprint",
                        format!(
                            "artifact archetype {:?} does not match document {label}",
                            fingerprint.archetype()
                        ),
                    );
                }
            }
            StrategyLogic::Composed { entry_expr, .. } => {
                let found = fingerprint
                    .entry_conditions()
                    .any(|c| c == entry_expr.as_str());
                if !found {
                    return CheckResult::fail(
                        "fingerprint",
                        "artifact entry condition does not match document expression",
                    );
                }
            }
            StrategyLogic::Custom { .. } => {}
        }

        CheckResult::pass("fingerprint", "artifact matches document")
    }
}

fn to_snake_case(camel: &str) -> String {
    let mut out = String::new();
    for (i, c) in camel.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn condition_texts(def: &StrategyDefinition) -> Vec<String> {
    let mut texts = vec![def.entry.condition.to_lowercase()];
    texts.extend(def.entry.filters.iter().map(|f| f.to_lowercase()));
    for path in &def.exit.paths {
        if let Some(condition) = &path.condition {
            texts.push(condition.to_lowercase());
        }
    }
    if let StrategyLogic::Composed {
        entry_expr,
        exit_expr,
    } = &def.logic
    {
        texts.push(entry_expr.to_lowercase());
        texts.push(exit_expr.to_lowercase());
    }
    texts
}

/// Every referenced datum at time t must be observable strictly before t.
fn check_look_ahead(def: &StrategyDefinition) -> CheckResult {
    for text in condition_texts(def) {
        for keyword in LOOK_AHEAD_KEYWORDS {
            if text.contains(keyword) {
                return CheckResult::fail(
                    "look_ahead_bias",
                    format!("condition references '{keyword}'"),
                );
            }
        }
    }
    CheckResult::pass("look_ahead_bias", "no look-ahead reference detected")
}

/// Filtered universes must be point-in-time.
fn check_survivorship(def: &StrategyDefinition) -> CheckResult {
    if def.universe.base.is_some() && !def.universe.point_in_time {
        return CheckResult::fail(
            "survivorship",
            "filtered universe without point-in-time membership",
        );
    }
    for criterion in &def.universe.criteria {
        let lower = criterion.to_lowercase();
        for keyword in SURVIVORSHIP_KEYWORDS {
            if lower.contains(keyword) {
                return CheckResult::fail(
                    "survivorship",
                    format!("universe criterion references '{keyword}'"),
                );
            }
        }
    }
    CheckResult::pass("survivorship", "universe is survivorship-safe")
}

/// Sizing declared, leverage bounded, position count bounded.
fn check_position_sizing(def: &StrategyDefinition) -> CheckResult {
    let position = &def.position;
    if position.max_leverage <= 0.0 {
        return CheckResult::fail("position_sizing", "max_leverage must be positive");
    }

    let implied = match position.sizing {
        SizingMethod::EqualWeight | SizingMethod::RiskParity => 1.0,
        SizingMethod::FixedFractional => {
            let fraction = position
                .sizing_params
                .get("fraction")
                .copied()
                .unwrap_or(0.1);
            let Some(max_positions) = position.max_positions else {
                return CheckResult::fail(
                    "position_sizing",
                    "fixed_fractional sizing without max_positions is unbounded",
                );
            };
            fraction * max_positions as f64
        }
        SizingMethod::VolatilityTarget => position
            .sizing_params
            .get("max_gross")
            .copied()
            .unwrap_or(1.0),
    };

    if implied > position.max_leverage + 1e-9 {
        return CheckResult::fail(
            "position_sizing",
            format!(
                "implied gross exposure {implied:.2} exceeds declared max leverage {:.2}",
                position.max_leverage
            ),
        );
    }
    CheckResult::pass(
        "position_sizing",
        format!("{:?} within {:.2}x leverage", position.sizing, position.max_leverage),
    )
}

fn check_data_availability(
    def: &StrategyDefinition,
    registry: &DataRegistry,
    start: NaiveDate,
    end: NaiveDate,
) -> CheckResult {
    for requirement in &def.data_requirements {
        if let Err(reason) = registry.resolve(requirement, start, end) {
            return CheckResult::fail("data_availability", reason);
        }
    }
    CheckResult::pass(
        "data_availability",
        format!("{} requirement(s) resolved", def.data_requirements.len()),
    )
}

/// Declared parameters within plausible bounds.
fn check_parameter_sanity(def: &StrategyDefinition) -> CheckResult {
    for (name, &value) in &def.parameters {
        if !value.is_finite() {
            return CheckResult::fail("parameter_sanity", format!("{name} is not finite"));
        }
        let lower = name.to_lowercase();
        let is_window = ["lookback", "period", "days", "window"]
            .iter()
            .any(|k| lower.contains(k));
        if is_window && !(1.0..=5000.0).contains(&value) {
            return CheckResult::fail(
                "parameter_sanity",
                format!("{name}={value} outside plausible window bounds [1, 5000]"),
            );
        }
        if lower.contains("rsi") && !(0.0..=100.0).contains(&value) {
            return CheckResult::fail(
                "parameter_sanity",
                format!("{name}={value} outside RSI range [0, 100]"),
            );
        }
    }
    CheckResult::pass(
        "parameter_sanity",
        format!("{} parameter(s) in bounds", def.parameters.len()),
    )
}

/// No literal dates or suspiciously precise constants in conditions.
fn check_hardcoded_values(def: &StrategyDefinition) -> CheckResult {
    for text in condition_texts(def) {
        if let Some(found) = find_literal_date(&text) {
            return CheckResult::fail(
                "hardcoded_values",
                format!("condition embeds literal date '{found}'"),
            );
        }
        if let Some(token) = overly_precise_constant(&text) {
            return CheckResult::fail(
                "hardcoded_values",
                format!("condition embeds fitted-looking constant '{token}'"),
            );
        }
    }
    CheckResult::pass("hardcoded_values", "no hardcoded artifacts in conditions")
}

/// A numeric token with five or more decimal places reads as a fitted
/// constant, not a design choice.
fn overly_precise_constant(text: &str) -> Option<String> {
    for token in text.split(|c: char| !c.is_ascii_digit() && c != '.') {
        if let Some((_, decimals)) = token.split_once('.') {
            if decimals.len() >= 5 && decimals.chars().all(|c| c.is_ascii_digit()) {
                return Some(token.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use research_models::{
        Archetype, ContentHash, DataRequirement, DataTier, Entry, EntryKind, Exit, ExitKind,
        ExitPath, Hypothesis, Position, PositionManagement, StrategyId, StrategySource,
        StrategyState,
    };
    use std::collections::BTreeMap;

    fn doc() -> StrategyDocument {
        let definition = StrategyDefinition {
            tier: research_models::Tier::Templated,
            logic: StrategyLogic::Template {
                archetype: Archetype::TrendFollowing,
            },
            universe: research_models::Universe {
                symbols: vec!["SPY".into()],
                base: None,
                criteria: vec![],
                point_in_time: true,
            },
            entry: Entry {
                kind: EntryKind::Technical,
                condition: "close above 200-day sma".into(),
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
                    name: "cross_down".into(),
                    kind: ExitKind::SignalReversal,
                    params: BTreeMap::new(),
                    condition: Some("close below 200-day sma".into()),
                }],
            },
            position_management: PositionManagement::default(),
            regimes: None,
            data_requirements: vec![DataRequirement {
                id: "us-equity-daily".into(),
                tier: DataTier::Native,
                fields: vec!["close".into()],
            }],
            parameters: [("sma_period".to_string(), 200.0)].into_iter().collect(),
            assumptions: vec![],
            risks: vec![],
        };
        let definition_hash = definition.definition_hash();
        StrategyDocument {
            id: StrategyId::from_seq(1),
            name: "trend".into(),
            created: Utc::now(),
            state: StrategyState::Verifying,
            status_reason: None,
            source: StrategySource {
                reference: "test".into(),
                url: None,
                excerpt: "test".into(),
                content_hash: ContentHash("0".repeat(64)),
                extracted_at: Utc::now(),
                credibility: None,
            },
            lineage: None,
            hypothesis: Hypothesis {
                summary: "s".into(),
                detail: "d".into(),
            },
            edge: None,
            edge_provenance: None,
            quality: None,
            definition,
            definition_hash,
        }
    }

    fn all_checks() -> Vec<String> {
        [
            "look_ahead_bias",
            "survivorship",
            "position_sizing",
            "data_availability",
            "parameter_sanity",
            "hardcoded_values",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn window() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2005, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, 12, 31).unwrap(),
        )
    }

    #[test]
    fn test_clean_document_passes() {
        let registry = DataRegistry::builtin();
        let engine = VerificationEngine::new(&registry, &all_checks());
        let (start, end) = window();
        let report = engine.verify_document(&doc(), start, end);
        assert!(report.passed, "failures: {:?}", report.failures().collect::<Vec<_>>());
    }

    #[test]
    fn test_look_ahead_keyword_fails() {
        let registry = DataRegistry::builtin();
        let engine = VerificationEngine::new(&registry, &all_checks());
        let mut document = doc();
        document.definition.entry.condition = "buy if tomorrow's open gaps up".into();
        let (start, end) = window();
        let report = engine.verify_document(&document, start, end);
        assert!(!report.passed);
        assert!(report.failures().any(|c| c.name == "look_ahead_bias"));
    }

    #[test]
    fn test_filtered_universe_requires_point_in_time() {
        let registry = DataRegistry::builtin();
        let engine = VerificationEngine::new(&registry, &all_checks());
        let mut document = doc();
        document.definition.universe.base = Some("sp500".into());
        document.definition.universe.point_in_time = false;
        let (start, end) = window();
        let report = engine.verify_document(&document, start, end);
        assert!(report.failures().any(|c| c.name == "survivorship"));
    }

    #[test]
    fn test_unbounded_fixed_fractional_fails() {
        let registry = DataRegistry::builtin();
        let engine = VerificationEngine::new(&registry, &all_checks());
        let mut document = doc();
        document.definition.position.sizing = SizingMethod::FixedFractional;
        document.definition.position.max_positions = None;
        let (start, end) = window();
        let report = engine.verify_document(&document, start, end);
        assert!(report.failures().any(|c| c.name == "position_sizing"));
    }

    #[test]
    fn test_missing_dataset_blocks() {
        let registry = DataRegistry::builtin();
        let engine = VerificationEngine::new(&registry, &all_checks());
        let mut document = doc();
        document.definition.data_requirements.push(DataRequirement {
            id: "satellite-parking-lots".into(),
            tier: DataTier::Marketplace,
            fields: vec!["car_count".into()],
        });
        let (start, end) = window();
        let report = engine.verify_document(&document, start, end);
        assert!(report.failures().any(|c| c.name == "data_availability"));
    }

    #[test]
    fn test_parameter_bounds() {
        let registry = DataRegistry::builtin();
        let engine = VerificationEngine::new(&registry, &all_checks());
        let mut document = doc();
        document
            .definition
            .parameters
            .insert("lookback_days".into(), 0.0);
        let (start, end) = window();
        let report = engine.verify_document(&document, start, end);
        assert!(report.failures().any(|c| c.name == "parameter_sanity"));
    }

    #[test]
    fn test_hardcoded_date_fails() {
        let registry = DataRegistry::builtin();
        let engine = VerificationEngine::new(&registry, &all_checks());
        let mut document = doc();
        document.definition.entry.condition = "buy after 2009-03-09 only".into();
        let (start, end) = window();
        let report = engine.verify_document(&document, start, end);
        assert!(report.failures().any(|c| c.name == "hardcoded_values"));
    }

    #[test]
    fn test_fitted_constant_fails() {
        let registry = DataRegistry::builtin();
        let engine = VerificationEngine::new(&registry, &all_checks());
        let mut document = doc();
        document.definition.entry.condition = "buy when ratio exceeds 1.37542".into();
        let (start, end) = window();
        let report = engine.verify_document(&document, start, end);
        assert!(report.failures().any(|c| c.name == "hardcoded_values"));
    }

    #[test]
    fn test_disabled_check_is_skipped() {
        let registry = DataRegistry::builtin();
        let engine = VerificationEngine::new(&registry, &["survivorship".to_string()]);
        let mut document = doc();
        document.definition.entry.condition = "buy if tomorrow's open gaps up".into();
        let (start, end) = window();
        let report = engine.verify_document(&document, start, end);
        // look_ahead disabled: document passes despite the keyword.
        assert!(report.passed);
    }

    #[test]
    fn test_fingerprint_cross_check() {
        let registry = DataRegistry::builtin();
        let engine = VerificationEngine::new(&registry, &all_checks());
        let document = doc();
        let artifact = research_codegen::generate(&document.definition).unwrap();

        let ok = engine.check_fingerprint(&document, &artifact.fingerprint);
        assert_eq!(ok.status, crate::CheckStatus::Pass, "{}", ok.message);

        // Tampered artifact trading an undeclared symbol fails the gate.
        let tampered_code = artifact.code.replace("AddEquity(\"SPY\"", "AddEquity(\"TQQQ\"");
        let tampered = LogicFingerprint::extract(&tampered_code);
        let bad = engine.check_fingerprint(&document, &tampered);
        assert_eq!(bad.status, crate::CheckStatus::Fail);
    }
}
