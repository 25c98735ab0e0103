//! # Research Codegen
//!
//! Pure-function backtest generation: `(definition, GENERATOR_VERSION)` in,
//! byte-identical artifact out.
//!
//! ## Tiers
//! - **Tier 1**: known archetypes expanded from deterministic templates
//! - **Tier 2**: entry/exit expressed in the indicator DSL, compiled
//! - **Tier 3**: free-form code, stamped `needs_review`; the pipeline blocks
//!   execution until a human approves
//!
//! ## Contract
//! - Generated tier-1/2 code contains no literal calendar date; the window
//!   range is supplied by the walk-forward executor at dispatch time.
//! - `code_hash` is SHA-256 of the emitted bytes.
//! - A logic fingerprint (indicators, conditions, universe refs) is
//!   extracted back out of the emitted code for the pre-execution
//!   cross-check.

pub mod dsl;
pub mod fingerprint;
pub mod templates;

use research_models::{sha256_hex, ContentHash, StrategyDefinition, StrategyLogic, Tier};

pub use dsl::{compile_expr, parse_expr, DslError, Expr};
pub use fingerprint::LogicFingerprint;

/// Generator version; part of every validation key. Bump on any change to
/// emitted bytes.
pub const GENERATOR_VERSION: &str = "gen-4.2.0";

/// Generation failures.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("definition tier {declared:?} does not match logic tier {actual:?}")]
    TierMismatch { declared: Tier, actual: Tier },

    #[error("dsl error in {which} expression: {source}")]
    Dsl {
        which: &'static str,
        #[source]
        source: DslError,
    },

    #[error("generated code contains a literal date: {0}")]
    EmittedDate(String),

    #[error("unsupported definition: {0}")]
    Unsupported(String),
}

/// A generated backtest artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub code: String,
    pub code_hash: ContentHash,
    pub fingerprint: LogicFingerprint,
    pub tier: Tier,
    /// Tier-3 artifacts require a human-review transition before execution.
    pub needs_review: bool,
    pub generator_version: String,
}

/// Generate the backtest artifact for a definition.
///
/// Deterministic: the class name derives from the definition hash, so the
/// same `(definition_hash, generator_version)` always yields the same bytes.
pub fn generate(definition: &StrategyDefinition) -> Result<Artifact, GenerateError> {
    if !definition.tier_consistent() {
        return Err(GenerateError::TierMismatch {
            declared: definition.tier,
            actual: definition.logic.tier(),
        });
    }

    // Normalize first so reordered-but-identical definitions emit identical
    // bytes, matching their identical definition hash.
    let definition = &definition.normalized();

    let class_name = format!(
        "Strategy{}",
        &definition.definition_hash().as_str()[..12]
    );

    let (code, needs_review) = match &definition.logic {
        StrategyLogic::Template { archetype } => (
            templates::expand(*archetype, &class_name, definition)?,
            false,
        ),
        StrategyLogic::Composed {
            entry_expr,
            exit_expr,
        } => {
            let entry = parse_expr(entry_expr).map_err(|source| GenerateError::Dsl {
                which: "entry",
                source,
            })?;
            let exit = parse_expr(exit_expr).map_err(|source| GenerateError::Dsl {
                which: "exit",
                source,
            })?;
            (
                templates::expand_composed(&class_name, definition, &entry, &exit),
                false,
            )
        }
        StrategyLogic::Custom { code } => (templates::wrap_custom(&class_name, code), true),
    };

    // Tier-3 output skips the date check; the review gate owns that risk.
    if definition.tier != Tier::Custom {
        if let Some(found) = find_literal_date(&code) {
            return Err(GenerateError::EmittedDate(found));
        }
    }

    let fingerprint = LogicFingerprint::extract(&code);
    let code_hash = sha256_hex(code.as_bytes());

    Ok(Artifact {
        code,
        code_hash,
        fingerprint,
        tier: definition.tier,
        needs_review,
        generator_version: GENERATOR_VERSION.to_string(),
    })
}

/// Scan for literal calendar dates: `SetStartDate`/`SetEndDate` calls,
/// `datetime(YYYY, ...)` constructors, and bare ISO `YYYY-MM-DD` text.
pub fn find_literal_date(code: &str) -> Option<String> {
    for marker in ["SetStartDate", "SetEndDate", "set_start_date", "set_end_date"] {
        if code.contains(marker) {
            return Some(marker.to_string());
        }
    }

    let bytes = code.as_bytes();
    for i in 0..bytes.len() {
        if let Some(date) = iso_date_at(bytes, i).or_else(|| datetime_ctor_at(code, i)) {
            return Some(date);
        }
    }
    None
}

/// `YYYY-MM-DD` with a plausible year, not embedded in a longer number run.
fn iso_date_at(bytes: &[u8], i: usize) -> Option<String> {
    if i + 10 > bytes.len() {
        return None;
    }
    if i > 0 && bytes[i - 1].is_ascii_digit() {
        return None;
    }
    let slice = &bytes[i..i + 10];
    let pattern_ok = slice[0].is_ascii_digit()
        && slice[1].is_ascii_digit()
        && slice[2].is_ascii_digit()
        && slice[3].is_ascii_digit()
        && slice[4] == b'-'
        && slice[5].is_ascii_digit()
        && slice[6].is_ascii_digit()
        && slice[7] == b'-'
        && slice[8].is_ascii_digit()
        && slice[9].is_ascii_digit();
    if !pattern_ok {
        return None;
    }
    let year: u32 = std::str::from_utf8(&slice[..4]).ok()?.parse().ok()?;
    if (1900..=2100).contains(&year) {
        String::from_utf8(slice.to_vec()).ok()
    } else {
        None
    }
}

/// `datetime(YYYY` constructor with a plausible year.
fn datetime_ctor_at(code: &str, i: usize) -> Option<String> {
    let rest = code.get(i..)?;
    let rest = rest.strip_prefix("datetime(")?;
    let year: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let year_num: u32 = year.parse().ok()?;
    if (1900..=2100).contains(&year_num) {
        Some(format!("datetime({year}"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use research_models::{
        Archetype, Entry, EntryKind, Exit, ExitKind, ExitPath, Position, PositionManagement,
        SizingMethod, Universe,
    };
    use std::collections::BTreeMap;

    fn base_definition(logic: StrategyLogic, tier: Tier) -> StrategyDefinition {
        StrategyDefinition {
            tier,
            logic,
            universe: Universe {
                symbols: vec!["SPY".into(), "QQQ".into()],
                base: None,
                criteria: vec![],
                point_in_time: true,
            },
            entry: Entry {
                kind: EntryKind::Technical,
                condition: "sma cross".into(),
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
                    name: "reversal".into(),
                    kind: ExitKind::SignalReversal,
                    params: BTreeMap::new(),
                    condition: None,
                }],
            },
            position_management: PositionManagement::default(),
            regimes: None,
            data_requirements: vec![],
            parameters: [
                ("lookback_days".to_string(), 200.0),
                ("hold_top_n".to_string(), 1.0),
            ]
            .into_iter()
            .collect(),
            assumptions: vec![],
            risks: vec![],
        }
    }

    #[test]
    fn test_generation_is_byte_deterministic() {
        let def = base_definition(
            StrategyLogic::Template {
                archetype: Archetype::MomentumRotation,
            },
            Tier::Templated,
        );
        let a = generate(&def).unwrap();
        let b = generate(&def).unwrap();
        assert_eq!(a.code, b.code);
        assert_eq!(a.code_hash, b.code_hash);
    }

    #[test]
    fn test_tier1_contains_no_literal_date() {
        for archetype in [
            Archetype::MomentumRotation,
            Archetype::MeanReversion,
            Archetype::TrendFollowing,
            Archetype::DualMomentum,
            Archetype::Breakout,
            Archetype::DividendCapture,
        ] {
            let def = base_definition(StrategyLogic::Template { archetype }, Tier::Templated);
            let artifact = generate(&def).unwrap();
            assert!(
                find_literal_date(&artifact.code).is_none(),
                "{archetype:?} emitted a date"
            );
        }
    }

    #[test]
    fn test_tier2_compiles_and_is_dateless() {
        let def = base_definition(
            StrategyLogic::Composed {
                entry_expr: "cross_above(sma(close, 50), sma(close, 200))".into(),
                exit_expr: "cross_below(sma(close, 50), sma(close, 200))".into(),
            },
            Tier::Composed,
        );
        let artifact = generate(&def).unwrap();
        assert!(find_literal_date(&artifact.code).is_none());
        assert!(artifact.fingerprint.indicators.contains("sma"));
    }

    #[test]
    fn test_tier3_needs_review() {
        let def = base_definition(
            StrategyLogic::Custom {
                code: "def OnData(self, data):\n    pass\n".into(),
            },
            Tier::Custom,
        );
        let artifact = generate(&def).unwrap();
        assert!(artifact.needs_review);
    }

    #[test]
    fn test_tier_mismatch_rejected() {
        let def = base_definition(
            StrategyLogic::Template {
                archetype: Archetype::Breakout,
            },
            Tier::Custom,
        );
        assert!(matches!(
            generate(&def),
            Err(GenerateError::TierMismatch { .. })
        ));
    }

    #[test]
    fn test_date_scanner_catches_variants() {
        assert!(find_literal_date("self.SetStartDate(2015, 1, 1)").is_some());
        assert!(find_literal_date("start = \"2015-01-01\"").is_some());
        assert!(find_literal_date("d = datetime(2020, 3, 23)").is_some());
        assert!(find_literal_date("window = 252  # trading days").is_none());
        assert!(find_literal_date("port = 8080-1000-11").is_none());
    }

    #[test]
    fn test_identical_definitions_share_bytes_regardless_of_metadata() {
        // Class name derives from the definition hash, so two records with
        // the same definition generate identical artifacts.
        let def1 = base_definition(
            StrategyLogic::Template {
                archetype: Archetype::TrendFollowing,
            },
            Tier::Templated,
        );
        let def2 = def1.clone();
        assert_eq!(generate(&def1).unwrap().code_hash, generate(&def2).unwrap().code_hash);
    }
}
