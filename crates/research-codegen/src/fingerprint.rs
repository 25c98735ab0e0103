//! Logic fingerprint: what the generated code actually trades on.
//!
//! Extracted from the emitted code (not from the definition), so the
//! pre-execution cross-check catches artifacts that drifted from their
//! document: a stale regeneration, a tampered bundle, or a generator bug.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Indicator constructors recognized in emitted code.
const INDICATOR_MARKERS: &[(&str, &str)] = &[
    ("self.SMA(", "sma"),
    ("self.EMA(", "ema"),
    ("self.ROC(", "roc"),
    ("self.MOMP(", "momentum"),
    ("self.RSI(", "rsi"),
    ("self.STD(", "std"),
    ("self.MAX(", "max"),
    ("self.MIN(", "min"),
];

/// Fingerprint of a generated artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicFingerprint {
    /// Indicator families constructed by the code.
    pub indicators: BTreeSet<String>,
    /// Archetype marker plus entry/exit condition lines.
    pub conditions: BTreeSet<String>,
    /// Symbols the code subscribes to.
    pub universe: BTreeSet<String>,
}

impl LogicFingerprint {
    /// Extract a fingerprint from emitted code.
    pub fn extract(code: &str) -> Self {
        let mut fingerprint = LogicFingerprint::default();

        for (marker, name) in INDICATOR_MARKERS {
            if code.contains(marker) {
                fingerprint.indicators.insert(name.to_string());
            }
        }

        for line in code.lines() {
            let trimmed = line.trim();
            for prefix in ["# archetype:", "# entry:", "# exit:"] {
                if let Some(rest) = trimmed.strip_prefix(prefix) {
                    let value = rest.trim();
                    if !value.is_empty() {
                        fingerprint
                            .conditions
                            .insert(format!("{}{}", prefix.trim_start_matches("# "), value));
                    }
                }
            }
        }

        let mut rest = code;
        while let Some(pos) = rest.find("self.AddEquity(\"") {
            rest = &rest[pos + "self.AddEquity(\"".len()..];
            if let Some(end) = rest.find('"') {
                fingerprint.universe.insert(rest[..end].to_string());
                rest = &rest[end..];
            } else {
                break;
            }
        }

        fingerprint
    }

    /// The archetype marker, if present.
    pub fn archetype(&self) -> Option<&str> {
        self.conditions
            .iter()
            .find_map(|c| c.strip_prefix("archetype:").map(str::trim))
    }

    /// Entry condition lines.
    pub fn entry_conditions(&self) -> impl Iterator<Item = &str> {
        self.conditions
            .iter()
            .filter_map(|c| c.strip_prefix("entry:").map(str::trim))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"from AlgorithmImports import *


# archetype: trend_following
# entry: close above 200-day sma
# exit: stop below sma
class StrategyX(QCAlgorithm):
    def Initialize(self):
        self.symbols.append(self.AddEquity("SPY", Resolution.Daily).Symbol)
        self.symbols.append(self.AddEquity("QQQ", Resolution.Daily).Symbol)
        self.trend = {s: self.SMA(s, 200, Resolution.Daily) for s in self.symbols}
"#;

    #[test]
    fn test_extracts_indicators_conditions_universe() {
        let fp = LogicFingerprint::extract(SAMPLE);
        assert!(fp.indicators.contains("sma"));
        assert_eq!(fp.archetype(), Some("trend_following"));
        assert!(fp.universe.contains("SPY"));
        assert!(fp.universe.contains("QQQ"));
        assert_eq!(fp.entry_conditions().count(), 1);
    }

    #[test]
    fn test_tampered_code_changes_fingerprint() {
        let fp1 = LogicFingerprint::extract(SAMPLE);
        let tampered = SAMPLE.replace("AddEquity(\"QQQ\"", "AddEquity(\"TQQQ\"");
        let fp2 = LogicFingerprint::extract(&tampered);
        assert_ne!(fp1, fp2);
    }

    #[test]
    fn test_empty_code_is_empty_fingerprint() {
        let fp = LogicFingerprint::extract("");
        assert!(fp.indicators.is_empty());
        assert!(fp.universe.is_empty());
    }
}
