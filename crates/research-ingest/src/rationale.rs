//! Rationale inference against a fixed catalog of documented factors.
//!
//! When the source states no edge, the definition and hypothesis are matched
//! against known factors and structural edges. The result feeds trust
//! calibration and the crowded-factor flag; it never gates progression.

use research_models::{EdgeProvenance, ProvenanceConfidence, ProvenanceSource};

use crate::draft::StrategyDraft;

/// One catalog entry: a documented factor and the vocabulary that marks it.
pub struct FactorCatalogEntry {
    pub factor: &'static str,
    pub crowded: bool,
    pub keywords: &'static [&'static str],
}

/// A catalog hit for a draft.
#[derive(Debug, Clone)]
pub struct FactorMatch {
    pub factor: &'static str,
    pub crowded: bool,
    /// Number of distinct keyword hits behind the match.
    pub hits: usize,
}

/// Documented factors and structural edges.
pub const FACTOR_CATALOG: &[FactorCatalogEntry] = &[
    FactorCatalogEntry {
        factor: "momentum",
        crowded: true,
        keywords: &["momentum", "12-1", "relative strength", "winners", "trailing return"],
    },
    FactorCatalogEntry {
        factor: "trend",
        crowded: true,
        keywords: &["trend", "moving average", "sma cross", "golden cross", "200-day"],
    },
    FactorCatalogEntry {
        factor: "value",
        crowded: true,
        keywords: &["value", "book-to-market", "price-to-earnings", "cheap stocks"],
    },
    FactorCatalogEntry {
        factor: "quality",
        crowded: false,
        keywords: &["quality", "profitability", "gross margin", "earnings stability"],
    },
    FactorCatalogEntry {
        factor: "low_volatility",
        crowded: true,
        keywords: &["low volatility", "low vol", "minimum variance", "beta anomaly"],
    },
    FactorCatalogEntry {
        factor: "size",
        crowded: true,
        keywords: &["small cap", "size premium", "small minus big"],
    },
    FactorCatalogEntry {
        factor: "carry",
        crowded: false,
        keywords: &["carry", "interest rate differential", "roll yield", "contango"],
    },
    FactorCatalogEntry {
        factor: "mean_reversion",
        crowded: false,
        keywords: &["mean reversion", "reversion", "oversold", "zscore", "rsi below"],
    },
    FactorCatalogEntry {
        factor: "post_earnings_drift",
        crowded: false,
        keywords: &["post-earnings", "earnings drift", "earnings surprise", "pead"],
    },
    FactorCatalogEntry {
        factor: "index_rebalancing",
        crowded: false,
        keywords: &["index rebalance", "index addition", "index deletion", "reconstitution"],
    },
    FactorCatalogEntry {
        factor: "calendar_effect",
        crowded: false,
        keywords: &["turn of month", "seasonality", "january effect", "day of week"],
    },
    FactorCatalogEntry {
        factor: "volatility_risk_premium",
        crowded: false,
        keywords: &["variance risk premium", "volatility risk premium", "short vix", "implied vs realized"],
    },
    FactorCatalogEntry {
        factor: "dividend_capture",
        crowded: false,
        keywords: &["dividend capture", "ex-dividend", "dividend run-up"],
    },
];

/// Match a draft against the factor catalog.
pub fn match_factor(draft: &StrategyDraft) -> Option<FactorMatch> {
    let mut text = draft.searchable_text();
    if let Some(def) = &draft.definition {
        text.push_str(&def.entry.condition.to_lowercase());
        text.push('\n');
        for indicator in &def.entry.indicators {
            text.push_str(&indicator.name.to_lowercase());
            text.push('\n');
        }
    }

    let mut best: Option<FactorMatch> = None;
    for entry in FACTOR_CATALOG {
        let hits = entry
            .keywords
            .iter()
            .filter(|keyword| text.contains(&keyword.to_lowercase()))
            .count();
        if hits == 0 {
            continue;
        }
        let candidate = FactorMatch {
            factor: entry.factor,
            crowded: entry.crowded,
            hits,
        };
        if best.as_ref().map(|b| hits > b.hits).unwrap_or(true) {
            best = Some(candidate);
        }
    }
    best
}

/// Infer edge provenance for a draft.
///
/// Stated rationale wins; a catalog hit on top of a stated rationale is
/// `source_enhanced`. A hit without any stated rationale is `inferred` with
/// confidence scaled by keyword support. No hit and no statement is
/// `unknown`.
pub fn infer_rationale(draft: &StrategyDraft) -> (EdgeProvenance, Option<FactorMatch>) {
    let factor = match_factor(draft);

    let provenance = match (draft.rationale.is_some(), &factor) {
        (true, Some(hit)) => EdgeProvenance {
            source: ProvenanceSource::SourceEnhanced,
            confidence: if hit.hits >= 2 {
                ProvenanceConfidence::High
            } else {
                ProvenanceConfidence::Medium
            },
            factor_alignment: Some(hit.factor.to_string()),
            research_notes: Some(format!(
                "stated rationale aligned with {} ({} keyword hits)",
                hit.factor, hit.hits
            )),
        },
        (true, None) => EdgeProvenance {
            source: ProvenanceSource::SourceStated,
            confidence: ProvenanceConfidence::High,
            factor_alignment: None,
            research_notes: None,
        },
        (false, Some(hit)) => EdgeProvenance {
            source: ProvenanceSource::Inferred,
            confidence: if hit.hits >= 3 {
                ProvenanceConfidence::Medium
            } else {
                ProvenanceConfidence::Low
            },
            factor_alignment: Some(hit.factor.to_string()),
            research_notes: Some(format!(
                "no stated rationale; matched {} via {} keyword hits",
                hit.factor, hit.hits
            )),
        },
        (false, None) => EdgeProvenance {
            source: ProvenanceSource::Unknown,
            confidence: ProvenanceConfidence::Low,
            factor_alignment: None,
            research_notes: Some("no stated rationale and no catalog match".into()),
        },
    };

    (provenance, factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use research_models::Hypothesis;

    fn draft(excerpt: &str, rationale: Option<&str>) -> StrategyDraft {
        StrategyDraft {
            name: "t".into(),
            reference: "r".into(),
            url: None,
            excerpt: excerpt.into(),
            credibility: None,
            hypothesis: Hypothesis {
                summary: String::new(),
                detail: String::new(),
            },
            rationale: rationale.map(str::to_string),
            definition: None,
            evidence: Default::default(),
            raw_text: String::new(),
        }
    }

    #[test]
    fn test_golden_cross_infers_trend_low_confidence() {
        let d = draft("Buy when the 50-day crosses above the 200-day (golden cross).", None);
        let (provenance, factor) = infer_rationale(&d);
        assert_eq!(provenance.source, ProvenanceSource::Inferred);
        assert_eq!(provenance.confidence, ProvenanceConfidence::Low);
        assert_eq!(factor.unwrap().factor, "trend");
    }

    #[test]
    fn test_stated_rationale_without_match_is_stated() {
        let d = draft(
            "A bespoke microstructure effect in municipal bonds.",
            Some("Dealers cannot warehouse inventory across month-end."),
        );
        let (provenance, factor) = infer_rationale(&d);
        assert_eq!(provenance.source, ProvenanceSource::SourceStated);
        assert!(factor.is_none());
    }

    #[test]
    fn test_stated_plus_catalog_is_enhanced() {
        let d = draft(
            "Buy trailing return winners; 12-1 momentum with monthly rebalance.",
            Some("Underreaction to news creates momentum."),
        );
        let (provenance, _) = infer_rationale(&d);
        assert_eq!(provenance.source, ProvenanceSource::SourceEnhanced);
        assert_eq!(provenance.factor_alignment.as_deref(), Some("momentum"));
    }

    #[test]
    fn test_no_rationale_no_match_is_unknown() {
        let d = draft("Buy stocks whose tickers contain the letter Q.", None);
        let (provenance, factor) = infer_rationale(&d);
        assert_eq!(provenance.source, ProvenanceSource::Unknown);
        assert!(factor.is_none());
    }
}
