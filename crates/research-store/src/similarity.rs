//! Duplicate and variant detection over the strategy catalog.
//!
//! A definition is reduced to four structural token sets (universe, entry,
//! exit, sizing). Similarity is weighted Jaccard over those sets, which is
//! symmetric, satisfies identity of indiscernibles on the fingerprint, obeys
//! the triangle inequality within epsilon, and is invariant under reordering
//! of unordered sets (fingerprints are sets).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use research_models::{StrategyDefinition, StrategyId};

use crate::config::SimilarityConfig;

/// Classification of a candidate against the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Similarity at or above the duplicate threshold; blocks ingestion.
    Duplicate,
    /// Similarity at or above the variant threshold; attaches lineage.
    Variant,
    New,
}

/// Result of a catalog lookup.
#[derive(Debug, Clone)]
pub struct SimilarityMatch {
    pub kind: MatchKind,
    pub matched: Option<StrategyId>,
    pub score: f64,
}

/// Structural fingerprint of a definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    universe: BTreeSet<String>,
    entry: BTreeSet<String>,
    exit: BTreeSet<String>,
    sizing: BTreeSet<String>,
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_' && c != '.')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

impl Fingerprint {
    pub fn of(def: &StrategyDefinition) -> Self {
        let def = def.normalized();

        let mut universe: BTreeSet<String> =
            def.universe.symbols.iter().map(|s| s.to_lowercase()).collect();
        if let Some(base) = &def.universe.base {
            universe.insert(base.to_lowercase());
        }
        for criterion in &def.universe.criteria {
            universe.extend(tokenize(criterion));
        }

        let mut entry: BTreeSet<String> = tokenize(&def.entry.condition).collect();
        for indicator in &def.entry.indicators {
            entry.insert(indicator.name.to_lowercase());
            for (param, value) in &indicator.params {
                entry.insert(format!("{param}={value}"));
            }
        }
        for filter in &def.entry.filters {
            entry.extend(tokenize(filter));
        }

        let mut exit = BTreeSet::new();
        for path in &def.exit.paths {
            exit.insert(format!("{:?}", path.kind).to_lowercase());
            for (param, value) in &path.params {
                exit.insert(format!("{param}={value}"));
            }
            if let Some(condition) = &path.condition {
                exit.extend(tokenize(condition));
            }
        }

        let mut sizing = BTreeSet::new();
        sizing.insert(format!("{:?}", def.position.sizing).to_lowercase());
        sizing.insert(format!("leverage={}", def.position.max_leverage));
        for (param, value) in &def.position.sizing_params {
            sizing.insert(format!("{param}={value}"));
        }

        Self {
            universe,
            entry,
            exit,
            sizing,
        }
    }
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// Weighted structural similarity in [0, 1].
pub fn similarity(a: &Fingerprint, b: &Fingerprint, config: &SimilarityConfig) -> f64 {
    config.universe_weight * jaccard(&a.universe, &b.universe)
        + config.entry_weight * jaccard(&a.entry, &b.entry)
        + config.exit_weight * jaccard(&a.exit, &b.exit)
        + config.sizing_weight * jaccard(&a.sizing, &b.sizing)
}

/// In-memory catalog index. Append-only within a transaction; readers see
/// the last committed snapshot (the index is rebuilt from the store on open).
pub struct SimilarityIndex {
    config: SimilarityConfig,
    entries: Vec<(StrategyId, Fingerprint)>,
}

impl SimilarityIndex {
    pub fn new(config: SimilarityConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
        }
    }

    /// Build the index over existing catalog entries.
    pub fn build<'a>(
        config: SimilarityConfig,
        catalog: impl Iterator<Item = (&'a StrategyId, &'a StrategyDefinition)>,
    ) -> Self {
        let mut index = Self::new(config);
        for (id, def) in catalog {
            index.insert(id.clone(), def);
        }
        index
    }

    pub fn insert(&mut self, id: StrategyId, def: &StrategyDefinition) {
        self.entries.push((id, Fingerprint::of(def)));
    }

    /// Best match for a candidate definition.
    pub fn lookup(&self, candidate: &StrategyDefinition) -> SimilarityMatch {
        let fingerprint = Fingerprint::of(candidate);
        let mut best: Option<(&StrategyId, f64)> = None;
        for (id, existing) in &self.entries {
            let score = similarity(&fingerprint, existing, &self.config);
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((id, score));
            }
        }
        match best {
            Some((id, score)) if score >= self.config.duplicate_threshold => SimilarityMatch {
                kind: MatchKind::Duplicate,
                matched: Some(id.clone()),
                score,
            },
            Some((id, score)) if score >= self.config.variant_threshold => SimilarityMatch {
                kind: MatchKind::Variant,
                matched: Some(id.clone()),
                score,
            },
            Some((_, score)) => SimilarityMatch {
                kind: MatchKind::New,
                matched: None,
                score,
            },
            None => SimilarityMatch {
                kind: MatchKind::New,
                matched: None,
                score: 0.0,
            },
        }
    }
}
