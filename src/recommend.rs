use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::bowling::BowlingVocabulary;
use crate::delivery::{Phase, ProcessedDeliveries};
use crate::engineering::FeatureEngineer;
use crate::features::{BatterFeatures, DEFAULT_MIN_BALLS, extract_batter_features};
use crate::model::{LoadOutcome, MlScorer};

pub const DEFAULT_SIMILAR_BATTERS: usize = 5;

const SR_WEIGHT: f64 = 0.6;
const DR_WEIGHT: f64 = 0.4;
const STAT_CONFIDENCE_BALLS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Ml,
    Statistical,
    NoData,
}

impl Method {
    pub fn label(&self) -> &'static str {
        match self {
            Method::Ml => "ML",
            Method::Statistical => "Statistical",
            Method::NoData => "No Data",
        }
    }
}

/// Outcome of one query. `NoData` means zero matching deliveries;
/// `NoReliableData` means the batter has deliveries but no bowling type
/// clears the minimum-balls threshold. Callers render these differently.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Recommended { bowling_type: String, score: f64 },
    NoReliableData,
    NoData,
}

#[derive(Debug, Clone)]
pub struct Recommendation {
    pub method: Method,
    pub outcome: Outcome,
    pub predictions: BTreeMap<String, f64>,
    pub similar_batters: Vec<String>,
}

impl Recommendation {
    fn no_data() -> Self {
        Self {
            method: Method::NoData,
            outcome: Outcome::NoData,
            predictions: BTreeMap::new(),
            similar_batters: Vec::new(),
        }
    }

    fn no_reliable_data(method: Method) -> Self {
        Self {
            method,
            outcome: Outcome::NoReliableData,
            predictions: BTreeMap::new(),
            similar_batters: Vec::new(),
        }
    }
}

/// Orchestrates extraction, scoring and ranking. Scoring path follows the
/// scorer's state: trained snapshot when available, statistical formula
/// otherwise.
pub struct RecommendationEngine {
    processed: ProcessedDeliveries,
    vocab: BowlingVocabulary,
    engineer: FeatureEngineer,
    scorer: MlScorer,
    batters_data: BTreeMap<String, BatterFeatures>,
    min_balls: u32,
}

impl RecommendationEngine {
    pub fn new(
        processed: ProcessedDeliveries,
        vocab: BowlingVocabulary,
        models_dir: impl Into<PathBuf>,
    ) -> Self {
        let engineer = FeatureEngineer::new(vocab.clone());
        Self {
            processed,
            vocab,
            engineer,
            scorer: MlScorer::new(models_dir),
            batters_data: BTreeMap::new(),
            min_balls: DEFAULT_MIN_BALLS,
        }
    }

    pub fn with_min_balls(mut self, min_balls: u32) -> Self {
        self.min_balls = min_balls;
        self
    }

    pub fn scorer(&self) -> &MlScorer {
        &self.scorer
    }

    /// Feature vectors built by [`Self::build_batter_index`], keyed by batter.
    pub fn batter_index(&self) -> &BTreeMap<String, BatterFeatures> {
        &self.batters_data
    }

    /// Restore the persisted model snapshot, if any. Missing or corrupt
    /// snapshots leave the engine on the statistical path. On a successful
    /// load the batter index is built too, so similarity lookups work
    /// without a separate [`Self::build_batter_index`] call.
    pub fn load_models(&mut self) -> LoadOutcome {
        let outcome = self.scorer.load();
        if outcome == LoadOutcome::Loaded && self.batters_data.is_empty() {
            self.build_batter_index();
        }
        outcome
    }

    pub fn batter_features(&self, batter: &str, phase: Option<Phase>) -> Option<BatterFeatures> {
        extract_batter_features(&self.processed.valid, &self.vocab, batter, phase, self.min_balls)
    }

    /// Sorted batter names with their legal delivery counts.
    pub fn batters(&self) -> Vec<(String, usize)> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for d in &self.processed.valid {
            *counts.entry(d.batter.as_str()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect()
    }

    /// Extract phase-unscoped feature vectors for every batter in the valid
    /// table. Also the similarity lookup index for the ML path.
    pub fn build_batter_index(&mut self) {
        let names: BTreeSet<&str> = self
            .processed
            .valid
            .iter()
            .map(|d| d.batter.as_str())
            .collect();
        let pairs: Vec<(String, BatterFeatures)> = names
            .into_iter()
            .collect::<Vec<_>>()
            .par_iter()
            .filter_map(|name| {
                extract_batter_features(
                    &self.processed.valid,
                    &self.vocab,
                    name,
                    None,
                    self.min_balls,
                )
                .map(|features| (name.to_string(), features))
            })
            .collect();
        self.batters_data = pairs.into_iter().collect();
    }

    /// Drive a full training pass. Returns `false` (never panics or errors
    /// out) when there is not enough data to fit the models; any previously
    /// trained state is left untouched in that case.
    pub fn prepare_training(&mut self) -> bool {
        self.build_batter_index();
        let Some(matrix) = self.engineer.build_matrix(&self.batters_data) else {
            info!("not enough batter data to train: no batter clears the sample gate");
            return false;
        };
        let labels = self.engineer.weakness_labels(&self.batters_data);
        match self.scorer.train(&matrix, &labels, &self.vocab) {
            Ok(_) => true,
            Err(err) => {
                warn!("training failed: {err:#}");
                false
            }
        }
    }

    pub fn recommend(&self, batter: &str, phase: Option<Phase>) -> Recommendation {
        let Some(features) = self.batter_features(batter, phase) else {
            return Recommendation::no_data();
        };
        if self.scorer.is_trained() {
            self.ml_recommendation(&features)
        } else {
            self.statistical_recommendation(&features)
        }
    }

    fn ml_recommendation(&self, features: &BatterFeatures) -> Recommendation {
        let Some(predictions) = self.scorer.predict(features) else {
            // Trained state was checked by the caller.
            return self.statistical_recommendation(features);
        };
        // Predictions for types the batter never meaningfully faced are not
        // actionable; drop them before ranking.
        let candidates: BTreeMap<String, f64> = predictions
            .into_iter()
            .filter(|(bowling_type, _)| {
                features.type_stats(bowling_type).balls_faced >= self.min_balls
            })
            .collect();
        let Some((bowling_type, score)) = self.pick_best(&candidates) else {
            return Recommendation::no_reliable_data(Method::Ml);
        };
        let similar =
            self.scorer
                .find_similar(features, &self.batters_data, DEFAULT_SIMILAR_BATTERS);
        Recommendation {
            method: Method::Ml,
            outcome: Outcome::Recommended {
                bowling_type,
                score,
            },
            predictions: candidates,
            similar_batters: similar,
        }
    }

    fn statistical_recommendation(&self, features: &BatterFeatures) -> Recommendation {
        let mut scores = BTreeMap::new();
        for bowling_type in self.vocab.types() {
            let stats = features.type_stats(bowling_type);
            if stats.balls_faced < self.min_balls {
                continue;
            }
            let confidence = (stats.balls_faced as f64 / STAT_CONFIDENCE_BALLS).min(1.0);
            let score =
                ((100.0 - stats.strike_rate) * SR_WEIGHT + stats.dismissal_rate * DR_WEIGHT)
                    * confidence;
            scores.insert(bowling_type.clone(), score);
        }
        let Some((bowling_type, score)) = self.pick_best(&scores) else {
            return Recommendation::no_reliable_data(Method::Statistical);
        };
        Recommendation {
            method: Method::Statistical,
            outcome: Outcome::Recommended {
                bowling_type,
                score,
            },
            predictions: scores,
            similar_batters: Vec::new(),
        }
    }

    /// Maximum score over the candidate set, even when negative. Iteration
    /// follows vocabulary order and ties keep the first candidate, so the
    /// pick is deterministic.
    fn pick_best(&self, scores: &BTreeMap<String, f64>) -> Option<(String, f64)> {
        let mut best: Option<(String, f64)> = None;
        for bowling_type in self.vocab.types() {
            let Some(&score) = scores.get(bowling_type) else {
                continue;
            };
            if best.as_ref().is_none_or(|(_, b)| score > *b) {
                best = Some((bowling_type.clone(), score));
            }
        }
        best
    }
}
