use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bowling::BowlingVocabulary;
use crate::features::BatterFeatures;

/// Minimum total legal balls before a batter's vector is trusted for
/// training.
pub const MIN_TOTAL_BALLS: u32 = 20;

const LABEL_EPSILON: f64 = 1e-6;
const STD_FLOOR: f64 = 1e-6;

const SUMMARY_COLUMNS: [&str; 5] = [
    "total_balls",
    "total_runs",
    "strike_rate",
    "dismissals",
    "boundary_percentage",
];

/// Per-column mean/std fitted on the training matrix. The same transform is
/// applied verbatim at inference, never refit, so it travels with the model
/// artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl Scaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; cols];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }
        let mut stds = vec![0.0; cols];
        for row in rows {
            for ((s, v), m) in stds.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2);
            }
        }
        for s in &mut stds {
            *s = (*s / n).sqrt().max(STD_FLOOR);
        }
        Self { means, stds }
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .enumerate()
            .map(|(idx, v)| {
                let mean = self.means.get(idx).copied().unwrap_or(0.0);
                let std = self.stds.get(idx).copied().unwrap_or(1.0).max(STD_FLOOR);
                (v - mean) / std
            })
            .collect()
    }
}

/// Standardized numeric matrix over the training batters, with the fitted
/// scaler and the exact column order inference must align to.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub batters: Vec<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub scaler: Scaler,
}

/// Ordered numeric column names for a vocabulary: the five summary stats,
/// then `(sr, dismissal_rate, balls_faced)` per type in vocabulary order.
pub fn feature_columns(vocab: &BowlingVocabulary) -> Vec<String> {
    let mut columns: Vec<String> = SUMMARY_COLUMNS.iter().map(|c| c.to_string()).collect();
    for bowling_type in vocab.types() {
        columns.push(format!("{bowling_type}_sr"));
        columns.push(format!("{bowling_type}_dismissal_rate"));
        columns.push(format!("{bowling_type}_balls_faced"));
    }
    columns
}

/// Value of a named column in a feature vector. Unknown names read as zero,
/// which is the missing-column fill rule at inference time.
pub fn value_for_column(features: &BatterFeatures, column: &str) -> f64 {
    match column {
        "total_balls" => return features.total_balls as f64,
        "total_runs" => return features.total_runs as f64,
        "strike_rate" => return features.strike_rate,
        "dismissals" => return features.dismissals as f64,
        "boundary_percentage" => return features.boundary_percentage,
        _ => {}
    }
    if let Some(bowling_type) = column.strip_suffix("_sr") {
        return features.type_stats(bowling_type).strike_rate;
    }
    if let Some(bowling_type) = column.strip_suffix("_dismissal_rate") {
        return features.type_stats(bowling_type).dismissal_rate;
    }
    if let Some(bowling_type) = column.strip_suffix("_balls_faced") {
        return features.type_stats(bowling_type).balls_faced as f64;
    }
    0.0
}

/// Harmonic-mean blend of strike-rate and dismissal-rate weakness, scaled by
/// a small-sample confidence factor. Both signals have to agree before a
/// batter counts as weak against a type.
pub fn weakness_label(strike_rate: f64, dismissal_rate: f64, balls_faced: u32) -> f64 {
    let confidence = (balls_faced as f64 / 15.0).min(1.0);
    let sr_norm = 1.0 - strike_rate / 200.0;
    let dr_norm = dismissal_rate / 100.0;
    (2.0 * sr_norm * dr_norm / (sr_norm + dr_norm + LABEL_EPSILON)) * confidence * 100.0
}

#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    vocab: BowlingVocabulary,
    min_total_balls: u32,
}

impl FeatureEngineer {
    pub fn new(vocab: BowlingVocabulary) -> Self {
        Self {
            vocab,
            min_total_balls: MIN_TOTAL_BALLS,
        }
    }

    pub fn with_min_total_balls(mut self, min_total_balls: u32) -> Self {
        self.min_total_balls = min_total_balls;
        self
    }

    pub fn vocabulary(&self) -> &BowlingVocabulary {
        &self.vocab
    }

    /// Build the standardized training matrix. `None` when no batter clears
    /// the minimum-sample gate.
    pub fn build_matrix(
        &self,
        batters: &BTreeMap<String, BatterFeatures>,
    ) -> Option<FeatureMatrix> {
        let columns = feature_columns(&self.vocab);
        let mut names = Vec::new();
        let mut raw_rows = Vec::new();
        for (name, features) in batters {
            if features.total_balls < self.min_total_balls {
                continue;
            }
            names.push(name.clone());
            raw_rows.push(
                columns
                    .iter()
                    .map(|c| value_for_column(features, c))
                    .collect::<Vec<f64>>(),
            );
        }
        if raw_rows.is_empty() {
            return None;
        }

        let scaler = Scaler::fit(&raw_rows);
        let rows = raw_rows
            .iter()
            .map(|row| scaler.transform_row(row))
            .collect();
        Some(FeatureMatrix {
            batters: names,
            columns,
            rows,
            scaler,
        })
    }

    /// Ground-truth weakness scores per batter, aligned to vocabulary order.
    pub fn weakness_labels(
        &self,
        batters: &BTreeMap<String, BatterFeatures>,
    ) -> BTreeMap<String, Vec<f64>> {
        batters
            .iter()
            .map(|(name, features)| {
                let scores = self
                    .vocab
                    .types()
                    .iter()
                    .map(|bowling_type| {
                        let stats = features.type_stats(bowling_type);
                        weakness_label(stats.strike_rate, stats.dismissal_rate, stats.balls_faced)
                    })
                    .collect();
                (name.clone(), scores)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bowling::default_vocabulary;
    use crate::features::TypeStats;

    fn stub_features(name: &str, total_balls: u32, rf_stats: TypeStats) -> BatterFeatures {
        let vocab = default_vocabulary();
        let mut per_type: BTreeMap<String, TypeStats> = vocab
            .types()
            .iter()
            .map(|t| (t.clone(), TypeStats::default()))
            .collect();
        per_type.insert("Right Arm Fast".to_string(), rf_stats);
        BatterFeatures {
            batter: name.to_string(),
            total_balls,
            total_runs: total_balls as i64,
            strike_rate: 100.0,
            dismissals: 1,
            boundary_percentage: 10.0,
            per_type,
        }
    }

    #[test]
    fn max_strike_rate_and_no_dismissals_is_never_weak() {
        assert_eq!(weakness_label(200.0, 0.0, 30), 0.0);
    }

    #[test]
    fn small_samples_shrink_the_label() {
        let full = weakness_label(80.0, 20.0, 15);
        let shrunk = weakness_label(80.0, 20.0, 5);
        assert!(full > shrunk);
        assert!((shrunk - full * (5.0 / 15.0)).abs() < 1e-9);
    }

    #[test]
    fn matrix_gates_on_total_balls() {
        let vocab = default_vocabulary().clone();
        let engineer = FeatureEngineer::new(vocab);
        let rf = TypeStats {
            strike_rate: 120.0,
            dismissal_rate: 8.0,
            balls_faced: 25,
        };
        let mut batters = BTreeMap::new();
        batters.insert("thin".to_string(), stub_features("thin", 10, rf));
        assert!(engineer.build_matrix(&batters).is_none());

        batters.insert("solid".to_string(), stub_features("solid", 40, rf));
        let matrix = engineer.build_matrix(&batters).expect("one gated batter");
        assert_eq!(matrix.batters, vec!["solid".to_string()]);
        assert_eq!(matrix.columns.len(), 5 + 3 * default_vocabulary().len());
        assert_eq!(matrix.rows[0].len(), matrix.columns.len());
    }

    #[test]
    fn scaler_roundtrips_at_inference() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 30.0], vec![5.0, 50.0]];
        let scaler = Scaler::fit(&rows);
        let transformed = scaler.transform_row(&[3.0, 30.0]);
        assert!(transformed.iter().all(|v| v.abs() < 1e-9));
        // Zero-variance columns stay finite.
        let flat = Scaler::fit(&[vec![2.0], vec![2.0]]);
        assert!(flat.transform_row(&[2.0])[0].is_finite());
    }

    #[test]
    fn column_lookup_matches_column_order() {
        let vocab = default_vocabulary();
        let rf = TypeStats {
            strike_rate: 150.0,
            dismissal_rate: 5.0,
            balls_faced: 12,
        };
        let features = stub_features("b", 30, rf);
        let columns = feature_columns(vocab);
        let row: Vec<f64> = columns
            .iter()
            .map(|c| value_for_column(&features, c))
            .collect();
        assert_eq!(row[0], 30.0);
        let rf_sr_idx = columns
            .iter()
            .position(|c| c == "Right Arm Fast_sr")
            .expect("column exists");
        assert_eq!(row[rf_sr_idx], 150.0);
        assert_eq!(value_for_column(&features, "not_a_column"), 0.0);
    }
}
