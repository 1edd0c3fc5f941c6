use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bowling::BowlingVocabulary;
use crate::engineering::{FeatureMatrix, Scaler, value_for_column};
use crate::features::BatterFeatures;

pub const MODEL_VERSION: u32 = 1;
pub const DEFAULT_CLUSTERS: usize = 5;

const KMEANS_FILE: &str = "kmeans_v1.json";
const REGRESSION_FILE: &str = "weakness_model_v1.json";
const HOLDOUT_FRACTION: f64 = 0.2;
const MIN_ROWS_FOR_HOLDOUT: usize = 5;
const RIDGE_L2: f64 = 1.0;
const KMEANS_MAX_ITERS: usize = 100;
const KMEANS_TOLERANCE: f64 = 1e-9;
const TRAIN_SEED: u64 = 42;

/// K-means centroids over standardized batter vectors, used for similarity
/// lookup only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansModel {
    pub centroids: Vec<Vec<f64>>,
}

impl KMeansModel {
    pub fn assign(&self, row: &[f64]) -> usize {
        let mut best = 0usize;
        let mut best_dist = f64::INFINITY;
        for (idx, centroid) in self.centroids.iter().enumerate() {
            let dist = squared_distance(row, centroid);
            if dist < best_dist {
                best_dist = dist;
                best = idx;
            }
        }
        best
    }
}

/// One ridge regression head per bowling type; weights align to the trained
/// feature columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeHead {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl RidgeHead {
    fn evaluate(&self, row: &[f64]) -> f64 {
        let mut sum = self.bias;
        for (w, v) in self.weights.iter().zip(row) {
            sum += w * v;
        }
        sum
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingReport {
    pub train_samples: usize,
    pub val_samples: usize,
    pub val_mse: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub vocabulary: BowlingVocabulary,
    pub feature_columns: Vec<String>,
    pub scaler: Scaler,
    pub kmeans: KMeansModel,
    pub heads: Vec<RidgeHead>,
    pub report: TrainingReport,
}

impl TrainedModel {
    fn standardized_row(&self, features: &BatterFeatures) -> Vec<f64> {
        let raw: Vec<f64> = self
            .feature_columns
            .iter()
            .map(|c| value_for_column(features, c))
            .collect();
        self.scaler.transform_row(&raw)
    }
}

/// Explicit training state; branching on it replaces the original mutable
/// `is_trained` flag.
#[derive(Debug, Clone)]
pub enum ScorerState {
    Untrained,
    Trained(TrainedModel),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    NotFound,
    Corrupt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KMeansArtifact {
    version: u32,
    generated_at: String,
    vocabulary: BowlingVocabulary,
    feature_columns: Vec<String>,
    scaler: Scaler,
    kmeans: KMeansModel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegressionArtifact {
    version: u32,
    generated_at: String,
    vocabulary: BowlingVocabulary,
    feature_columns: Vec<String>,
    scaler: Scaler,
    heads: Vec<RidgeHead>,
    train_samples: usize,
    val_samples: usize,
    val_mse: Option<f64>,
}

/// Trainable scorer: k-means for batter similarity plus per-type ridge
/// regression for weakness prediction, persisted as two versioned JSON
/// artifacts under the models directory.
#[derive(Debug)]
pub struct MlScorer {
    models_dir: PathBuf,
    state: ScorerState,
}

impl MlScorer {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            state: ScorerState::Untrained,
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.state, ScorerState::Trained(_))
    }

    pub fn trained(&self) -> Option<&TrainedModel> {
        match &self.state {
            ScorerState::Trained(model) => Some(model),
            ScorerState::Untrained => None,
        }
    }

    /// Fit clustering and regression on the standardized matrix. Degenerate
    /// input surfaces as an error ("insufficient data") and leaves any
    /// existing trained state and persisted snapshot untouched.
    pub fn train(
        &mut self,
        matrix: &FeatureMatrix,
        labels: &BTreeMap<String, Vec<f64>>,
        vocab: &BowlingVocabulary,
    ) -> Result<TrainingReport> {
        let n = matrix.rows.len();
        if n < 2 {
            return Err(anyhow!(
                "insufficient training data: {n} batter(s) with enough balls, need at least 2"
            ));
        }
        let outputs = vocab.len();
        if outputs == 0 {
            return Err(anyhow!("insufficient training data: empty vocabulary"));
        }
        let targets: Vec<Vec<f64>> = matrix
            .batters
            .iter()
            .map(|name| {
                labels
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; outputs])
            })
            .collect();

        let mut rng = StdRng::seed_from_u64(TRAIN_SEED);
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        let mut val_count = if n >= MIN_ROWS_FOR_HOLDOUT {
            (n as f64 * HOLDOUT_FRACTION).round() as usize
        } else {
            0
        };
        val_count = val_count.min(n - 2);
        let (val_idx, train_idx) = indices.split_at(val_count);

        let train_rows: Vec<&Vec<f64>> = train_idx.iter().map(|&i| &matrix.rows[i]).collect();
        if train_rows.iter().all(|row| *row == train_rows[0]) {
            return Err(anyhow!(
                "insufficient training data: all training vectors are identical"
            ));
        }

        let k = DEFAULT_CLUSTERS.min(train_rows.len());
        let kmeans = fit_kmeans(&train_rows, k, &mut rng);

        let mut heads = Vec::with_capacity(outputs);
        for output in 0..outputs {
            let y: Vec<f64> = train_idx.iter().map(|&i| targets[i][output]).collect();
            let head = fit_ridge(&train_rows, &y, RIDGE_L2)
                .ok_or_else(|| anyhow!("insufficient training data: ridge fit is degenerate"))?;
            heads.push(head);
        }

        let val_mse = if val_idx.is_empty() {
            None
        } else {
            let mut sum = 0.0;
            for &i in val_idx {
                for (output, head) in heads.iter().enumerate() {
                    let err = head.evaluate(&matrix.rows[i]) - targets[i][output];
                    sum += err * err;
                }
            }
            Some(sum / (val_idx.len() * outputs) as f64)
        };

        let report = TrainingReport {
            train_samples: train_idx.len(),
            val_samples: val_idx.len(),
            val_mse,
        };
        let model = TrainedModel {
            vocabulary: vocab.clone(),
            feature_columns: matrix.columns.clone(),
            scaler: matrix.scaler.clone(),
            kmeans,
            heads,
            report,
        };
        self.save(&model)?;
        info!(
            train_samples = report.train_samples,
            val_samples = report.val_samples,
            val_mse = report.val_mse,
            "trained weakness model"
        );
        self.state = ScorerState::Trained(model);
        Ok(report)
    }

    /// Predicted weakness score per vocabulary type, or `None` when
    /// untrained. The input vector is aligned to the trained column order:
    /// missing columns read as zero, unknown ones are ignored.
    pub fn predict(&self, features: &BatterFeatures) -> Option<BTreeMap<String, f64>> {
        let model = self.trained()?;
        let row = model.standardized_row(features);
        Some(
            model
                .vocabulary
                .types()
                .iter()
                .zip(&model.heads)
                .map(|(bowling_type, head)| (bowling_type.clone(), head.evaluate(&row)))
                .collect(),
        )
    }

    /// Up to `top_n` other batters assigned to the query vector's cluster.
    /// Iteration over the (sorted) batter map keeps the order deterministic.
    pub fn find_similar(
        &self,
        features: &BatterFeatures,
        batters: &BTreeMap<String, BatterFeatures>,
        top_n: usize,
    ) -> Vec<String> {
        let Some(model) = self.trained() else {
            return Vec::new();
        };
        let cluster = model.kmeans.assign(&model.standardized_row(features));
        let mut similar = Vec::new();
        for (name, candidate) in batters {
            if *name == features.batter {
                continue;
            }
            if model.kmeans.assign(&model.standardized_row(candidate)) == cluster {
                similar.push(name.clone());
                if similar.len() == top_n {
                    break;
                }
            }
        }
        similar
    }

    /// Restore the persisted snapshot. Missing or corrupt artifacts leave the
    /// scorer untrained; callers fall back to the statistical path.
    pub fn load(&mut self) -> LoadOutcome {
        let kmeans_path = self.models_dir.join(KMEANS_FILE);
        let regression_path = self.models_dir.join(REGRESSION_FILE);
        match (kmeans_path.exists(), regression_path.exists()) {
            (false, false) => {
                info!(dir = %self.models_dir.display(), "no persisted model snapshot");
                return LoadOutcome::NotFound;
            }
            // The artifacts are written as a pair; one without the other
            // means a damaged snapshot, not an absent one.
            (false, true) | (true, false) => {
                warn!(
                    dir = %self.models_dir.display(),
                    "persisted model snapshot is incomplete; staying untrained"
                );
                return LoadOutcome::Corrupt;
            }
            (true, true) => {}
        }

        match self.read_snapshot(&kmeans_path, &regression_path) {
            Some(model) => {
                self.state = ScorerState::Trained(model);
                LoadOutcome::Loaded
            }
            None => {
                warn!(
                    dir = %self.models_dir.display(),
                    "persisted model snapshot is corrupt; staying untrained"
                );
                LoadOutcome::Corrupt
            }
        }
    }

    fn read_snapshot(&self, kmeans_path: &Path, regression_path: &Path) -> Option<TrainedModel> {
        let kmeans: KMeansArtifact =
            serde_json::from_str(&fs::read_to_string(kmeans_path).ok()?).ok()?;
        let regression: RegressionArtifact =
            serde_json::from_str(&fs::read_to_string(regression_path).ok()?).ok()?;

        // The two artifacts are only usable as a pair trained together.
        if kmeans.version != MODEL_VERSION || regression.version != MODEL_VERSION {
            return None;
        }
        if kmeans.vocabulary != regression.vocabulary
            || kmeans.feature_columns != regression.feature_columns
            || kmeans.scaler != regression.scaler
        {
            return None;
        }
        if regression.heads.len() != regression.vocabulary.len() {
            return None;
        }
        let width = regression.feature_columns.len();
        if kmeans.kmeans.centroids.is_empty()
            || kmeans.kmeans.centroids.iter().any(|c| c.len() != width)
            || regression.heads.iter().any(|h| h.weights.len() != width)
        {
            return None;
        }

        Some(TrainedModel {
            vocabulary: regression.vocabulary,
            feature_columns: regression.feature_columns,
            scaler: regression.scaler,
            kmeans: kmeans.kmeans,
            heads: regression.heads,
            report: TrainingReport {
                train_samples: regression.train_samples,
                val_samples: regression.val_samples,
                val_mse: regression.val_mse,
            },
        })
    }

    fn save(&self, model: &TrainedModel) -> Result<()> {
        fs::create_dir_all(&self.models_dir).with_context(|| {
            format!("create models directory {}", self.models_dir.display())
        })?;
        let generated_at = chrono::Utc::now().to_rfc3339();
        write_artifact(
            &self.models_dir.join(KMEANS_FILE),
            &KMeansArtifact {
                version: MODEL_VERSION,
                generated_at: generated_at.clone(),
                vocabulary: model.vocabulary.clone(),
                feature_columns: model.feature_columns.clone(),
                scaler: model.scaler.clone(),
                kmeans: model.kmeans.clone(),
            },
        )?;
        write_artifact(
            &self.models_dir.join(REGRESSION_FILE),
            &RegressionArtifact {
                version: MODEL_VERSION,
                generated_at,
                vocabulary: model.vocabulary.clone(),
                feature_columns: model.feature_columns.clone(),
                scaler: model.scaler.clone(),
                heads: model.heads.clone(),
                train_samples: model.report.train_samples,
                val_samples: model.report.val_samples,
                val_mse: model.report.val_mse,
            },
        )?;
        Ok(())
    }
}

fn write_artifact<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)
        .with_context(|| format!("serialize artifact {}", path.display()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write artifact {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap artifact {}", path.display()))?;
    Ok(())
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn fit_kmeans(rows: &[&Vec<f64>], k: usize, rng: &mut StdRng) -> KMeansModel {
    let n = rows.len();
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut centroids: Vec<Vec<f64>> = Vec::with_capacity(k);
    centroids.push(rows[rng.gen_range(0..n)].clone());

    // kmeans++ seeding: prefer points far from the chosen centroids.
    while centroids.len() < k {
        let distances: Vec<f64> = rows
            .iter()
            .map(|row| {
                centroids
                    .iter()
                    .map(|c| squared_distance(row, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = distances.iter().sum();
        let pick = if total > 0.0 {
            let mut target = rng.r#gen::<f64>() * total;
            let mut chosen = n - 1;
            for (idx, d) in distances.iter().enumerate() {
                target -= d;
                if target <= 0.0 {
                    chosen = idx;
                    break;
                }
            }
            chosen
        } else {
            rng.gen_range(0..n)
        };
        centroids.push(rows[pick].clone());
    }

    let mut assignments = vec![0usize; n];
    for _ in 0..KMEANS_MAX_ITERS {
        let model = KMeansModel {
            centroids: centroids.clone(),
        };
        for (slot, row) in assignments.iter_mut().zip(rows) {
            *slot = model.assign(row);
        }

        let mut sums = vec![vec![0.0; width]; k];
        let mut counts = vec![0usize; k];
        for (row, &cluster) in rows.iter().zip(&assignments) {
            counts[cluster] += 1;
            for (s, v) in sums[cluster].iter_mut().zip(row.iter()) {
                *s += v;
            }
        }

        let mut shift = 0.0f64;
        for cluster in 0..k {
            if counts[cluster] == 0 {
                continue; // empty cluster keeps its previous centroid
            }
            let mean: Vec<f64> = sums[cluster]
                .iter()
                .map(|s| s / counts[cluster] as f64)
                .collect();
            shift = shift.max(squared_distance(&centroids[cluster], &mean));
            centroids[cluster] = mean;
        }
        if shift < KMEANS_TOLERANCE {
            break;
        }
    }

    KMeansModel { centroids }
}

/// Ridge regression via normal equations with an unpenalized bias term.
/// Returns `None` only when the regularized system is still singular.
fn fit_ridge(rows: &[&Vec<f64>], y: &[f64], l2: f64) -> Option<RidgeHead> {
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    let dim = width + 1; // bias appended last

    let mut ata = vec![vec![0.0f64; dim]; dim];
    let mut atb = vec![0.0f64; dim];
    for (row, target) in rows.iter().zip(y) {
        for i in 0..dim {
            let xi = if i < width { row[i] } else { 1.0 };
            atb[i] += xi * target;
            for j in i..dim {
                let xj = if j < width { row[j] } else { 1.0 };
                ata[i][j] += xi * xj;
            }
        }
    }
    for i in 0..dim {
        for j in 0..i {
            ata[i][j] = ata[j][i];
        }
    }
    for (i, diag) in ata.iter_mut().enumerate().take(width) {
        diag[i] += l2;
    }

    let solution = solve_linear_system(ata, atb)?;
    let bias = solution[width];
    let mut weights = solution;
    weights.truncate(width);
    Some(RidgeHead { weights, bias })
}

/// Gaussian elimination with partial pivoting.
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let dim = b.len();
    for col in 0..dim {
        let mut pivot = col;
        for row in col + 1..dim {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..dim {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..dim {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0f64; dim];
    for col in (0..dim).rev() {
        let mut sum = b[col];
        for k in col + 1..dim {
            sum -= a[col][k] * x[k];
        }
        x[col] = sum / a[col][col];
    }
    Some(x)
}
