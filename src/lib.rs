//! Bowling matchup recommendations from ball-by-ball T20 data.
//!
//! The pipeline: raw deliveries are cleaned and phase-tagged
//! ([`delivery::preprocess`]), aggregated into per-batter feature vectors
//! ([`features`]), turned into a standardized matrix with weakness labels
//! ([`engineering`]), and fed to a k-means + multi-output ridge scorer
//! ([`model`]). The [`recommend::RecommendationEngine`] picks the ML path
//! when a trained snapshot exists and falls back to a statistical formula
//! otherwise.

pub mod bowling;
pub mod dataset;
pub mod delivery;
pub mod engineering;
pub mod features;
pub mod model;
pub mod recommend;

pub use bowling::{BowlingVocabulary, default_vocabulary};
pub use delivery::{Delivery, Phase, ProcessedDeliveries, RawDelivery, preprocess};
pub use features::{BatterFeatures, extract_batter_features};
pub use model::{LoadOutcome, MlScorer, TrainingReport};
pub use recommend::{Method, Outcome, Recommendation, RecommendationEngine};
