use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use t20_matchup::bowling::default_vocabulary;
use t20_matchup::delivery::{RawDelivery, preprocess};
use t20_matchup::features::extract_batter_features;
use t20_matchup::recommend::RecommendationEngine;

fn synthetic_rows(batters: usize, balls_per_type: usize) -> Vec<RawDelivery> {
    let styles = [("RF", "PACE"), ("SLA", "SPIN"), ("SLC", "SPIN")];
    let mut rows = Vec::new();
    for i in 0..batters {
        for (t_idx, (style, kind)) in styles.iter().enumerate() {
            for j in 0..balls_per_type {
                rows.push(RawDelivery {
                    batter: format!("batter_{i:03}"),
                    bowler: format!("bowler_{t_idx}"),
                    over: (j % 20).to_string(),
                    runs_off_bat: ((i + t_idx + j) % 5).to_string(),
                    wide: "0".to_string(),
                    no_ball: "0".to_string(),
                    wicket: usize::from((i + t_idx * 3 + j) % 11 == 0).to_string(),
                    bowl_style: style.to_string(),
                    bowl_kind: kind.to_string(),
                });
            }
        }
    }
    rows
}

fn bench_preprocess(c: &mut Criterion) {
    let rows = synthetic_rows(50, 20);
    c.bench_function("preprocess", |b| {
        b.iter(|| {
            let processed = preprocess(black_box(&rows), default_vocabulary());
            black_box(processed.valid.len());
        })
    });
}

fn bench_feature_extraction(c: &mut Criterion) {
    let rows = synthetic_rows(50, 20);
    let processed = preprocess(&rows, default_vocabulary());
    c.bench_function("feature_extraction", |b| {
        b.iter(|| {
            let features = extract_batter_features(
                black_box(&processed.valid),
                default_vocabulary(),
                "batter_025",
                None,
                5,
            )
            .expect("batter present");
            black_box(features.total_balls);
        })
    });
}

fn bench_training(c: &mut Criterion) {
    let rows = synthetic_rows(40, 15);
    let processed = preprocess(&rows, default_vocabulary());
    c.bench_function("training", |b| {
        b.iter(|| {
            let dir = tempfile::tempdir().expect("tempdir");
            let mut engine = RecommendationEngine::new(
                processed.clone(),
                default_vocabulary().clone(),
                dir.path(),
            );
            black_box(engine.prepare_training());
        })
    });
}

fn bench_recommend(c: &mut Criterion) {
    let rows = synthetic_rows(40, 15);
    let processed = preprocess(&rows, default_vocabulary());
    let dir = tempfile::tempdir().expect("tempdir");
    let mut engine =
        RecommendationEngine::new(processed, default_vocabulary().clone(), dir.path());
    assert!(engine.prepare_training());
    c.bench_function("recommend", |b| {
        b.iter(|| {
            let rec = engine.recommend(black_box("batter_010"), None);
            black_box(rec.method);
        })
    });
}

criterion_group!(
    perf,
    bench_preprocess,
    bench_feature_extraction,
    bench_training,
    bench_recommend
);
criterion_main!(perf);
