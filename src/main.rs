use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use t20_matchup::bowling::default_vocabulary;
use t20_matchup::dataset::load_deliveries_csv;
use t20_matchup::delivery::{Phase, preprocess};
use t20_matchup::features::DEFAULT_MIN_BALLS;
use t20_matchup::model::LoadOutcome;
use t20_matchup::recommend::{DEFAULT_SIMILAR_BATTERS, Method, Outcome, RecommendationEngine};

const DEFAULT_MODELS_DIR: &str = "models";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        print_usage();
        return Err(anyhow!("missing command"));
    };

    let data_path = flag_value(&args, "--data")
        .map(PathBuf::from)
        .context("missing --data=<csv> argument")?;
    let models_dir = flag_value(&args, "--models")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS_DIR));
    let min_balls = match flag_value(&args, "--min-balls") {
        Some(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("invalid --min-balls value {raw:?}"))?,
        None => DEFAULT_MIN_BALLS,
    };
    let phase = match flag_value(&args, "--phase") {
        Some(raw) => Some(Phase::parse(&raw).ok_or_else(|| anyhow!("unknown phase {raw:?}"))?),
        None => None,
    };

    let raw = load_deliveries_csv(&data_path)?;
    let processed = preprocess(&raw, default_vocabulary());
    println!(
        "Loaded {} deliveries ({} legal) from {}",
        processed.all.len(),
        processed.valid.len(),
        data_path.display()
    );

    let mut engine = RecommendationEngine::new(processed, default_vocabulary().clone(), models_dir)
        .with_min_balls(min_balls);

    match command {
        "train" => run_train(&mut engine),
        "recommend" => {
            let batter = positional(&args, 1).context("recommend needs a batter name")?;
            run_recommend(&mut engine, &batter, phase)
        }
        "similar" => {
            let batter = positional(&args, 1).context("similar needs a batter name")?;
            run_similar(&mut engine, &batter)
        }
        "batters" => run_batters(&engine),
        other => {
            print_usage();
            Err(anyhow!("unknown command {other:?}"))
        }
    }
}

fn run_train(engine: &mut RecommendationEngine) -> Result<()> {
    if !engine.prepare_training() {
        println!("Training skipped: insufficient data");
        std::process::exit(1);
    }
    let report = engine
        .scorer()
        .trained()
        .map(|model| model.report)
        .context("scorer is trained after a successful training pass")?;
    println!(
        "Model trained on {} batters ({} held out for validation)",
        report.train_samples, report.val_samples
    );
    match report.val_mse {
        Some(mse) => println!("Validation MSE: {mse:.3}"),
        None => println!("Validation MSE: n/a (too few batters for a holdout)"),
    }
    println!(
        "Snapshot written to {}",
        engine.scorer().models_dir().display()
    );
    Ok(())
}

fn run_recommend(
    engine: &mut RecommendationEngine,
    batter: &str,
    phase: Option<Phase>,
) -> Result<()> {
    engine.load_models();

    let rec = engine.recommend(batter, phase);
    match phase {
        Some(p) => println!("Batter: {batter} ({p})"),
        None => println!("Batter: {batter}"),
    }
    println!("Method: {}", rec.method.label());
    match &rec.outcome {
        Outcome::Recommended {
            bowling_type,
            score,
        } => println!("Recommend: {bowling_type} (weakness score {score:.2})"),
        Outcome::NoReliableData => {
            println!("No reliable data: no bowling type clears the sample threshold")
        }
        Outcome::NoData => println!("No data: no deliveries match this batter/phase"),
    }
    if !rec.predictions.is_empty() {
        println!("Scores:");
        for (bowling_type, score) in &rec.predictions {
            println!("  {bowling_type}: {score:.2}");
        }
    }
    if rec.method == Method::Ml && !rec.similar_batters.is_empty() {
        println!("Similar batters: {}", rec.similar_batters.join(", "));
    }
    Ok(())
}

fn run_similar(engine: &mut RecommendationEngine, batter: &str) -> Result<()> {
    if engine.load_models() != LoadOutcome::Loaded {
        println!("No trained snapshot; run `train` first");
        std::process::exit(1);
    }
    let Some(features) = engine.batter_features(batter, None) else {
        println!("No data: batter {batter:?} has no legal deliveries");
        std::process::exit(1);
    };
    let similar =
        engine
            .scorer()
            .find_similar(&features, engine.batter_index(), DEFAULT_SIMILAR_BATTERS);
    if similar.is_empty() {
        println!("No cluster-mates found for {batter}");
    } else {
        println!("Batters similar to {batter}:");
        for name in similar {
            println!("  {name}");
        }
    }
    Ok(())
}

fn run_batters(engine: &RecommendationEngine) -> Result<()> {
    for (name, balls) in engine.batters() {
        println!("{name}: {balls} legal deliveries");
    }
    Ok(())
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag {
            if let Some(next) = args.get(idx + 1) {
                let trimmed = next.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }
    None
}

fn positional(args: &[String], index: usize) -> Option<String> {
    let mut skip_next = false;
    args.iter()
        .filter(|arg| {
            if skip_next {
                skip_next = false;
                return false;
            }
            if let Some(flag) = arg.strip_prefix("--") {
                skip_next = !flag.contains('=');
                return false;
            }
            true
        })
        .nth(index)
        .cloned()
}

fn print_usage() {
    eprintln!(
        "usage: t20_matchup <command> --data=<csv> [--models=<dir>] [--phase=<name>] [--min-balls=<n>]"
    );
    eprintln!("commands:");
    eprintln!("  train                fit and persist the weakness model");
    eprintln!("  recommend <batter>   recommend a bowling type against a batter");
    eprintln!("  similar <batter>     list cluster-mates for a batter");
    eprintln!("  batters              list batters with legal delivery counts");
}
