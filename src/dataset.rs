use std::path::Path;

use anyhow::{Context, Result};
use csv::StringRecord;

use crate::delivery::RawDelivery;

/// Expected column names in a ball-by-ball CSV export. Lookup is by header
/// name, case-insensitive; missing columns read as empty cells.
const COL_BATTER: &str = "bat";
const COL_BOWLER: &str = "bowl";
const COL_OVER: &str = "over";
const COL_RUNS: &str = "batruns";
const COL_WIDE: &str = "wide";
const COL_NO_BALL: &str = "noball";
const COL_WICKET: &str = "out";
const COL_STYLE: &str = "bowl_style";
const COL_KIND: &str = "bowl_kind";

/// Thin loader: CSV rows in, raw text records out. All cleaning and numeric
/// coercion is the preprocessor's job.
pub fn load_deliveries_csv(path: &Path) -> Result<Vec<RawDelivery>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("open deliveries csv {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("read csv headers {}", path.display()))?
        .clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    };
    let batter = position(COL_BATTER);
    let bowler = position(COL_BOWLER);
    let over = position(COL_OVER);
    let runs = position(COL_RUNS);
    let wide = position(COL_WIDE);
    let no_ball = position(COL_NO_BALL);
    let wicket = position(COL_WICKET);
    let style = position(COL_STYLE);
    let kind = position(COL_KIND);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("read csv record {}", path.display()))?;
        rows.push(RawDelivery {
            batter: field(&record, batter),
            bowler: field(&record, bowler),
            over: field(&record, over),
            runs_off_bat: field(&record, runs),
            wide: field(&record, wide),
            no_ball: field(&record, no_ball),
            wicket: field(&record, wicket),
            bowl_style: field(&record, style),
            bowl_kind: field(&record, kind),
        });
    }
    Ok(rows)
}

fn field(record: &StringRecord, idx: Option<usize>) -> String {
    idx.and_then(|i| record.get(i))
        .unwrap_or_default()
        .trim()
        .to_string()
}
