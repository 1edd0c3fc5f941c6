use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bowling::{BowlingVocabulary, derive_bowling_type};

/// One delivery as handed over by the dataset loader: everything is still
/// text. Numeric coercion happens in [`preprocess`], never in the loader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDelivery {
    pub batter: String,
    pub bowler: String,
    pub over: String,
    pub runs_off_bat: String,
    pub wide: String,
    pub no_ball: String,
    pub wicket: String,
    pub bowl_style: String,
    pub bowl_kind: String,
}

/// T20 innings phase by over number. The cutoffs encode cricket convention
/// and must not drift: over <= 6 Powerplay, 7-11 Middle1, 12-16 Middle2,
/// >= 17 Death.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Powerplay,
    Middle1,
    Middle2,
    Death,
    Unknown,
}

impl Phase {
    pub fn from_over(over: u32) -> Self {
        match over {
            0..=6 => Phase::Powerplay,
            7..=11 => Phase::Middle1,
            12..=16 => Phase::Middle2,
            _ => Phase::Death,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Powerplay => "Powerplay",
            Phase::Middle1 => "Middle1",
            Phase::Middle2 => "Middle2",
            Phase::Death => "Death",
            Phase::Unknown => "Unknown",
        }
    }

    pub fn parse(raw: &str) -> Option<Phase> {
        let raw = raw.trim();
        [
            Phase::Powerplay,
            Phase::Middle1,
            Phase::Middle2,
            Phase::Death,
            Phase::Unknown,
        ]
        .into_iter()
        .find(|p| p.label().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Cleaned delivery. Derived once at preprocess time, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub batter: String,
    pub bowler: String,
    pub over: u32,
    pub runs_off_bat: i64,
    pub wide: bool,
    pub no_ball: bool,
    pub wicket: bool,
    pub phase: Phase,
    pub bowling_type: String,
}

impl Delivery {
    pub fn is_legal(&self) -> bool {
        !self.wide && !self.no_ball
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self.runs_off_bat, 4 | 6)
    }
}

/// Output of preprocessing: the full cleaned table plus the legal subset
/// batting statistics are computed from.
#[derive(Debug, Clone, Default)]
pub struct ProcessedDeliveries {
    pub all: Vec<Delivery>,
    pub valid: Vec<Delivery>,
}

/// Clean a raw delivery table: trim text fields, coerce numerics (missing or
/// unparseable values become zero), assign phases and bowling-type labels,
/// and split out the wide/no-ball-free subset.
pub fn preprocess(rows: &[RawDelivery], vocab: &BowlingVocabulary) -> ProcessedDeliveries {
    let mut all = Vec::with_capacity(rows.len());
    for row in rows {
        let over = coerce_u32(&row.over);
        all.push(Delivery {
            batter: row.batter.trim().to_string(),
            bowler: row.bowler.trim().to_string(),
            over,
            runs_off_bat: coerce_i64(&row.runs_off_bat),
            wide: coerce_flag(&row.wide),
            no_ball: coerce_flag(&row.no_ball),
            wicket: coerce_flag(&row.wicket),
            phase: Phase::from_over(over),
            bowling_type: derive_bowling_type(vocab, &row.bowl_style, &row.bowl_kind),
        });
    }
    let valid = all.iter().filter(|d| d.is_legal()).cloned().collect();
    ProcessedDeliveries { all, valid }
}

fn coerce_i64(raw: &str) -> i64 {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return n;
    }
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v as i64)
        .unwrap_or(0)
}

fn coerce_u32(raw: &str) -> u32 {
    u32::try_from(coerce_i64(raw).max(0)).unwrap_or(0)
}

fn coerce_flag(raw: &str) -> bool {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("true") {
        return true;
    }
    if raw.eq_ignore_ascii_case("false") {
        return false;
    }
    coerce_i64(raw) != 0
}
