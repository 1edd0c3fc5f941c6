use std::collections::BTreeMap;

use crate::bowling::BowlingVocabulary;
use crate::delivery::{Delivery, Phase};

/// Minimum balls faced against a bowling type before its stats count as a
/// real sample.
pub const DEFAULT_MIN_BALLS: u32 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TypeStats {
    pub strike_rate: f64,
    pub dismissal_rate: f64,
    pub balls_faced: u32,
}

/// Per-batter aggregate over legal deliveries, optionally scoped to a phase.
///
/// `per_type` covers every vocabulary type. Entries below the minimum-balls
/// threshold are zeroed but present, so every vector has identical width for
/// matrix construction. All-zero per-type entries mean "no reliable per-type
/// signal", which is distinct from "no data at all" (extraction returns
/// `None` for that).
#[derive(Debug, Clone, PartialEq)]
pub struct BatterFeatures {
    pub batter: String,
    pub total_balls: u32,
    pub total_runs: i64,
    pub strike_rate: f64,
    pub dismissals: u32,
    pub boundary_percentage: f64,
    pub per_type: BTreeMap<String, TypeStats>,
}

impl BatterFeatures {
    pub fn type_stats(&self, bowling_type: &str) -> TypeStats {
        self.per_type.get(bowling_type).copied().unwrap_or_default()
    }
}

/// Aggregate one batter's legal deliveries into a feature vector.
///
/// Returns `None` iff zero deliveries match the batter/phase filter; this is
/// the single source of the "No Data" outcome downstream.
pub fn extract_batter_features(
    valid: &[Delivery],
    vocab: &BowlingVocabulary,
    batter: &str,
    phase: Option<Phase>,
    min_balls: u32,
) -> Option<BatterFeatures> {
    let filtered: Vec<&Delivery> = valid
        .iter()
        .filter(|d| d.batter == batter)
        .filter(|d| phase.is_none_or(|p| d.phase == p))
        .collect();
    if filtered.is_empty() {
        return None;
    }

    let total_balls = filtered.len() as u32;
    let total_runs: i64 = filtered.iter().map(|d| d.runs_off_bat).sum();
    let dismissals = filtered.iter().filter(|d| d.wicket).count() as u32;
    let boundaries = filtered.iter().filter(|d| d.is_boundary()).count();

    struct TypeAccum {
        runs: i64,
        balls: u32,
        outs: u32,
    }
    let mut groups: BTreeMap<&str, TypeAccum> = BTreeMap::new();
    for d in &filtered {
        let acc = groups.entry(d.bowling_type.as_str()).or_insert(TypeAccum {
            runs: 0,
            balls: 0,
            outs: 0,
        });
        acc.runs += d.runs_off_bat;
        acc.balls += 1;
        acc.outs += u32::from(d.wicket);
    }

    // Fixed-width: every vocabulary type gets an entry, zeroed unless the
    // sample clears the threshold.
    let mut per_type = BTreeMap::new();
    for bowling_type in vocab.types() {
        let stats = groups
            .get(bowling_type.as_str())
            .filter(|acc| acc.balls >= min_balls.max(1))
            .map(|acc| TypeStats {
                strike_rate: acc.runs as f64 / acc.balls as f64 * 100.0,
                dismissal_rate: acc.outs as f64 / acc.balls as f64 * 100.0,
                balls_faced: acc.balls,
            })
            .unwrap_or_default();
        per_type.insert(bowling_type.clone(), stats);
    }

    Some(BatterFeatures {
        batter: batter.to_string(),
        total_balls,
        total_runs,
        strike_rate: total_runs as f64 / total_balls as f64 * 100.0,
        dismissals,
        boundary_percentage: boundaries as f64 / total_balls as f64 * 100.0,
        per_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bowling::default_vocabulary;

    fn ball(batter: &str, over: u32, runs: i64, wicket: bool, bowling_type: &str) -> Delivery {
        Delivery {
            batter: batter.to_string(),
            bowler: "bowler".to_string(),
            over,
            runs_off_bat: runs,
            wide: false,
            no_ball: false,
            wicket,
            phase: Phase::from_over(over),
            bowling_type: bowling_type.to_string(),
        }
    }

    #[test]
    fn summary_and_per_type_stats_match_known_sample() {
        // 10 legal powerplay balls vs Right Arm Fast: 20 runs, 1 wicket,
        // 2 boundary balls.
        let mut balls = vec![
            ball("B", 2, 4, false, "Right Arm Fast"),
            ball("B", 2, 6, false, "Right Arm Fast"),
            ball("B", 3, 0, true, "Right Arm Fast"),
        ];
        // Seven more singles-and-threes adding up to 10 runs.
        for runs in [1, 2, 1, 3, 1, 1, 1] {
            balls.push(ball("B", 4, runs, false, "Right Arm Fast"));
        }
        let f = extract_batter_features(
            &balls,
            default_vocabulary(),
            "B",
            Some(Phase::Powerplay),
            5,
        )
        .expect("batter has deliveries");

        assert_eq!(f.total_balls, 10);
        assert_eq!(f.total_runs, 20);
        assert_eq!(f.strike_rate, 200.0);
        assert_eq!(f.dismissals, 1);
        assert_eq!(f.boundary_percentage, 20.0);

        let rf = f.type_stats("Right Arm Fast");
        assert_eq!(rf.strike_rate, 200.0);
        assert_eq!(rf.dismissal_rate, 10.0);
        assert_eq!(rf.balls_faced, 10);

        // Every other vocabulary type is present and zeroed.
        assert_eq!(f.per_type.len(), default_vocabulary().len());
        assert_eq!(f.type_stats("Left Arm Fast"), TypeStats::default());
    }

    #[test]
    fn extraction_is_deterministic() {
        let balls: Vec<Delivery> = (0..30)
            .map(|i| ball("B", i % 20, (i % 5) as i64, i % 7 == 0, "Right Arm Fast"))
            .collect();
        let a = extract_batter_features(&balls, default_vocabulary(), "B", None, 5);
        let b = extract_batter_features(&balls, default_vocabulary(), "B", None, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn zero_matching_deliveries_is_none() {
        let balls = vec![ball("B", 2, 1, false, "Right Arm Fast")];
        assert!(extract_batter_features(&balls, default_vocabulary(), "C", None, 5).is_none());
        assert!(
            extract_batter_features(
                &balls,
                default_vocabulary(),
                "B",
                Some(Phase::Death),
                5
            )
            .is_none()
        );
    }

    #[test]
    fn below_threshold_types_are_zeroed_but_summary_remains() {
        let balls = vec![
            ball("B", 2, 4, false, "Right Arm Fast"),
            ball("B", 2, 1, false, "Left Arm Orthodox"),
        ];
        let f = extract_batter_features(&balls, default_vocabulary(), "B", None, 5)
            .expect("batter has deliveries");
        assert_eq!(f.total_balls, 2);
        assert!(f.per_type.values().all(|s| s.balls_faced == 0));
    }
}
