use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const UNKNOWN_TYPE: &str = "UNKNOWN";

/// Canonical bowling-type names plus the short-code table that maps raw
/// style codes onto them. The vocabulary fixes the width and column order of
/// every batter feature vector, so it is serialized into each persisted model
/// artifact and checked on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BowlingVocabulary {
    types: Vec<String>,
    code_map: HashMap<String, String>,
}

impl BowlingVocabulary {
    pub fn new<T, C>(types: T, code_map: C) -> Self
    where
        T: IntoIterator<Item = String>,
        C: IntoIterator<Item = (String, String)>,
    {
        Self {
            types: types.into_iter().collect(),
            code_map: code_map.into_iter().collect(),
        }
    }

    /// Ordered canonical names. This order is the ranking iteration order and
    /// the regression output order; it must stay stable for a given model.
    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn contains(&self, bowling_type: &str) -> bool {
        self.types.iter().any(|t| t == bowling_type)
    }

    pub fn canonical_for_code(&self, code: &str) -> Option<&str> {
        self.code_map.get(code).map(String::as_str)
    }
}

static DEFAULT_VOCABULARY: Lazy<BowlingVocabulary> = Lazy::new(|| {
    BowlingVocabulary::new(
        [
            "Right Arm Fast",
            "Left Arm Fast",
            "Right Arm Off Spin",
            "Left Arm Orthodox",
            "Left Arm Wrist Spin",
        ]
        .into_iter()
        .map(str::to_string),
        [
            ("RF", "Right Arm Fast"),
            ("RFM", "Right Arm Medium Fast"),
            ("LF", "Left Arm Fast"),
            ("LFM", "Left Arm Medium Fast"),
            ("OB", "Right Arm Off Spin"),
            ("SLA", "Left Arm Orthodox"),
            ("LBG", "Leg Break"),
            ("SLC", "Left Arm Wrist Spin"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string())),
    )
});

pub fn default_vocabulary() -> &'static BowlingVocabulary {
    &DEFAULT_VOCABULARY
}

/// Upper-case and trim a raw style/kind code before comparison.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

fn is_missing(code: &str) -> bool {
    matches!(code, "" | "NAN" | "NA" | "NULL" | "-")
}

/// Derive the normalized bowling-type label from raw style and kind codes.
///
/// A style code present in the vocabulary's code table resolves to the
/// canonical name. Otherwise the label is `STYLE - KIND` when both are
/// present, the one that is present, or `UNKNOWN` when both are absent.
pub fn derive_bowling_type(vocab: &BowlingVocabulary, style_raw: &str, kind_raw: &str) -> String {
    let style = normalize_code(style_raw);
    let kind = normalize_code(kind_raw);
    let style = (!is_missing(&style)).then_some(style);
    let kind = (!is_missing(&kind)).then_some(kind);

    match (style, kind) {
        (Some(style), kind) => {
            if let Some(name) = vocab.canonical_for_code(&style) {
                return name.to_string();
            }
            match kind {
                Some(kind) => format!("{style} - {kind}"),
                None => style,
            }
        }
        (None, Some(kind)) => vocab
            .canonical_for_code(&kind)
            .map(str::to_string)
            .unwrap_or(kind),
        (None, None) => UNKNOWN_TYPE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_code_resolves_to_canonical_name() {
        let vocab = default_vocabulary();
        assert_eq!(derive_bowling_type(vocab, "RF", "PACE"), "Right Arm Fast");
        assert_eq!(derive_bowling_type(vocab, "SLA", ""), "Left Arm Orthodox");
    }

    #[test]
    fn label_is_stable_under_case_and_whitespace() {
        let vocab = default_vocabulary();
        let a = derive_bowling_type(vocab, "  xf ", " pace ");
        let b = derive_bowling_type(vocab, "XF", "PACE");
        assert_eq!(a, b);
        assert_eq!(a, "XF - PACE");
    }

    #[test]
    fn missing_codes_fall_back() {
        let vocab = default_vocabulary();
        assert_eq!(derive_bowling_type(vocab, "NaN", "spin"), "SPIN");
        assert_eq!(derive_bowling_type(vocab, "XF", "nan"), "XF");
        assert_eq!(derive_bowling_type(vocab, "", "  "), UNKNOWN_TYPE);
    }
}
