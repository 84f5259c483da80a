//! Large-payload detection for text fragments.
//!
//! Browser runtimes return screenshots as base64 text, sometimes wrapped in a
//! data URI and sometimes bare. [`ClassifierConfig::classify`] decides, from
//! the text alone, whether a fragment is such a payload. It is pure and
//! cheap: short fragments are rejected on byte length before any character
//! is inspected.
//!
//! A false negative only costs context (the truncation stage still bounds
//! the fragment); a false positive replaces real text with a placeholder.
//! The thresholds are tuned so that ordinary prose and page dumps stay
//! negative.

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Headers that identify an embedded image: a data URI, base64 PNG, or
/// base64 JPEG.
pub const PAYLOAD_PREFIXES: &[&str] = &["data:image", "iVBOR", "/9j/"];

/// Why a fragment was classified as a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMatch {
    /// Starts with one of [`PAYLOAD_PREFIXES`].
    Header,
    /// Long, and its leading sample is almost entirely base64 alphabet.
    Density,
}

/// Classifier thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Fragments shorter than this (in characters) are never payloads.
    pub min_length: usize,
    /// Required base64-alphabet ratio in the sample for the density rule.
    pub density_ratio: f64,
    /// The density rule only applies to fragments longer than this.
    pub density_min_length: usize,
    /// Number of leading characters sampled for the density rule.
    pub sample_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_length: 10_000,
            density_ratio: 0.95,
            density_min_length: 50_000,
            sample_chars: 1_000,
        }
    }
}

impl ClassifierConfig {
    /// Classify a text fragment. `None` means "leave it alone".
    pub fn classify(&self, fragment: &str) -> Option<PayloadMatch> {
        // Byte length bounds char length from above.
        if fragment.len() < self.min_length {
            return None;
        }
        let chars = fragment.chars().count();
        if chars < self.min_length {
            return None;
        }

        if PAYLOAD_PREFIXES.iter().any(|p| fragment.starts_with(p)) {
            trace!("payload classified by header ({chars} chars)");
            return Some(PayloadMatch::Header);
        }

        if chars > self.density_min_length {
            let ratio = base64_ratio(fragment, self.sample_chars);
            if ratio > self.density_ratio {
                trace!("payload classified by density ({chars} chars, ratio {ratio:.3})");
                return Some(PayloadMatch::Density);
            }
        }

        None
    }

    /// Whether `fragment` is a large embedded binary payload.
    pub fn is_payload(&self, fragment: &str) -> bool {
        self.classify(fragment).is_some()
    }
}

/// Fraction of the first `sample_chars` characters (line breaks dropped)
/// that are alphanumeric or `+`, `/`, `=`. An empty sample scores 0.
fn base64_ratio(fragment: &str, sample_chars: usize) -> f64 {
    let mut total = 0usize;
    let mut matching = 0usize;
    for c in fragment
        .chars()
        .take(sample_chars)
        .filter(|c| *c != '\n' && *c != '\r')
    {
        total += 1;
        if c.is_alphanumeric() || matches!(c, '+' | '/' | '=') {
            matching += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        matching as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ClassifierConfig {
        ClassifierConfig::default()
    }

    #[test]
    fn short_fragments_are_never_payloads() {
        let c = classifier();
        assert!(!c.is_payload(""));
        assert!(!c.is_payload("data:image/png;base64,AAAA"));
        assert!(!c.is_payload(&"A".repeat(9_999)));
        assert!(!c.is_payload(&format!("iVBOR{}", "A".repeat(9_990))));
    }

    #[test]
    fn header_prefixes_are_payloads() {
        let c = classifier();
        let body = "A".repeat(10_000);
        for prefix in PAYLOAD_PREFIXES {
            let fragment = format!("{prefix}{body}");
            assert_eq!(c.classify(&fragment), Some(PayloadMatch::Header), "{prefix}");
        }
    }

    #[test]
    fn dense_base64_without_header_is_payload() {
        let c = classifier();
        let fragment = "QUJD".repeat(15_000);
        assert_eq!(c.classify(&fragment), Some(PayloadMatch::Density));
    }

    #[test]
    fn density_rule_needs_length() {
        let c = classifier();
        // Dense but only 40k chars, and no recognized header.
        assert!(!c.is_payload(&"QUJD".repeat(10_000)));
    }

    #[test]
    fn line_breaks_do_not_count_against_density() {
        let c = classifier();
        let line = format!("{}\r\n", "QUJD".repeat(19));
        let fragment = line.repeat(1_000);
        assert!(fragment.chars().count() > 50_000);
        assert!(c.is_payload(&fragment));
    }

    #[test]
    fn long_prose_is_not_a_payload() {
        let c = classifier();
        let fragment = "The quick brown fox jumps over the lazy dog. ".repeat(2_000);
        assert!(!c.is_payload(&fragment));
    }

    #[test]
    fn length_is_measured_in_characters() {
        let c = ClassifierConfig {
            min_length: 10,
            ..classifier()
        };
        // 9 chars, 14 bytes.
        assert!(!c.is_payload("/9j/ééééé"));
        assert!(c.is_payload("/9j/éééééé"));
    }

    #[test]
    fn empty_sample_scores_zero() {
        assert_eq!(base64_ratio("\n\r\n", 10), 0.0);
        assert_eq!(base64_ratio("ab+/=!", 6), 5.0 / 6.0);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let c: ClassifierConfig = serde_json::from_str(r#"{"min_length": 500}"#).unwrap();
        assert_eq!(c.min_length, 500);
        assert_eq!(c.density_min_length, 50_000);
    }
}
