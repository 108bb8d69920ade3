//! Extraction of the JSON payload embedded in the upstream free-text response.
//!
//! The webhook wraps its machine-readable answer in prose, usually inside a
//! ```json fenced block, sometimes as a bare bracketed array, occasionally as
//! bare JSON with no decoration at all. This module only locates the candidate
//! substring; parsing stays with the caller so that parse errors remain
//! distinguishable from extraction errors.

/// A trimmed payload must be longer than this to be considered non-empty.
pub const MIN_PAYLOAD_CHARS: usize = 10;

const FENCE_OPEN: &str = "```json\n";
const FENCE_CLOSE: &str = "\n```";

/// Which strategy produced the candidate substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Between the first ```json fence and the last closing fence.
    Fenced,
    /// From the first `[` to the last `]`, inclusive.
    BracketSpan,
    /// The whole trimmed input, for bare-JSON responses.
    Bare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub candidate: String,
    pub strategy: ExtractionStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionFailure {
    /// Missing or too-short payload, rejected before any parsing.
    EmptyBody,
}

/// Pull the JSON candidate out of the raw `output` text.
///
/// Fence pairing is first-open/last-close: when the text contains more than
/// one fenced block, everything between the first opening fence and the last
/// closing fence is taken as one candidate, which can mis-extract. Known
/// limitation; the upstream agent emits a single block.
pub fn extract(raw: &str) -> Result<Extraction, ExtractionFailure> {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= MIN_PAYLOAD_CHARS {
        return Err(ExtractionFailure::EmptyBody);
    }

    if let (Some(open), Some(close)) = (raw.find(FENCE_OPEN), raw.rfind(FENCE_CLOSE)) {
        let body_start = open + FENCE_OPEN.len();
        if close >= body_start {
            return Ok(Extraction {
                candidate: raw[body_start..close].to_string(),
                strategy: ExtractionStrategy::Fenced,
            });
        }
    }

    // No usable fence; array payloads often arrive bare.
    if let (Some(open), Some(close)) = (raw.find('['), raw.rfind(']')) {
        if close > open {
            return Ok(Extraction {
                candidate: raw[open..=close].to_string(),
                strategy: ExtractionStrategy::BracketSpan,
            });
        }
    }

    Ok(Extraction {
        candidate: trimmed.to_string(),
        strategy: ExtractionStrategy::Bare,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_is_extracted_exactly() {
        let raw = "Here is the plan you asked for.\n```json\n[{\"name\": \"vip\"}]\n```\nLet me know!";
        let extraction = extract(raw).unwrap();
        assert_eq!(extraction.strategy, ExtractionStrategy::Fenced);
        assert_eq!(extraction.candidate, "[{\"name\": \"vip\"}]");
    }

    #[test]
    fn surrounding_prose_does_not_leak_into_candidate() {
        let raw = format!(
            "Analysis complete. {}{}{} Anything else?",
            FENCE_OPEN, "{\"conversion_rate\": 0.4}", FENCE_CLOSE
        );
        let extraction = extract(&raw).unwrap();
        assert_eq!(extraction.candidate, "{\"conversion_rate\": 0.4}");
    }

    #[test]
    fn short_input_is_empty_body_before_any_parse() {
        for raw in ["", "   ", "\n\n", "{\"a\":1}", "  [1,2]   "] {
            assert_eq!(extract(raw), Err(ExtractionFailure::EmptyBody), "input: {raw:?}");
        }
    }

    #[test]
    fn eleven_chars_pass_the_empty_check() {
        let extraction = extract("[1,2,3,4,5]").unwrap();
        assert_eq!(extraction.strategy, ExtractionStrategy::BracketSpan);
        assert_eq!(extraction.candidate, "[1,2,3,4,5]");
    }

    #[test]
    fn bracket_fallback_spans_first_to_last() {
        let raw = "Channels below: [{\"name\": \"email\"}, {\"name\": \"push\"}] -- end";
        let extraction = extract(raw).unwrap();
        assert_eq!(extraction.strategy, ExtractionStrategy::BracketSpan);
        assert_eq!(
            extraction.candidate,
            "[{\"name\": \"email\"}, {\"name\": \"push\"}]"
        );
    }

    #[test]
    fn bare_json_object_is_passed_through_trimmed() {
        let raw = "  {\"conversion_rate\": {\"target\": {\"avg\": 0.5}}}  ";
        let extraction = extract(raw).unwrap();
        assert_eq!(extraction.strategy, ExtractionStrategy::Bare);
        assert_eq!(
            extraction.candidate,
            "{\"conversion_rate\": {\"target\": {\"avg\": 0.5}}}"
        );
    }

    #[test]
    fn multiple_fences_pair_first_open_with_last_close() {
        let raw = "```json\n[1]\n```\nand also\n```json\n[2]\n```";
        let extraction = extract(raw).unwrap();
        assert_eq!(extraction.strategy, ExtractionStrategy::Fenced);
        // First-open/last-close pairing swallows the prose between blocks.
        assert_eq!(extraction.candidate, "[1]\n```\nand also\n```json\n[2]");
    }

    #[test]
    fn serializer_round_trip_through_fences() {
        let original = serde_json::json!([
            {"name": "high-value", "description": "repeat buyers", "lables": ["vip"]},
            {"name": "dormant", "description": "no orders in 90 days", "lables": []}
        ]);
        let raw = format!("{}{}{}", FENCE_OPEN, serde_json::to_string(&original).unwrap(), FENCE_CLOSE);
        let extraction = extract(&raw).unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(&extraction.candidate).unwrap();
        assert_eq!(reparsed, original);
    }
}
