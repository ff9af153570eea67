//! Extraction and validation of verdicts from free-form model replies.

use serde::Deserialize;

use agora_core::Winner;

use crate::error::JudgeError;
use crate::judge::JudgeVerdict;

const NEUTRAL_SCORE: u32 = 50;

#[derive(Deserialize)]
struct RawVerdict {
    #[serde(default)]
    winner: String,
    #[serde(default)]
    supporting_score: Option<i64>,
    #[serde(default)]
    opposing_score: Option<i64>,
    #[serde(default)]
    summary: String,
}

/// The substring from the first `{` to the last `}`, if any.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a reply into a verdict, clamping out-of-range values to neutral.
pub fn parse_verdict(text: &str) -> Result<JudgeVerdict, JudgeError> {
    let json = extract_json(text)
        .ok_or_else(|| JudgeError::MalformedResponse("no JSON object in reply".into()))?;
    let raw: RawVerdict = serde_json::from_str(json)
        .map_err(|e| JudgeError::MalformedResponse(format!("invalid verdict JSON: {e}")))?;

    let winner = match raw.winner.as_str() {
        "supporting" => Winner::Supporting,
        "opposing" => Winner::Opposing,
        _ => Winner::Draw,
    };

    Ok(JudgeVerdict {
        winner,
        supporting_score: bounded_score(raw.supporting_score),
        opposing_score: bounded_score(raw.opposing_score),
        summary: raw.summary,
    })
}

fn bounded_score(raw: Option<i64>) -> u32 {
    raw.and_then(|s| u32::try_from(s).ok())
        .filter(|s| *s <= 100)
        .unwrap_or(NEUTRAL_SCORE)
}
