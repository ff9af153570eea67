//! Result synthesis: external judge first, deterministic local scoring
//! when the judge is absent, fails, or there is nothing to judge.

use std::fmt::Write as _;

use tracing::{info, warn};

use agora_core::{DebateResult, EndReason, Side, SpeechMessage, TranscriptEntry, Winner};
use agora_judge::{Judge, JudgeError, JudgeRequest};
use agora_telemetry::metrics::JUDGE_CALLS_TOTAL;

use crate::config::EngineConfig;

/// Everything the synthesizer needs, copied out of the session.
#[derive(Clone, Debug)]
pub struct ResultInput {
    pub topic: String,
    pub supporting: Option<String>,
    pub opposing: Option<String>,
    pub transcript: Vec<TranscriptEntry>,
    pub reason: EndReason,
}

impl ResultInput {
    fn count(&self, side: Side) -> u32 {
        let n = self.transcript.iter().filter(|e| e.side == side).count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    fn name(&self, side: Side) -> &str {
        let id = match side {
            Side::Supporting => self.supporting.as_deref(),
            Side::Opposing => self.opposing.as_deref(),
        };
        id.unwrap_or("not connected")
    }
}

/// Produce the result for a terminal session. Never fails.
pub async fn synthesize(
    judge: Option<&dyn Judge>,
    input: &ResultInput,
    config: &EngineConfig,
) -> DebateResult {
    let both_spoke = input.count(Side::Supporting) > 0 && input.count(Side::Opposing) > 0;
    let (Some(judge), true, Some(supporting), Some(opposing)) = (
        judge,
        both_spoke,
        input.supporting.as_ref(),
        input.opposing.as_ref(),
    ) else {
        return fallback_result(input, config);
    };

    let request = JudgeRequest {
        topic: input.topic.clone(),
        supporting: supporting.clone(),
        opposing: opposing.clone(),
        transcript: input.transcript.clone(),
    };

    let outcome = match tokio::time::timeout(config.judge_timeout, judge.judge(&request)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(JudgeError::Timeout),
    };

    match outcome {
        Ok(verdict) => {
            metrics::counter!(JUDGE_CALLS_TOTAL, "outcome" => "ok").increment(1);
            info!(judge = judge.name(), winner = %verdict.winner, "judge verdict received");
            DebateResult {
                winner: verdict.winner,
                supporting_score: verdict.supporting_score,
                opposing_score: verdict.opposing_score,
                summary: SpeechMessage::markdown(verdict.summary),
                reason: input.reason.code(),
            }
        }
        Err(error) => {
            metrics::counter!(JUDGE_CALLS_TOTAL, "outcome" => error.error_kind()).increment(1);
            warn!(judge = judge.name(), %error, "judge failed, using local scoring");
            fallback_result(input, config)
        }
    }
}

/// Local scoring: 45 + 2 per speech, capped at 50, normalised to 100.
///
/// Returns `(supporting, opposing, winner)`. A side that never spoke makes
/// the winner `None`; otherwise a margin above 5 decides, else `Draw`.
pub fn fallback_scores(supporting_speeches: u32, opposing_speeches: u32) -> (u32, u32, Winner) {
    let raw = |n: u32| (45 + n.saturating_mul(2)).min(50);
    let (s, o) = (raw(supporting_speeches), raw(opposing_speeches));
    let supporting = s * 100 / (s + o);
    let opposing = 100 - supporting;

    let winner = if supporting_speeches == 0 || opposing_speeches == 0 {
        Winner::None
    } else if supporting > opposing + 5 {
        Winner::Supporting
    } else if opposing > supporting + 5 {
        Winner::Opposing
    } else {
        Winner::Draw
    };
    (supporting, opposing, winner)
}

pub fn fallback_result(input: &ResultInput, config: &EngineConfig) -> DebateResult {
    let (s_count, o_count) = (input.count(Side::Supporting), input.count(Side::Opposing));
    let (supporting_score, opposing_score, winner) = fallback_scores(s_count, o_count);
    let description = reason_description(&input.reason, config);

    let summary = match (s_count, o_count) {
        (0, 0) => silent_summary(input, &description),
        (0, _) | (_, 0) => one_sided_summary(input, s_count, o_count, &description),
        _ => scored_summary(input, (s_count, o_count), (supporting_score, opposing_score), winner, &description),
    };

    DebateResult {
        winner,
        supporting_score,
        opposing_score,
        summary: SpeechMessage::markdown(summary),
        reason: input.reason.code(),
    }
}

/// Human-readable end reason.
pub fn reason_description(reason: &EndReason, config: &EngineConfig) -> String {
    use agora_core::DisconnectCause;

    match reason {
        EndReason::Completed => "Debate completed normally".into(),
        EndReason::SpeechTimeout => format!(
            "Speech timeout (no speech within {} seconds)",
            config.speech_timeout.as_secs()
        ),
        EndReason::InactivityTimeout => format!(
            "No activity for more than {} seconds",
            config.inactivity_timeout.as_secs()
        ),
        EndReason::MaxDurationTimeout => format!(
            "Debate exceeded the maximum duration of {} seconds",
            config.max_duration.as_secs()
        ),
        EndReason::ServerRestart => "Server restarted while the debate was in progress".into(),
        EndReason::Disconnected {
            identifier,
            cause: DisconnectCause::ConnectionLost,
        } => format!("Participant {identifier} disconnected"),
        EndReason::Disconnected {
            identifier,
            cause: DisconnectCause::HeartbeatTimeout,
        } => format!(
            "Participant {identifier} missed {} consecutive heartbeats",
            config.heartbeat_miss_threshold
        ),
    }
}

fn header(out: &mut String, title: &str, topic: &str) {
    let _ = writeln!(out, "## {title}\n");
    let _ = writeln!(out, "**Topic**: {topic}\n");
}

fn silent_summary(input: &ResultInput, description: &str) -> String {
    let mut out = String::new();
    header(&mut out, "Debate Ended Without Speeches", &input.topic);
    for side in [Side::Supporting, Side::Opposing] {
        let _ = writeln!(out, "### {}: {}\n", side.label(), input.name(side));
        let _ = writeln!(out, "- Did not speak\n");
    }
    let _ = writeln!(out, "### Result\n");
    let _ = writeln!(out, "Neither side delivered a speech, so no winner can be named.\n");
    let _ = writeln!(out, "**End reason**: {description}");
    out
}

fn one_sided_summary(input: &ResultInput, s_count: u32, o_count: u32, description: &str) -> String {
    let mut out = String::new();
    header(&mut out, "Debate Ended Early", &input.topic);
    for (side, count) in [(Side::Supporting, s_count), (Side::Opposing, o_count)] {
        let _ = writeln!(out, "### {}: {}\n", side.label(), input.name(side));
        if count == 0 {
            let _ = writeln!(out, "- Did not speak\n");
        } else {
            let _ = writeln!(out, "- Speeches: {count}\n");
        }
    }
    let _ = writeln!(out, "### Result\n");
    let _ = writeln!(
        out,
        "Only one side spoke before the debate ended, so the exchange cannot be assessed.\n"
    );
    let _ = writeln!(out, "**End reason**: {description}");
    out
}

fn scored_summary(
    input: &ResultInput,
    counts: (u32, u32),
    scores: (u32, u32),
    winner: Winner,
    description: &str,
) -> String {
    let mut out = String::new();
    header(&mut out, "Debate Summary", &input.topic);
    for (side, count, score) in [
        (Side::Supporting, counts.0, scores.0),
        (Side::Opposing, counts.1, scores.1),
    ] {
        let _ = writeln!(out, "### {}: {}\n", side.label(), input.name(side));
        let _ = writeln!(out, "- Speeches: {count}");
        let _ = writeln!(out, "- Score: {score}\n");
    }
    let verdict = match winner {
        Winner::Supporting => format!("{} wins", input.name(Side::Supporting)),
        Winner::Opposing => format!("{} wins", input.name(Side::Opposing)),
        Winner::Draw | Winner::None => "Draw".to_string(),
    };
    let _ = writeln!(out, "### Result\n");
    let _ = writeln!(out, "**Winner**: {verdict}\n");
    let _ = writeln!(out, "**End reason**: {description}\n");
    let _ = writeln!(
        out,
        "_Scored by participation because the automated judge was unavailable._"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::DisconnectCause;
    use agora_judge::{MockJudge, MockOutcome};
    use std::time::Duration;

    fn entry(round: u32, side: Side) -> TranscriptEntry {
        let speaker = match side {
            Side::Supporting => "alpha-1234abcd",
            Side::Opposing => "beta-1234abcd",
        };
        TranscriptEntry {
            round,
            speaker: speaker.into(),
            side,
            timestamp: "2026-01-01T00:00:00Z".into(),
            message: SpeechMessage::markdown("argument ".repeat(10)),
        }
    }

    fn input(transcript: Vec<TranscriptEntry>, reason: EndReason) -> ResultInput {
        ResultInput {
            topic: "Tabs or spaces".into(),
            supporting: Some("alpha-1234abcd".into()),
            opposing: Some("beta-1234abcd".into()),
            transcript,
            reason,
        }
    }

    #[test]
    fn scores_cap_and_normalise() {
        assert_eq!(fallback_scores(1, 1), (50, 50, Winner::Draw));
        // 47 vs 50 normalises to 48/52, inside the draw margin
        assert_eq!(fallback_scores(1, 3), (48, 52, Winner::Draw));
        assert_eq!(fallback_scores(0, 2), (47, 53, Winner::None));
        assert_eq!(fallback_scores(0, 0), (50, 50, Winner::None));
        let (s, o, _) = fallback_scores(100, 1);
        assert_eq!(s + o, 100);
    }

    #[test]
    fn silent_timeout_summary() {
        let result = fallback_result(
            &input(vec![], EndReason::SpeechTimeout),
            &EngineConfig::default(),
        );
        assert_eq!(result.winner, Winner::None);
        assert_eq!(result.reason, "speech_timeout");
        assert!(result.summary.content.contains("Did not speak"));
        assert!(result
            .summary
            .content
            .contains("Speech timeout (no speech within 120 seconds)"));
    }

    #[test]
    fn one_sided_summary_counts_speaker() {
        let result = fallback_result(
            &input(vec![entry(1, Side::Supporting)], EndReason::SpeechTimeout),
            &EngineConfig::default(),
        );
        assert_eq!(result.winner, Winner::None);
        assert!(result.summary.content.contains("Speeches: 1"));
        assert!(result.summary.content.contains("Only one side spoke"));
    }

    #[test]
    fn missing_identifier_renders_not_connected() {
        let mut data = input(vec![], EndReason::ServerRestart);
        data.opposing = None;
        let result = fallback_result(&data, &EngineConfig::default());
        assert!(result.summary.content.contains("Opposing: not connected"));
    }

    #[test]
    fn reason_descriptions() {
        let config = EngineConfig::default();
        let lost = EndReason::Disconnected {
            identifier: "beta-1234abcd".into(),
            cause: DisconnectCause::ConnectionLost,
        };
        assert_eq!(reason_description(&lost, &config), "Participant beta-1234abcd disconnected");
        let hb = EndReason::Disconnected {
            identifier: "beta-1234abcd".into(),
            cause: DisconnectCause::HeartbeatTimeout,
        };
        assert_eq!(
            reason_description(&hb, &config),
            "Participant beta-1234abcd missed 3 consecutive heartbeats"
        );
        assert_eq!(
            reason_description(&EndReason::MaxDurationTimeout, &config),
            "Debate exceeded the maximum duration of 3600 seconds"
        );
    }

    #[tokio::test]
    async fn judge_verdict_is_used() {
        let judge = MockJudge::new(vec![MockOutcome::verdict(Winner::Opposing, 40, 60, "Beta argued better")]);
        let data = input(
            vec![entry(1, Side::Supporting), entry(1, Side::Opposing)],
            EndReason::Completed,
        );
        let result = synthesize(Some(&judge as &dyn Judge), &data, &EngineConfig::default()).await;
        assert_eq!(result.winner, Winner::Opposing);
        assert_eq!((result.supporting_score, result.opposing_score), (40, 60));
        assert_eq!(result.summary.content, "Beta argued better");
        assert_eq!(result.reason, "completed");
        let request = judge.last_request().unwrap();
        assert_eq!(request.supporting, "alpha-1234abcd");
        assert_eq!(request.transcript.len(), 2);
    }

    #[tokio::test]
    async fn judge_skipped_when_a_side_is_silent() {
        let judge = MockJudge::new(vec![]);
        let data = input(vec![entry(1, Side::Supporting)], EndReason::SpeechTimeout);
        let result = synthesize(Some(&judge as &dyn Judge), &data, &EngineConfig::default()).await;
        assert_eq!(judge.call_count(), 0);
        assert_eq!(result.winner, Winner::None);
    }

    #[tokio::test]
    async fn judge_error_falls_back() {
        let judge = MockJudge::new(vec![MockOutcome::Error(JudgeError::EmptyResponse)]);
        let data = input(
            vec![entry(1, Side::Supporting), entry(1, Side::Opposing)],
            EndReason::Completed,
        );
        let result = synthesize(Some(&judge as &dyn Judge), &data, &EngineConfig::default()).await;
        assert_eq!(judge.call_count(), 1);
        assert_eq!(result.winner, Winner::Draw);
        assert!(result.summary.content.contains("automated judge was unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_judge_times_out() {
        let judge = MockJudge::new(vec![MockOutcome::delayed(
            Duration::from_secs(600),
            MockOutcome::verdict(Winner::Supporting, 90, 10, "late"),
        )]);
        let data = input(
            vec![entry(1, Side::Supporting), entry(1, Side::Opposing)],
            EndReason::Completed,
        );
        let result = synthesize(Some(&judge as &dyn Judge), &data, &EngineConfig::default()).await;
        assert_eq!(result.winner, Winner::Draw);
        assert_eq!((result.supporting_score, result.opposing_score), (50, 50));
    }
}
