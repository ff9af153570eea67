//! Turn discipline: who may speak, and what an accepted speech does to
//! the round counter.

use agora_core::protocol::DebateSpeech;
use agora_core::{ClientError, ErrorCode, SessionStatus, Side};

use crate::config::EngineConfig;
use crate::session::SessionState;

/// What happens after a speech has been appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TurnOutcome {
    /// Another speech is expected from `next`.
    Continue { next: Side },
    /// The final round just closed.
    Completed,
}

/// Check a submission against the session. Returns the speaker's side.
///
/// Checks run in a fixed order: session state, credentials, turn, length.
pub(crate) fn validate_speech(
    state: &SessionState,
    speech: &DebateSpeech,
    config: &EngineConfig,
) -> Result<Side, ClientError> {
    if state.status != SessionStatus::Active || state.finalizing {
        return Err(ClientError::new(
            ErrorCode::DebateNotActive,
            format!("Debate is not active (status: {})", state.status),
        ));
    }

    let side = state
        .participant(&speech.speaker)
        .filter(|p| p.key == speech.debate_key)
        .and_then(|p| p.side)
        .ok_or_else(|| ClientError::new(ErrorCode::InvalidDebateKey, "Invalid debate key"))?;

    if side != state.next_side() {
        return Err(ClientError::new(
            ErrorCode::NotYourTurn,
            "It's not your turn to speak",
        ));
    }

    let length = speech.message.content.trim().chars().count();
    if length < config.min_content_length {
        return Err(ClientError::new(
            ErrorCode::ContentTooShort,
            format!(
                "Speech content too short (minimum {} characters)",
                config.min_content_length
            ),
        ));
    }
    if length > config.max_content_length {
        return Err(ClientError::new(
            ErrorCode::ContentTooLong,
            format!(
                "Speech content too long (maximum {} characters)",
                config.max_content_length
            ),
        ));
    }

    Ok(side)
}

/// Record that `side` spoke. An opposing speech closes the round.
pub(crate) fn advance(state: &mut SessionState, side: Side) -> TurnOutcome {
    state.last_speaker = Some(side);
    if side == Side::Opposing {
        state.current_round += 1;
        if state.current_round > state.total_rounds {
            return TurnOutcome::Completed;
        }
    }
    TurnOutcome::Continue { next: side.opposite() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::active_state;
    use agora_core::SpeechMessage;
    use assert_matches::assert_matches;

    fn speech(speaker: &str, key: &str, content: &str) -> DebateSpeech {
        DebateSpeech {
            debate_id: "d".into(),
            debate_key: key.into(),
            speaker: speaker.into(),
            message: SpeechMessage::markdown(content),
        }
    }

    fn long_text() -> String {
        "x".repeat(60)
    }

    #[test]
    fn accepts_expected_speaker() {
        let state = active_state(2);
        let side = validate_speech(
            &state,
            &speech("alpha-1234abcd", "key-alpha", &long_text()),
            &EngineConfig::default(),
        );
        assert_eq!(side, Ok(Side::Supporting));
    }

    #[test]
    fn rejects_wrong_key_before_turn() {
        let state = active_state(2);
        let err = validate_speech(
            &state,
            &speech("beta-1234abcd", "key-alpha", &long_text()),
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDebateKey);
        assert!(!err.recoverable);
    }

    #[test]
    fn rejects_unknown_speaker() {
        let state = active_state(2);
        let err = validate_speech(
            &state,
            &speech("gamma-00000000", "key-alpha", &long_text()),
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDebateKey);
    }

    #[test]
    fn rejects_out_of_turn() {
        let state = active_state(2);
        let err = validate_speech(
            &state,
            &speech("beta-1234abcd", "key-beta", &long_text()),
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotYourTurn);
        assert_eq!(err.message, "It's not your turn to speak");
        assert!(err.recoverable);
    }

    #[test]
    fn length_bounds_use_trimmed_characters() {
        let config = EngineConfig::default();
        let state = active_state(2);

        let padded = format!("   {}   ", "x".repeat(49));
        let err = validate_speech(&state, &speech("alpha-1234abcd", "key-alpha", &padded), &config)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ContentTooShort);
        assert_eq!(err.message, "Speech content too short (minimum 50 characters)");

        // multi-byte characters count once each
        let fifty = "é".repeat(50);
        assert!(validate_speech(&state, &speech("alpha-1234abcd", "key-alpha", &fifty), &config).is_ok());

        let long = "x".repeat(2001);
        let err = validate_speech(&state, &speech("alpha-1234abcd", "key-alpha", &long), &config)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ContentTooLong);
        assert!(err.recoverable);
    }

    #[test]
    fn rejects_when_not_active() {
        let mut state = active_state(2);
        state.status = SessionStatus::Completed;
        let err = validate_speech(
            &state,
            &speech("alpha-1234abcd", "key-alpha", &long_text()),
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::DebateNotActive);
    }

    #[test]
    fn rounds_advance_on_opposing_speech() {
        let mut state = active_state(2);
        assert_matches!(advance(&mut state, Side::Supporting), TurnOutcome::Continue { next: Side::Opposing });
        assert_eq!(state.current_round, 1);
        assert_matches!(advance(&mut state, Side::Opposing), TurnOutcome::Continue { next: Side::Supporting });
        assert_eq!(state.current_round, 2);
        assert_matches!(advance(&mut state, Side::Supporting), TurnOutcome::Continue { .. });
        assert_eq!(advance(&mut state, Side::Opposing), TurnOutcome::Completed);
        assert_eq!(state.current_round, 3);
    }
}
