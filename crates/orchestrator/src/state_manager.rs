//! QCM State Manager (C9): pure-function conversational parameter
//! collection. The server replays a conversation's message history
//! through [`advance`] on every turn rather than holding state across
//! requests — there is no session map here.

use ragsvc_config::constants::qcm::{MAX_COUNT, MIN_COUNT};
use ragsvc_core::domain::{Difficulty, QcmConversationState};

const AFFIRMATIVE_WORDS: &[&str] = &["oui", "yes", "ok", "okay", "go", "yep", "yeah", "d'accord"];
const NEGATIVE_WORDS: &[&str] = &["non", "no", "nope", "cancel"];

/// Classification of a user's reply to a `confirm` prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIntent {
    Affirmative,
    Negative,
    Unrecognized,
}

fn classify_confirmation(input: &str) -> UserIntent {
    let normalized = input.trim().to_lowercase();
    if AFFIRMATIVE_WORDS.iter().any(|w| normalized == *w) {
        UserIntent::Affirmative
    } else if NEGATIVE_WORDS.iter().any(|w| normalized == *w) {
        UserIntent::Negative
    } else {
        UserIntent::Unrecognized
    }
}

/// Advances `state` given the next raw user message. Malformed input
/// leaves the state unchanged so the caller can re-prompt.
pub fn advance(state: &QcmConversationState, user_input: &str) -> QcmConversationState {
    let trimmed = user_input.trim();

    match state {
        QcmConversationState::AskTopic => {
            if trimmed.is_empty() {
                state.clone()
            } else {
                QcmConversationState::AskDifficulty {
                    topic: trimmed.to_string(),
                }
            }
        }

        QcmConversationState::AskDifficulty { topic } => match trimmed.parse::<Difficulty>() {
            Ok(difficulty) => QcmConversationState::AskCount {
                topic: topic.clone(),
                difficulty,
            },
            Err(()) => state.clone(),
        },

        QcmConversationState::AskCount { topic, difficulty } => match trimmed.parse::<usize>() {
            Ok(count) if (MIN_COUNT..=MAX_COUNT).contains(&count) => {
                QcmConversationState::Confirm {
                    topic: topic.clone(),
                    difficulty: *difficulty,
                    count,
                }
            }
            _ => state.clone(),
        },

        QcmConversationState::Confirm {
            topic,
            difficulty,
            count,
        } => match classify_confirmation(trimmed) {
            UserIntent::Affirmative => QcmConversationState::Running {
                topic: topic.clone(),
                difficulty: *difficulty,
                count: *count,
            },
            UserIntent::Negative => QcmConversationState::AskTopic,
            UserIntent::Unrecognized => state.clone(),
        },

        // Terminal states (or mid-generation) don't accept further
        // conversational input; the caller drives them directly.
        QcmConversationState::Running { .. } | QcmConversationState::Done { .. } => state.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_happy_path() {
        let s = QcmConversationState::AskTopic;
        let s = advance(&s, "Photosynthesis");
        assert_eq!(
            s,
            QcmConversationState::AskDifficulty {
                topic: "Photosynthesis".to_string()
            }
        );

        let s = advance(&s, "medium");
        assert_eq!(
            s,
            QcmConversationState::AskCount {
                topic: "Photosynthesis".to_string(),
                difficulty: Difficulty::Medium,
            }
        );

        let s = advance(&s, "10");
        assert_eq!(
            s,
            QcmConversationState::Confirm {
                topic: "Photosynthesis".to_string(),
                difficulty: Difficulty::Medium,
                count: 10,
            }
        );

        let s = advance(&s, "oui");
        assert_eq!(
            s,
            QcmConversationState::Running {
                topic: "Photosynthesis".to_string(),
                difficulty: Difficulty::Medium,
                count: 10,
            }
        );
    }

    #[test]
    fn malformed_difficulty_reprompts_same_state() {
        let s = QcmConversationState::AskDifficulty {
            topic: "X".to_string(),
        };
        let next = advance(&s, "extreme");
        assert_eq!(next, s);
    }

    #[test]
    fn count_out_of_range_reprompts_same_state() {
        let s = QcmConversationState::AskCount {
            topic: "X".to_string(),
            difficulty: Difficulty::Easy,
        };
        assert_eq!(advance(&s, "0"), s);
        assert_eq!(advance(&s, "51"), s);
        assert_eq!(advance(&s, "not a number"), s);
    }

    #[test]
    fn negative_confirmation_restarts_at_ask_topic() {
        let s = QcmConversationState::Confirm {
            topic: "X".to_string(),
            difficulty: Difficulty::Hard,
            count: 5,
        };
        assert_eq!(advance(&s, "non"), QcmConversationState::AskTopic);
    }

    #[test]
    fn unrecognized_confirmation_reprompts() {
        let s = QcmConversationState::Confirm {
            topic: "X".to_string(),
            difficulty: Difficulty::Hard,
            count: 5,
        };
        assert_eq!(advance(&s, "maybe"), s);
    }
}
