// Per-step execution state machine.
use serde::{Deserialize, Serialize};

/// Lifecycle of a single step during a run.
///
/// `Pending → Attempting → Success`, or on a miss `Retrying → Attempting`
/// until `max_retries` attempts are spent, then `Recovering → Attempting`
/// once more with `recovery` set, then `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Attempting { attempt: u32, recovery: bool },
    Retrying { attempt: u32 },
    Recovering { attempt: u32 },
    Success { attempts: u32 },
    Failed { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// Begin the next attempt.
    Start,
    Succeeded,
    Missed,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Success { .. } | StepState::Failed { .. })
    }

    /// Pure transition function. Events that make no sense in a state leave it unchanged.
    pub fn transition(self, event: StepEvent, max_retries: u32) -> StepState {
        let max_retries = max_retries.max(1);
        match (self, event) {
            (StepState::Pending, StepEvent::Start) => StepState::Attempting {
                attempt: 1,
                recovery: false,
            },
            (StepState::Attempting { attempt, .. }, StepEvent::Succeeded) => {
                StepState::Success { attempts: attempt }
            }
            (StepState::Attempting { attempt, recovery: true }, StepEvent::Missed) => {
                StepState::Failed { attempts: attempt }
            }
            (StepState::Attempting { attempt, recovery: false }, StepEvent::Missed) => {
                if attempt < max_retries {
                    StepState::Retrying { attempt }
                } else {
                    StepState::Recovering { attempt }
                }
            }
            (StepState::Retrying { attempt }, StepEvent::Start) => StepState::Attempting {
                attempt: attempt + 1,
                recovery: false,
            },
            (StepState::Recovering { attempt }, StepEvent::Start) => StepState::Attempting {
                attempt: attempt + 1,
                recovery: true,
            },
            (state, _) => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive_to_failure(max_retries: u32) -> Vec<StepState> {
        let mut trace = vec![StepState::Pending];
        let mut state = StepState::Pending.transition(StepEvent::Start, max_retries);
        while !state.is_terminal() {
            trace.push(state);
            state = match state {
                StepState::Attempting { .. } => state.transition(StepEvent::Missed, max_retries),
                _ => state.transition(StepEvent::Start, max_retries),
            };
        }
        trace.push(state);
        trace
    }

    #[test]
    fn misses_retry_then_recover_once_then_fail() {
        let trace = drive_to_failure(3);
        assert_eq!(
            trace,
            vec![
                StepState::Pending,
                StepState::Attempting { attempt: 1, recovery: false },
                StepState::Retrying { attempt: 1 },
                StepState::Attempting { attempt: 2, recovery: false },
                StepState::Retrying { attempt: 2 },
                StepState::Attempting { attempt: 3, recovery: false },
                StepState::Recovering { attempt: 3 },
                StepState::Attempting { attempt: 4, recovery: true },
                StepState::Failed { attempts: 4 },
            ]
        );
    }

    #[test]
    fn attempts_never_exceed_retries_plus_one() {
        for max in 1..6 {
            let attempts = drive_to_failure(max)
                .iter()
                .filter(|s| matches!(s, StepState::Attempting { .. }))
                .count() as u32;
            assert_eq!(attempts, max + 1);
        }
    }

    #[test]
    fn success_records_attempt_count() {
        let s = StepState::Attempting { attempt: 2, recovery: false };
        assert_eq!(s.transition(StepEvent::Succeeded, 3), StepState::Success { attempts: 2 });
        let r = StepState::Attempting { attempt: 4, recovery: true };
        assert_eq!(r.transition(StepEvent::Succeeded, 3), StepState::Success { attempts: 4 });
    }

    #[test]
    fn terminal_states_ignore_events() {
        let done = StepState::Success { attempts: 1 };
        assert_eq!(done.transition(StepEvent::Missed, 3), done);
        assert_eq!(StepState::Pending.transition(StepEvent::Missed, 3), StepState::Pending);
    }
}
