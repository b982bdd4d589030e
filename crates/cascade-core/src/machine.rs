//! Run state machine.
//!
//! Transitions are pure: they look at the plan's shape and the predicate
//! verdict, never at the clock or the operation. The engine drives them.

use std::time::Duration;

use crate::plan::Plan;

/// State of a single plan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// About to invoke the operation under `step`'s configuration.
    Attempting { step: usize, attempt: u32 },

    /// `attempt` failed with an accepted error; wait `delay`, then retry.
    Backoff {
        step: usize,
        attempt: u32,
        delay: Duration,
    },

    Succeeded,

    /// No step left to try.
    Failed,
}

impl State {
    /// Initial state: first attempt of the first step.
    pub fn start() -> Self {
        State::Attempting {
            step: 0,
            attempt: 1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Succeeded | State::Failed)
    }

    /// The attempt succeeded.
    pub fn on_success(self) -> Self {
        match self {
            State::Attempting { .. } => State::Succeeded,
            other => other,
        }
    }

    /// The attempt failed; `accepted` is the step predicate's verdict.
    pub fn on_error<C, E>(self, plan: &Plan<C, E>, accepted: bool) -> Self {
        let State::Attempting { step, attempt } = self else {
            return self;
        };
        let Some(current) = plan.step(step) else {
            return State::Failed;
        };

        if accepted && attempt < current.max_attempts() {
            return State::Backoff {
                step,
                attempt,
                delay: current.retry_schedule().delay(attempt),
            };
        }

        advance(plan, step)
    }

    /// The backoff delay has elapsed.
    pub fn on_backoff_elapsed(self) -> Self {
        match self {
            State::Backoff { step, attempt, .. } => State::Attempting {
                step,
                attempt: attempt + 1,
            },
            other => other,
        }
    }
}

fn advance<C, E>(plan: &Plan<C, E>, step: usize) -> State {
    let next = step + 1;
    if next < plan.len() {
        State::Attempting {
            step: next,
            attempt: 1,
        }
    } else {
        State::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::plan::Step;
    use crate::schedule::RetrySchedule;

    fn plan() -> Plan<&'static str, ErrorKind> {
        Plan::builder()
            .step(
                Step::new("a")
                    .attempts(3)
                    .schedule(RetrySchedule::constant(Duration::from_millis(10))),
            )
            .step(Step::new("b").attempts(2))
            .build()
            .unwrap()
    }

    #[test]
    fn test_start() {
        assert_eq!(
            State::start(),
            State::Attempting {
                step: 0,
                attempt: 1
            }
        );
    }

    #[test]
    fn test_accepted_error_backs_off() {
        let state = State::start().on_error(&plan(), true);
        assert_eq!(
            state,
            State::Backoff {
                step: 0,
                attempt: 1,
                delay: Duration::from_millis(10)
            }
        );
        assert_eq!(
            state.on_backoff_elapsed(),
            State::Attempting {
                step: 0,
                attempt: 2
            }
        );
    }

    #[test]
    fn test_rejected_error_advances_immediately() {
        let state = State::start().on_error(&plan(), false);
        assert_eq!(
            state,
            State::Attempting {
                step: 1,
                attempt: 1
            }
        );
    }

    #[test]
    fn test_exhausted_step_advances() {
        let state = State::Attempting {
            step: 0,
            attempt: 3,
        }
        .on_error(&plan(), true);
        assert_eq!(
            state,
            State::Attempting {
                step: 1,
                attempt: 1
            }
        );
    }

    #[test]
    fn test_last_step_exhausted_fails() {
        let plan = plan();
        let state = State::Attempting {
            step: 1,
            attempt: 2,
        }
        .on_error(&plan, true);
        assert_eq!(state, State::Failed);

        let state = State::Attempting {
            step: 1,
            attempt: 1,
        }
        .on_error(&plan, false);
        assert_eq!(state, State::Failed);
    }

    #[test]
    fn test_success_is_terminal() {
        let state = State::start().on_success();
        assert_eq!(state, State::Succeeded);
        assert!(state.is_terminal());
        assert_eq!(state.on_error(&plan(), true), State::Succeeded);
        assert_eq!(state.on_backoff_elapsed(), State::Succeeded);
    }

    #[test]
    fn test_full_walk_visits_every_attempt() {
        let plan = plan();
        let mut state = State::start();
        let mut visited = Vec::new();

        while !state.is_terminal() {
            state = match state {
                State::Attempting { step, attempt } => {
                    visited.push((step, attempt));
                    state.on_error(&plan, true)
                }
                State::Backoff { .. } => state.on_backoff_elapsed(),
                _ => unreachable!(),
            };
        }

        assert_eq!(state, State::Failed);
        assert_eq!(visited, vec![(0, 1), (0, 2), (0, 3), (1, 1), (1, 2)]);
    }
}
