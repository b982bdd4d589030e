//! Retry schedules: how long to wait before each retry within a step.

use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder};
use std::time::Duration;

/// Default base delay for exponential schedules.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Default growth factor for exponential schedules.
pub const DEFAULT_FACTOR: f32 = 1.5;

/// Default ceiling for any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Delay schedule between attempts of a single step.
///
/// Attempt indices are 1-based: `delay(1)` is the wait after the first
/// failed attempt, before the second one starts.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrySchedule {
    /// `base * factor^(attempt-1)`, capped at `max_delay`. With `jitter`,
    /// up to the capped value again is added, so delays stay below
    /// `2 * max_delay`.
    Exponential {
        base: Duration,
        factor: f32,
        max_delay: Duration,
        jitter: bool,
    },

    /// Same delay before every retry
    Constant { delay: Duration },

    /// Retry without waiting
    Immediate,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::exponential(DEFAULT_BASE_DELAY, DEFAULT_FACTOR)
    }
}

impl RetrySchedule {
    /// Exponential backoff without jitter, capped at [`DEFAULT_MAX_DELAY`].
    pub fn exponential(base: Duration, factor: f32) -> Self {
        Self::Exponential {
            base,
            factor,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: false,
        }
    }

    /// Constant delay between retries.
    pub fn constant(delay: Duration) -> Self {
        Self::Constant { delay }
    }

    /// Cap individual delays. No effect on non-exponential schedules.
    pub fn with_max_delay(self, max: Duration) -> Self {
        match self {
            Self::Exponential {
                base,
                factor,
                jitter,
                ..
            } => Self::Exponential {
                base,
                factor,
                max_delay: max,
                jitter,
            },
            other => other,
        }
    }

    /// Randomise exponential delays by adding up to 100% of each capped
    /// delay. No effect on other schedules.
    pub fn with_jitter(self) -> Self {
        match self {
            Self::Exponential {
                base,
                factor,
                max_delay,
                ..
            } => Self::Exponential {
                base,
                factor,
                max_delay,
                jitter: true,
            },
            other => other,
        }
    }

    /// Check the schedule's parameters.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Exponential {
                base,
                factor,
                max_delay,
                ..
            } => {
                if !factor.is_finite() || *factor < 1.0 {
                    return Err(format!("factor must be a finite number >= 1.0, got {factor}"));
                }
                if base > max_delay {
                    return Err(format!(
                        "base delay {base:?} exceeds max delay {max_delay:?}"
                    ));
                }
                Ok(())
            }
            Self::Constant { .. } | Self::Immediate => Ok(()),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// Returns zero for `attempt == 0`.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let times = attempt as usize;
        let nth = times - 1;

        match self {
            Self::Exponential {
                base,
                factor,
                max_delay,
                jitter,
            } => {
                let mut builder = ExponentialBuilder::default()
                    .with_min_delay(*base)
                    .with_max_delay(*max_delay)
                    .with_factor(*factor)
                    .with_max_times(times);
                if *jitter {
                    builder = builder.with_jitter();
                }
                builder.build().nth(nth).unwrap_or(*max_delay)
            }
            Self::Constant { delay } => ConstantBuilder::default()
                .with_delay(*delay)
                .with_max_times(times)
                .build()
                .nth(nth)
                .unwrap_or(*delay),
            Self::Immediate => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(actual: Duration, expected: Duration) -> bool {
        let diff = if actual > expected {
            actual - expected
        } else {
            expected - actual
        };
        diff < Duration::from_micros(10)
    }

    #[test]
    fn test_default_is_original_backoff() {
        let schedule = RetrySchedule::default();
        assert!(close(schedule.delay(1), Duration::from_millis(100)));
        assert!(close(schedule.delay(2), Duration::from_millis(150)));
        assert!(close(schedule.delay(3), Duration::from_millis(225)));
    }

    #[test]
    fn test_exponential_is_capped() {
        let schedule = RetrySchedule::exponential(Duration::from_secs(1), 2.0)
            .with_max_delay(Duration::from_secs(3));
        assert!(close(schedule.delay(1), Duration::from_secs(1)));
        assert!(close(schedule.delay(2), Duration::from_secs(2)));
        assert!(close(schedule.delay(3), Duration::from_secs(3)));
        assert!(close(schedule.delay(10), Duration::from_secs(3)));
    }

    #[test]
    fn test_constant_and_immediate() {
        let constant = RetrySchedule::constant(Duration::from_millis(250));
        assert_eq!(constant.delay(1), Duration::from_millis(250));
        assert_eq!(constant.delay(7), Duration::from_millis(250));
        assert_eq!(RetrySchedule::Immediate.delay(3), Duration::ZERO);
    }

    #[test]
    fn test_attempt_zero_has_no_delay() {
        assert_eq!(RetrySchedule::default().delay(0), Duration::ZERO);
    }

    #[test]
    fn test_validate_rejects_bad_factor() {
        let schedule = RetrySchedule::exponential(Duration::from_millis(10), 0.5);
        assert!(schedule.validate().is_err());

        let schedule = RetrySchedule::exponential(Duration::from_millis(10), f32::NAN);
        assert!(schedule.validate().is_err());

        assert!(RetrySchedule::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_base_above_cap() {
        let schedule = RetrySchedule::exponential(Duration::from_secs(5), 2.0)
            .with_max_delay(Duration::from_secs(1));
        assert!(schedule.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_exponential_never_decreases_or_exceeds_cap(
            base_ms in 1u64..500,
            factor in 1.0f32..3.0,
            attempt in 1u32..12,
        ) {
            let cap = Duration::from_secs(5);
            let schedule = RetrySchedule::exponential(Duration::from_millis(base_ms), factor)
                .with_max_delay(cap);
            let current = schedule.delay(attempt);
            let next = schedule.delay(attempt + 1);
            prop_assert!(current <= cap + Duration::from_micros(10));
            prop_assert!(next + Duration::from_micros(10) >= current);
        }

        #[test]
        fn prop_jitter_stays_within_double_cap(attempt in 1u32..8) {
            let cap = Duration::from_millis(800);
            let schedule = RetrySchedule::exponential(Duration::from_millis(100), 2.0)
                .with_max_delay(cap)
                .with_jitter();
            prop_assert!(schedule.delay(attempt) <= cap * 2);
        }

        #[test]
        fn prop_jitter_never_shortens_the_delay(attempt in 1u32..8) {
            let plain = RetrySchedule::exponential(Duration::from_millis(100), 2.0)
                .with_max_delay(Duration::from_millis(800));
            let jittered = plain.clone().with_jitter();
            prop_assert!(jittered.delay(attempt) >= plain.delay(attempt));
        }
    }
}
