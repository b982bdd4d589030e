//! Plans, steps and advance predicates.
//!
//! A [`Plan`] is an ordered, non-empty list of [`Step`]s. Each step binds a
//! configuration to an attempt budget, a [`RetrySchedule`] and an
//! [`AdvancePredicate`]. Plans are built once and then run any number of
//! times; they carry no execution state.

use std::fmt;
use std::sync::Arc;

use crate::error::{Classify, ErrorKind, PlanError};
use crate::schedule::RetrySchedule;

/// Decides whether an error keeps the run retrying within the current step.
///
/// `true` means the error is in this step's retry class: the step retries
/// until its attempts are exhausted. `false` means the step is abandoned
/// immediately and the run falls through to the next step.
pub struct AdvancePredicate<E> {
    test: Arc<dyn Fn(&E) -> bool + Send + Sync>,
}

impl<E> Clone for AdvancePredicate<E> {
    fn clone(&self) -> Self {
        Self {
            test: Arc::clone(&self.test),
        }
    }
}

impl<E> fmt::Debug for AdvancePredicate<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdvancePredicate(..)")
    }
}

impl<E: 'static> AdvancePredicate<E> {
    /// Predicate from an arbitrary function.
    pub fn when(test: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        Self {
            test: Arc::new(test),
        }
    }

    /// Accept every error.
    pub fn always() -> Self {
        Self::when(|_| true)
    }

    /// Reject every error: the step gets one attempt, then falls through.
    pub fn never() -> Self {
        Self::when(|_| false)
    }

}

impl<E> AdvancePredicate<E> {
    /// Evaluate the predicate.
    pub fn accepts(&self, error: &E) -> bool {
        (self.test)(error)
    }
}

impl<E: Classify + 'static> AdvancePredicate<E> {
    /// Accept errors classified as `kind`.
    pub fn on_kind(kind: ErrorKind) -> Self {
        Self::on_kinds(&[kind])
    }

    /// Accept errors classified as any of `kinds`.
    pub fn on_kinds(kinds: &[ErrorKind]) -> Self {
        let mut transient = false;
        let mut unavailable = false;
        let mut unclassified = false;
        for kind in kinds {
            match kind {
                ErrorKind::Transient => transient = true,
                ErrorKind::ProviderUnavailable => unavailable = true,
                ErrorKind::Unclassified => unclassified = true,
            }
        }

        Self::when(move |error: &E| match error.kind() {
            ErrorKind::Transient => transient,
            ErrorKind::ProviderUnavailable => unavailable,
            ErrorKind::Unclassified => unclassified,
        })
    }
}

/// One entry in a plan.
pub struct Step<C, E> {
    configuration: C,
    attempts: u32,
    schedule: RetrySchedule,
    predicate: AdvancePredicate<E>,
}

impl<C: Clone, E> Clone for Step<C, E> {
    fn clone(&self) -> Self {
        Self {
            configuration: self.configuration.clone(),
            attempts: self.attempts,
            schedule: self.schedule.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<C: fmt::Debug, E> fmt::Debug for Step<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("configuration", &self.configuration)
            .field("attempts", &self.attempts)
            .field("schedule", &self.schedule)
            .finish()
    }
}

impl<C, E: 'static> Step<C, E> {
    /// A single-attempt step with the default schedule that accepts every error.
    pub fn new(configuration: C) -> Self {
        Self {
            configuration,
            attempts: 1,
            schedule: RetrySchedule::default(),
            predicate: AdvancePredicate::always(),
        }
    }
}

impl<C, E> Step<C, E> {
    /// Set the attempt budget.
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set the retry schedule.
    pub fn schedule(mut self, schedule: RetrySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Set the advance predicate.
    pub fn retry_while(mut self, predicate: AdvancePredicate<E>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn configuration(&self) -> &C {
        &self.configuration
    }

    pub fn max_attempts(&self) -> u32 {
        self.attempts
    }

    pub fn retry_schedule(&self) -> &RetrySchedule {
        &self.schedule
    }

    pub fn predicate(&self) -> &AdvancePredicate<E> {
        &self.predicate
    }
}

impl<C, E: Classify + 'static> Step<C, E> {
    /// Retry only on errors classified as `kind`.
    pub fn retry_on(self, kind: ErrorKind) -> Self {
        self.retry_while(AdvancePredicate::on_kind(kind))
    }
}

/// Ordered, non-empty sequence of steps.
pub struct Plan<C, E> {
    steps: Arc<[Step<C, E>]>,
}

impl<C, E> Clone for Plan<C, E> {
    fn clone(&self) -> Self {
        Self {
            steps: Arc::clone(&self.steps),
        }
    }
}

impl<C: fmt::Debug, E> fmt::Debug for Plan<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan").field("steps", &self.steps).finish()
    }
}

impl<C, E> Plan<C, E> {
    /// Build a plan, rejecting empty step lists and zero-attempt steps.
    pub fn new(steps: Vec<Step<C, E>>) -> Result<Self, PlanError> {
        if steps.is_empty() {
            return Err(PlanError::Empty);
        }

        for (index, step) in steps.iter().enumerate() {
            if step.attempts == 0 {
                return Err(PlanError::ZeroAttempts { step: index });
            }
            step.schedule
                .validate()
                .map_err(|reason| PlanError::InvalidSchedule {
                    step: index,
                    reason,
                })?;
        }

        Ok(Self {
            steps: steps.into(),
        })
    }

    /// Start a builder.
    pub fn builder() -> PlanBuilder<C, E> {
        PlanBuilder::new()
    }

    pub fn steps(&self) -> &[Step<C, E>] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&Step<C, E>> {
        self.steps.get(index)
    }

    /// Number of steps. Never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Upper bound on operation invocations for one run.
    pub fn max_total_attempts(&self) -> u64 {
        self.steps.iter().map(|s| u64::from(s.attempts)).sum()
    }
}

/// Builder for [`Plan`].
pub struct PlanBuilder<C, E> {
    steps: Vec<Step<C, E>>,
}

impl<C, E> PlanBuilder<C, E> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step.
    pub fn step(mut self, step: Step<C, E>) -> Self {
        self.steps.push(step);
        self
    }

    /// Validate and freeze the plan.
    pub fn build(self) -> Result<Plan<C, E>, PlanError> {
        Plan::new(self.steps)
    }
}

impl<C, E> Default for PlanBuilder<C, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_plan_rejected() {
        let result = Plan::<&str, ErrorKind>::new(Vec::new());
        assert_eq!(result.unwrap_err(), PlanError::Empty);

        let result = Plan::<&str, ErrorKind>::builder().build();
        assert!(matches!(result, Err(PlanError::Empty)));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let result = Plan::builder()
            .step(Step::<_, ErrorKind>::new("a").attempts(2))
            .step(Step::new("b").attempts(0))
            .build();
        assert_eq!(result.unwrap_err(), PlanError::ZeroAttempts { step: 1 });
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let result = Plan::builder()
            .step(
                Step::<_, ErrorKind>::new("a")
                    .schedule(RetrySchedule::exponential(Duration::from_millis(1), -2.0)),
            )
            .build();
        assert!(matches!(
            result,
            Err(PlanError::InvalidSchedule { step: 0, .. })
        ));
    }

    #[test]
    fn test_plan_preserves_order() {
        let plan = Plan::builder()
            .step(Step::<_, ErrorKind>::new("openai").attempts(3))
            .step(Step::new("anthropic").attempts(2))
            .build()
            .unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(*plan.steps()[0].configuration(), "openai");
        assert_eq!(*plan.steps()[1].configuration(), "anthropic");
        assert_eq!(plan.max_total_attempts(), 5);
        assert!(plan.step(2).is_none());
    }

    #[test]
    fn test_on_kind_predicate() {
        let transient = AdvancePredicate::<ErrorKind>::on_kind(ErrorKind::Transient);
        assert!(transient.accepts(&ErrorKind::Transient));
        assert!(!transient.accepts(&ErrorKind::ProviderUnavailable));
        assert!(!transient.accepts(&ErrorKind::Unclassified));
    }

    #[test]
    fn test_on_kinds_predicate() {
        let predicate = AdvancePredicate::<ErrorKind>::on_kinds(&[
            ErrorKind::ProviderUnavailable,
            ErrorKind::Unclassified,
        ]);
        assert!(!predicate.accepts(&ErrorKind::Transient));
        assert!(predicate.accepts(&ErrorKind::ProviderUnavailable));
        assert!(predicate.accepts(&ErrorKind::Unclassified));
    }

    #[test]
    fn test_always_and_never() {
        for kind in ErrorKind::ALL {
            assert!(AdvancePredicate::<ErrorKind>::always().accepts(&kind));
            assert!(!AdvancePredicate::<ErrorKind>::never().accepts(&kind));
        }
    }

    #[test]
    fn test_step_defaults() {
        let step = Step::<_, ErrorKind>::new("a");
        assert_eq!(step.max_attempts(), 1);
        assert_eq!(*step.retry_schedule(), RetrySchedule::default());
        assert!(step.predicate().accepts(&ErrorKind::Unclassified));
    }
}
