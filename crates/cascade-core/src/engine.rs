//! The execution-plan engine.
//!
//! Runs one logical operation through a [`Plan`]: each step's configuration
//! in order, retrying within a step while its predicate accepts the error
//! and attempts remain, falling through to the next step otherwise. Only the
//! final error of the final step ever reaches the caller.
//!
//! # Cancellation
//!
//! Every suspension point (the operation call and each backoff wait) races
//! a caller-supplied cancellation future. Once it resolves, the in-flight
//! operation future is dropped and no further attempt starts. Dropping the
//! run future itself has the same effect, so a `tokio::time::timeout`
//! around [`run`] is the way to impose a deadline.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::Instrument;

use crate::error::{Classify, Phase, RunError};
use crate::machine::State;
use crate::plan::Plan;

/// A unit of work that can be run under a configuration.
///
/// Any `Fn(C) -> impl Future<Output = Result<T, E>>` is an operation; the
/// engine hands it a clone of the step's configuration.
#[async_trait]
pub trait Operation<C>: Send + Sync {
    /// Value produced on success.
    type Output: Send;

    /// Error raised on failure; must be classifiable.
    type Error: Classify + Send;

    /// Run once under `configuration`.
    async fn execute(&self, configuration: &C) -> Result<Self::Output, Self::Error>;
}

#[async_trait]
impl<C, F, Fut, T, E> Operation<C> for F
where
    C: Clone + Send + Sync,
    F: Fn(C) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: Classify + Send,
{
    type Output = T;
    type Error = E;

    async fn execute(&self, configuration: &C) -> Result<T, E> {
        (self)(configuration.clone()).await
    }
}

/// A successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion<T> {
    /// The operation's result
    pub value: T,

    /// Index of the step that produced it
    pub step: usize,

    /// Attempts made under that step, including the successful one
    pub attempts: u32,

    /// Operation invocations across all steps
    pub total_attempts: u32,

    /// Time spent in backoff waits
    pub total_delay: Duration,
}

impl<T> Completion<T> {
    /// Whether a step other than the first produced the result.
    pub fn fell_back(&self) -> bool {
        self.step > 0
    }
}

/// Run `operation` through `plan`.
pub async fn run<C, O>(
    plan: &Plan<C, O::Error>,
    operation: O,
) -> Result<O::Output, RunError<O::Error>>
where
    C: fmt::Display + Sync,
    O: Operation<C>,
{
    execute(plan, operation, std::future::pending())
        .await
        .map(|completion| completion.value)
}

/// Run `operation` through `plan`, aborting when `cancel` resolves.
pub async fn run_until<C, O, X>(
    plan: &Plan<C, O::Error>,
    operation: O,
    cancel: X,
) -> Result<O::Output, RunError<O::Error>>
where
    C: fmt::Display + Sync,
    O: Operation<C>,
    X: Future<Output = ()>,
{
    execute(plan, operation, cancel)
        .await
        .map(|completion| completion.value)
}

/// Run `operation` through `plan` and report where and how it succeeded.
pub async fn execute<C, O, X>(
    plan: &Plan<C, O::Error>,
    operation: O,
    cancel: X,
) -> Result<Completion<O::Output>, RunError<O::Error>>
where
    C: fmt::Display + Sync,
    O: Operation<C>,
    X: Future<Output = ()>,
{
    tokio::pin!(cancel);
    let span = tracing::debug_span!("execution_plan", steps = plan.len());
    drive(plan, &operation, cancel).instrument(span).await
}

async fn drive<C, O, X>(
    plan: &Plan<C, O::Error>,
    operation: &O,
    mut cancel: Pin<&mut X>,
) -> Result<Completion<O::Output>, RunError<O::Error>>
where
    C: fmt::Display + Sync,
    O: Operation<C>,
    X: Future<Output = ()>,
{
    let (mut step, mut attempt) = (0, 1);
    let mut total_attempts: u32 = 0;
    let mut total_delay = Duration::ZERO;

    loop {
        let current = &plan.steps()[step];
        let configuration = current.configuration();
        total_attempts += 1;

        tracing::debug!(step, attempt, configuration = %configuration, "Attempting operation");

        let outcome = tokio::select! {
            biased;
            _ = cancel.as_mut() => {
                tracing::warn!(step, attempt, "Execution plan cancelled during operation");
                return Err(RunError::Cancelled { step, attempt, phase: Phase::Operation });
            }
            outcome = operation.execute(configuration) => outcome,
        };

        let error = match outcome {
            Ok(value) => {
                if step > 0 {
                    tracing::info!(
                        step,
                        attempt,
                        configuration = %configuration,
                        "Operation succeeded on fallback step"
                    );
                }
                return Ok(Completion {
                    value,
                    step,
                    attempts: attempt,
                    total_attempts,
                    total_delay,
                });
            }
            Err(error) => error,
        };

        let kind = error.kind();
        let accepted = current.predicate().accepts(&error);
        let next = State::Attempting { step, attempt }.on_error(plan, accepted);

        match next {
            State::Backoff { delay, .. } => {
                tracing::warn!(
                    step,
                    attempt,
                    kind = %kind,
                    delay = ?delay,
                    configuration = %configuration,
                    "Attempt failed, retrying after backoff"
                );
                tokio::select! {
                    biased;
                    _ = cancel.as_mut() => {
                        tracing::warn!(step, attempt, "Execution plan cancelled during backoff");
                        return Err(RunError::Cancelled { step, attempt, phase: Phase::Backoff });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                total_delay += delay;
            }
            State::Attempting { step: next_step, .. } => {
                tracing::warn!(
                    step,
                    attempt,
                    kind = %kind,
                    accepted,
                    next_step,
                    configuration = %configuration,
                    "Attempt failed, falling back to next step"
                );
            }
            State::Succeeded | State::Failed => {}
        }

        // Identity on `Attempting`; a finished backoff becomes the retry.
        match next.on_backoff_elapsed() {
            State::Attempting {
                step: next_step,
                attempt: next_attempt,
            } => {
                step = next_step;
                attempt = next_attempt;
            }
            State::Backoff { .. } | State::Succeeded | State::Failed => {
                tracing::warn!(
                    step,
                    attempt,
                    kind = %kind,
                    configuration = %configuration,
                    "Execution plan exhausted"
                );
                return Err(RunError::Exhausted {
                    step,
                    configuration: configuration.to_string(),
                    kind,
                    attempts: attempt,
                    source: error,
                });
            }
        }
    }
}

impl<C, E> Plan<C, E>
where
    C: fmt::Display + Sync,
{
    /// Run `operation` through this plan. See [`run`].
    pub async fn run<O>(&self, operation: O) -> Result<O::Output, RunError<E>>
    where
        O: Operation<C, Error = E>,
    {
        run(self, operation).await
    }

    /// Run with a cancellation trigger. See [`execute`].
    pub async fn execute<O, X>(
        &self,
        operation: O,
        cancel: X,
    ) -> Result<Completion<O::Output>, RunError<E>>
    where
        O: Operation<C, Error = E>,
        X: Future<Output = ()>,
    {
        execute(self, operation, cancel).await
    }
}
