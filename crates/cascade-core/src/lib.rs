//! # cascade-core
//!
//! Execution-plan engine: run one operation through an ordered list of
//! fallback steps, each with its own attempt budget, backoff schedule and
//! error predicate.
//!
//! ## Key Guarantees
//!
//! 1. **Bounded**: a step with `attempts = N` invokes the operation at most N times
//! 2. **Ordered**: a step's attempts are spent before the next step is tried
//! 3. **Single failure**: only the final error of the final step is surfaced
//! 4. **Stateless plans**: all per-run state lives inside one `run` call
//!
//! ## Example
//!
//! ```rust,ignore
//! use cascade_core::{ErrorKind, Plan, RetrySchedule, Step};
//! use std::time::Duration;
//!
//! let plan = Plan::builder()
//!     .step(
//!         Step::new("openai/gpt-4o")
//!             .attempts(3)
//!             .schedule(RetrySchedule::exponential(Duration::from_millis(100), 1.5))
//!             .retry_on(ErrorKind::Transient),
//!     )
//!     .step(
//!         Step::new("anthropic/claude-sonnet-4")
//!             .attempts(2)
//!             .retry_on(ErrorKind::ProviderUnavailable),
//!     )
//!     .build()?;
//!
//! let joke = plan.run(|model| async move { ask(model).await }).await?;
//! ```

pub mod engine;
pub mod error;
pub mod machine;
pub mod plan;
pub mod schedule;

pub use engine::{execute, run, run_until, Completion, Operation};
pub use error::{Classify, ErrorKind, Phase, PlanError, RunError};
pub use machine::State;
pub use plan::{AdvancePredicate, Plan, PlanBuilder, Step};
pub use schedule::RetrySchedule;
