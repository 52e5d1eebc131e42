//! Flywheel Engine
//!
//! Turns a static pipeline definition into a concrete, ordered set of
//! isolated step executions: matrix expansion, when-clause evaluation,
//! per-leg scheduling, and artifact publishing.

pub mod conditions;
pub mod matrix;
pub mod publisher;
pub mod scheduler;

pub use matrix::expand;
pub use publisher::Publisher;
pub use scheduler::{Scheduler, SchedulerConfig};
