//! Stage agents: each wraps one prompt template and one tier.
//!
//! - [`Planner`] on the planning tier
//! - [`CodeGenerator`] and [`TestGenerator`] on the generation tier
//!
//! Every agent shares the same [`InferenceClient`](crate::inference::InferenceClient),
//! so all concurrent runs draw from one endpoint pool.

pub mod coder;
pub mod planner;
pub mod test_writer;

pub use coder::{CodeGenerator, GeneratedText};
pub use planner::Planner;
pub use test_writer::TestGenerator;
