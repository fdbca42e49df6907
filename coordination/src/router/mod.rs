//! Routing Module
//!
//! Decides where a pipeline run goes:
//! - which task category an objective belongs to (selects prompt framing and gates)
//! - which backend address serves the next call for a tier
//!
//! # Tier Layout
//!
//! ```text
//! Tier        | Used by                      | Endpoint selection
//! ------------|------------------------------|--------------------------------
//! planning    | Planner                      | round-robin, skip tripped
//! generation  | Code + Test Generator        | round-robin, skip tripped
//! escalation  | Escalation Controller        | round-robin, skip tripped
//! ```

pub mod endpoint_pool;
pub mod task_classifier;

pub use endpoint_pool::{EndpointPool, EndpointRecord, PoolError, SharedEndpointPool, Tier};
pub use task_classifier::{
    classify, classify_detailed, classify_with_rules, Classification, ClassificationRule,
    TaskCategory, CLASSIFICATION_RULES,
};
