//! Status events for pipeline runs
//!
//! 1. **Event Types** (`types.rs`): one variant per state transition, tagged
//!    with the run ID and a UTC timestamp.
//!
//! 2. **Event Bus** (`bus.rs`): Tokio broadcast-based pub/sub with filtered
//!    subscriptions.
//!
//! # Per-run Order
//!
//! ```text
//! run_started → planning_started → planning_completed
//!   → generation_completed → tests_generated → validation_{passed|failed}
//!   → [escalation_attempt → generation_completed → tests_generated
//!      → validation_{passed|failed}] × n
//!   → [drift_detected] → run_succeeded | run_exhausted
//! ```
//!
//! `run_aborted` replaces the tail when planning fails or the run is
//! cancelled. `endpoint_tripped` is process-wide and may interleave anywhere.
//!
//! # Usage
//!
//! ```ignore
//! use coordination::events::{EventBus, EventBusExt, EventFilter};
//!
//! let bus = EventBus::new().shared();
//! let mut rx = bus.subscribe_filtered(EventFilter::new().run(&run_id));
//! let event = rx.recv().await?;
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventBusExt, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::{preview, PipelineEvent, RunId, PREVIEW_CHARS};
