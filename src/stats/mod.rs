//! Broker statistics
//!
//! Every component reports into one [`StatsCenter`]. The center owns the whole
//! statistics tree inside a single task on the worker pool; producers only
//! send it owned copies of the values they want to record.
//!
//! ```text
//!   Feeder ──┐
//!   Feeder ──┼── StatUpdate ──► mpsc ──► [center task] ──► StatsTree ──► JSON
//!   Pool   ──┘                                 ▲
//!   snapshot_as_text() ── oneshot ─────────────┘
//! ```

pub mod center;
pub mod reporter;
pub mod snapshot;
pub mod speed;

pub use center::{EntityHandle, EntityKind, PoolUpdate, StatUpdate, StatsCenter};
pub use reporter::StatsReporter;
pub use snapshot::{EntityStats, PoolStats};
pub use speed::ProcessingSpeed;
