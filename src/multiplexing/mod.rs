//! Event multiplexing
//!
//! The engine fans published events out to subscriber queues (muxers). Each
//! muxer filters on both sides and spills to disk when its consumer lags.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<Engine>
//!               ┌──────────────────────────┐
//!   publish() ─►│ subscribers: BTreeMap<   │
//!               │   SubscriptionId,        │
//!               │   Arc<Muxer>             │
//!               │ >                        │
//!               └────────────┬─────────────┘
//!                            │ write filters
//!         ┌──────────────────┼──────────────────┐
//!         ▼                  ▼                  ▼
//!      [Muxer]            [Muxer]            [Muxer]
//!    memory + disk      memory + disk      memory + disk
//!         │                  │                  │
//!         ▼                  ▼                  ▼
//!   read() / ack()     read() / ack()     read() / ack()
//! ```
//!
//! `Event` is reference counted: every muxer holds the same payload.

pub mod config;
pub mod engine;
pub mod muxer;
pub mod subscriber;

pub use config::MuxerConfig;
pub use engine::{Engine, SubscriptionId};
pub use muxer::{Muxer, MuxerStatistics};
pub use subscriber::Subscriber;
