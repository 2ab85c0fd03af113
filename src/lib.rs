//! Monitoring event broker
//!
//! Producers publish typed events; the engine fans them out to subscriber
//! queues filtered by event type; feeders pump events between queues and
//! transport streams on dedicated threads. Queues spill to rotating files on
//! disk when their consumer lags, and every component reports into one
//! statistics center.
//!
//! ```text
//!   Stream ──► Feeder ──► Engine.publish() ──► Muxer ──► Feeder ──► Stream
//!                                                │
//!                                          Splitter (disk)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use event_broker::{Broker, BrokerConfig, Event, FilterSet};
//!
//! let broker = Broker::new(BrokerConfig::with_cache_dir("/tmp/broker")).unwrap();
//! let rrd = broker
//!     .subscriber("rrd", FilterSet::all(), FilterSet::from([0x30001]))
//!     .unwrap();
//! broker.start();
//!
//! broker.publish(Event::new(0x30001, "service status"));
//! assert_eq!(rrd.muxer().pending_count(), 1);
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod event;
pub mod file;
pub mod multiplexing;
pub mod pool;
pub mod predicate;
pub mod processing;
pub mod stats;

pub use broker::Broker;
pub use config::BrokerConfig;
pub use error::{Error, Result};
pub use event::{Event, EventType, FilterSet, ReadOutcome};
pub use multiplexing::{Engine, Muxer, MuxerConfig, Subscriber};
pub use processing::{Feeder, FeederConfig, Stream};
pub use stats::StatsCenter;
