//! Event model
//!
//! The broker never looks inside an event. It only needs a stable numeric type
//! to filter on and a payload it can share between queues and write to disk.
//!
//! ```text
//!   type_id (u32)
//!   ┌────────────────┬────────────────┐
//!   │ category (u16) │ element (u16)  │
//!   └────────────────┴────────────────┘
//! ```

pub mod codec;
pub mod filter;
pub mod outcome;
pub mod types;

pub use codec::{decode, decode_header, encode, MAX_PAYLOAD_SIZE, RECORD_HEADER_SIZE};
pub use filter::FilterSet;
pub use outcome::ReadOutcome;
pub use types::{category_of, element_of, make_type, Event, EventType};
