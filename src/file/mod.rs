//! Rotating file storage
//!
//! One logical byte stream spread over size-bounded physical files:
//!
//! ```text
//!   logical:  |0 ............ max|max ........ 2*max|2*max ... tell()|
//!   physical:   base                base.1             base.2
//!                 ▲ read cursor (id, offset)              ▲ write cursor
//! ```
//!
//! Queues use it as their overflow area. The store does not interpret the bytes.

pub mod splitter;

pub use splitter::{OpenMode, Splitter, DEFAULT_MAX_FILE_SIZE};
