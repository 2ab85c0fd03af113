//! Event processing
//!
//! A feeder pairs one transport [`Stream`] with one subscriber queue and
//! moves events between them on a dedicated thread.

pub mod config;
pub mod feeder;
pub mod stream;

pub use config::FeederConfig;
pub use feeder::{Feeder, FeederState};
pub use stream::Stream;
