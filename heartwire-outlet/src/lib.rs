//! TCP stream outlet for assembled vectors.
//!
//! A consumer connects, receives the [`StreamInfo`] once, then one
//! [`Sample`] per pushed vector. Each consumer has its own bounded buffer;
//! a consumer that falls behind loses its oldest samples.
//!
//! [`StreamInfo`]: heartwire_core::StreamInfo

mod frame;
pub use frame::*;
mod message;
pub use message::*;
mod outlet;
pub use outlet::*;
mod inlet;
pub use inlet::*;

pub use tokio_util::sync::CancellationToken;
