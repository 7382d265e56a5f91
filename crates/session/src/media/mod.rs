//! Local sender tuning and remote stream bookkeeping

mod bitrate;
mod stream_registry;

pub use bitrate::apply_bitrate_cap;
pub use stream_registry::StreamRegistry;
