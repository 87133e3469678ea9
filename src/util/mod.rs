//! Utility functions.

pub mod env;
pub mod format;
pub mod time;

pub use format::{format_cost, format_percent, format_tokens, mask_secret};
pub use time::{Clock, SystemClock, format_countdown, format_duration, format_relative_time};
