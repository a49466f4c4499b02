//! Admission and accounting limiters.
//!
//! Both limiters are synchronous: their critical sections never suspend, so
//! they can be called from async handlers without holding locks across
//! await points.

pub mod rate;
pub mod sessions;

pub use rate::SlidingWindowLimiter;
pub use sessions::SessionLimiter;
