//! Caching subsystem.
//!
//! - [`key::build_key`] derives a content-addressed key from a component's
//!   connection, payload signature and filter values.
//!
//! - [`result::ResultCache`] stores successful component results under
//!   those keys, bounded by an estimated byte budget and per-entry TTLs.
//!   One instance is owned by each [`ReportEngine`](crate::ReportEngine).

pub mod key;
pub mod result;

pub use key::build_key;
pub use result::{CacheConfig, CacheEntryInfo, CacheStats, DEFAULT_MAX_BYTES, ResultCache};
