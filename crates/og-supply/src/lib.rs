//! og Supply - Value suppliers and body sources
//!
//! Small building blocks that produce values on demand: constants, cycles,
//! ranged integers and weighted random choices, plus the lazy body streams
//! (zeroes, seeded random, existing content) and the token-bucket throttle
//! applied to write bodies.

pub mod body;
pub mod md5_cache;
pub mod supplier;
pub mod throttle;

// Re-exports
pub use body::{materialize, BodyReader};
pub use md5_cache::Md5Cache;
pub use supplier::{RangeMode, RangedSupplier, Supplier};
pub use throttle::{ThrottledReader, TokenBucket};
