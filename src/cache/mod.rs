pub mod key;
pub mod store;

mod macros;

pub use key::{CacheKey, CacheNamespace};
pub use store::{CacheStats, CacheSweeperHandle, TtlCache};
