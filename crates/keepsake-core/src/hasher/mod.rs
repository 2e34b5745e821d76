pub mod cache;
pub mod funnel;
pub mod xxhash;

pub use cache::{HashCache, MemoryCache, RocksDbCache};
pub use funnel::{Funnel, FunnelOutput, FunnelStats, FunnelWarning};
