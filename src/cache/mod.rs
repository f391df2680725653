pub mod coalescing;
pub mod hierarchical;
pub mod wire;

pub use coalescing::{CacheError, CoalescingCache};
pub use hierarchical::{CacheLayer, HierarchicalCache, HierarchicalCacheError};
pub use wire::{WireError, WireResponse};
