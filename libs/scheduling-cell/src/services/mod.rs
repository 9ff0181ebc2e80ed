pub mod store;
pub mod memory_store;
pub mod supabase_store;
pub mod episode_cache;
pub mod priority;
pub mod recompute;
pub mod hold_expiry;
pub mod intent_expiry;
pub mod cache_refresh;

pub use store::*;
pub use memory_store::*;
pub use supabase_store::*;
pub use episode_cache::*;
pub use priority::*;
pub use recompute::*;
pub use hold_expiry::*;
pub use intent_expiry::*;
pub use cache_refresh::*;
