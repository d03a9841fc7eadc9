pub mod engine;
pub mod freshness;
pub mod memory_store;
pub mod record;
pub mod redis_store;
pub mod store;

pub use engine::{FreshnessEngine, ResolveStatus, Resolved};
pub use freshness::{Freshness, ResolveOptions, NEWS_MAX_AGE_HOURS, PROFILE_MAX_AGE_HOURS};
pub use memory_store::MemoryStore;
pub use record::{CacheRecord, DataSource, Item};
pub use redis_store::RedisStore;
pub use store::{ActiveStore, CacheStore, StoreKind, StoreSelector};
