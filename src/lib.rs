pub mod cache;
pub mod clock;
pub mod config;
pub mod dataset;
pub mod error;
pub mod provider;
pub mod refresh;
pub mod service;
pub mod stats;
pub mod testing; // Fakes shared by unit and integration tests
pub mod universe;
pub mod utils;

pub use cache::{
    ActiveStore, CacheRecord, CacheStore, DataSource, FreshnessEngine, MemoryStore, RedisStore,
    ResolveOptions, ResolveStatus, Resolved, StoreKind, StoreSelector,
};
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use dataset::Dataset;
pub use error::{CacheError, Result};
pub use provider::{ProviderClient, UnconfiguredProvider, YahooNewsClient, YahooQuoteClient};
pub use refresh::{BatchOutcome, RefreshCoordinator, RefreshOutcome, RefreshScheduler};
pub use service::AggregateCacheService;
pub use stats::{CacheStats, KeyStatus};
pub use universe::KeyUniverse;
