pub mod backend;
pub mod clock;
pub mod memory;
pub mod redis;
pub mod store;

pub use backend::{BackendError, KeyValueBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryBackend;
pub use redis::RedisBackend;
pub use store::{CacheError, CacheStore};
