//! Progress store backends

pub mod memory;
pub mod redis;

pub use memory::MemoryProgressStore;
pub use self::redis::RedisProgressStore;
