//! Shard pool

mod manager;

pub use manager::ShardPool;
