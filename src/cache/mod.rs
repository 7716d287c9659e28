mod sqlite_cache;

pub use sqlite_cache::{Bucket, PendingWrite, SqliteCache, CACHE_DB};
