pub mod cache;
pub mod knowledge;

pub use cache::{ResponseCache, SqliteCacheBackend};
pub use knowledge::{DocumentInfo, KnowledgeBase};
