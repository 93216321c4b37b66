//! File discovery, symbol extraction and the incremental index controller

pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod extraction_cache;
pub mod extractor;
pub mod languages;
pub mod lock;
pub mod parser_pool;

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
pub mod tests;

pub use config::{IndexConfig, IndexOptions, TaprootConfig};
pub use coordinator::{clear_index, Coordinator, FileCounts, IndexSession, IndexSummary, Phase};
pub use discovery::{discover, Candidate, Discovery, DiscoverySource};
pub use error::{IndexError, Result};
pub use extraction_cache::ExtractionCache;
pub use extractor::{Extractor, ExtractorRegistry, FileExtraction};
pub use languages::script::Dialect;
pub use lock::{IndexLock, LockInfo};
