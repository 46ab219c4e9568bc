pub mod config;
pub mod credentials;
pub mod drive;
pub mod storage;
pub mod vision;

// Re-export matching types for convenience
pub use facefind_vision::{
    corpus, locator, pipeline, ContainerLocator, MatchPipeline, MatchReport, PipelineOptions,
};
