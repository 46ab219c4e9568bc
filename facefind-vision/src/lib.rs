pub mod corpus;
pub mod detector;
pub mod error;
pub mod face;
pub mod locator;
pub mod matcher;
pub mod pipeline;

// Re-export commonly used types
pub use corpus::{CorpusFetcher, CorpusSource, Enumeration, ImagePayload, ImageRef, PartialEnumeration};
pub use detector::FaceDetector;
pub use face::{FaceAnnotation, FeatureVector, Landmark, LandmarkType, Position};
pub use locator::ContainerLocator;
pub use matcher::Matcher;
pub use pipeline::{MatchPipeline, MatchReport, MatchResult, PipelineOptions};
