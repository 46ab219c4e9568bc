use thiserror::Error;

/// Failure of the listing or payload retrieval capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Failure of the remote face service itself. Finding no face is not an error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("face detection failed: {0}")]
pub struct DetectionError(pub String);

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeatureError {
    #[error("insufficient landmarks: {0} is missing")]
    InsufficientLandmarks(&'static str),
    #[error("eye landmarks are {0} apart, cannot normalize")]
    DegenerateEyeDistance(f32),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScoreError {
    #[error("vector length mismatch: {left} vs {right}, expected {expected}")]
    LengthMismatch {
        left: usize,
        right: usize,
        expected: usize,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocatorError {
    #[error("not a recognised folder link: {0}")]
    Malformed(String),
    #[error("container id is empty")]
    Empty,
}

/// Outcome of a single unit of work that did not produce a score.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UnitError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("fetch failed: {0}")]
    Fetch(#[from] SourceError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error("feature extraction failed: {0}")]
    Extraction(#[from] FeatureError),
    #[error(transparent)]
    Scoring(#[from] ScoreError),
    #[error("unit panicked: {0}")]
    Panicked(String),
    #[error("unit task ended without reporting a result")]
    Interrupted,
}

impl UnitError {
    /// Short stable label, used for summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            UnitError::NoFaceDetected => "no_face",
            UnitError::Fetch(_) => "fetch",
            UnitError::Detection(_) => "detection",
            UnitError::Extraction(_) => "extraction",
            UnitError::Scoring(_) => "scoring",
            UnitError::Panicked(_) => "panicked",
            UnitError::Interrupted => "interrupted",
        }
    }
}

/// Run-level failures. These abort the whole run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RunError {
    #[error("no face found in the reference photo")]
    NoReferenceFace,
    #[error("reference photo detection failed: {0}")]
    ReferenceDetection(#[source] DetectionError),
    #[error("reference photo is unusable: {0}")]
    ReferenceLandmarks(#[source] FeatureError),
}
