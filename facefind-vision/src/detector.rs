use async_trait::async_trait;

use crate::corpus::ImagePayload;
use crate::error::DetectionError;
use crate::face::FaceAnnotation;

/// Remote face-landmark detection.
///
/// `Ok(None)` means the image was processed and contains no face. That is a
/// normal outcome, distinct from `Err`, which is a service or transport failure.
/// Only the first detected face is returned.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, payload: &ImagePayload) -> Result<Option<FaceAnnotation>, DetectionError>;
}
