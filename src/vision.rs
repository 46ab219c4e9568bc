use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use facefind_vision::error::DetectionError;
use facefind_vision::{FaceAnnotation, FaceDetector, ImagePayload, Landmark, LandmarkType, Position};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::credentials::AccessToken;

#[derive(Debug, Deserialize)]
struct AnnotateBatch {
    #[serde(default)]
    responses: Vec<AnnotateResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResponse {
    #[serde(default)]
    face_annotations: Vec<RawFace>,
    error: Option<ServiceStatus>,
}

#[derive(Debug, Deserialize)]
struct ServiceStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawFace {
    #[serde(default)]
    landmarks: Vec<RawLandmark>,
}

#[derive(Debug, Deserialize)]
struct RawLandmark {
    #[serde(rename = "type")]
    kind: String,
    position: Option<Position>,
}

impl RawFace {
    /// Keep only positioned landmarks of kinds the extractor understands.
    fn into_annotation(self) -> FaceAnnotation {
        FaceAnnotation::new(
            self.landmarks
                .into_iter()
                .filter_map(|l| {
                    let kind = l.kind.parse::<LandmarkType>().ok()?;
                    Some(Landmark::new(kind, l.position?))
                })
                .collect(),
        )
    }
}

/// Face detector backed by a Vision v1 style `images:annotate` endpoint.
#[derive(Clone)]
pub struct VisionClient {
    client: Client,
    endpoint: String,
    token: AccessToken,
}

impl VisionClient {
    pub fn new(client: Client, endpoint: &str, token: AccessToken) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request_body(payload: &ImagePayload) -> serde_json::Value {
        json!({
            "requests": [{
                "image": { "content": STANDARD.encode(&payload.bytes) },
                "features": [{ "type": "FACE_DETECTION", "maxResults": 1 }]
            }]
        })
    }
}

#[async_trait]
impl FaceDetector for VisionClient {
    async fn detect(&self, payload: &ImagePayload) -> Result<Option<FaceAnnotation>, DetectionError> {
        let resp = self
            .client
            .post(format!("{}/v1/images:annotate", self.endpoint))
            .bearer_auth(self.token.secret())
            .json(&Self::request_body(payload))
            .send()
            .await
            .map_err(|e| DetectionError(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DetectionError(format!("status {}: {}", status.as_u16(), body)));
        }

        let batch: AnnotateBatch = resp
            .json()
            .await
            .map_err(|e| DetectionError(format!("malformed response: {}", e)))?;

        let Some(response) = batch.responses.into_iter().next() else {
            return Err(DetectionError("empty response batch".to_string()));
        };
        if let Some(err) = response.error {
            return Err(DetectionError(format!("code {}: {}", err.code, err.message)));
        }

        Ok(response
            .face_annotations
            .into_iter()
            .next()
            .map(RawFace::into_annotation))
    }
}
