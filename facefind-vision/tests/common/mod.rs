#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use facefind_vision::corpus::{ListedItem, ListingPage, PageRequest};
use facefind_vision::error::{DetectionError, SourceError};
use facefind_vision::{
    CorpusSource, FaceAnnotation, FaceDetector, ImagePayload, ImageRef, Landmark, LandmarkType,
    Position,
};
use tokio_util::sync::CancellationToken;

pub const REFERENCE_ID: &str = "reference";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Landmarks of a synthetic face. `jaw` stretches the lower face so that
/// different values describe different people.
pub fn face(offset: (f32, f32), scale: f32, jaw: f32) -> FaceAnnotation {
    let points: [(LandmarkType, (f32, f32, f32)); 16] = [
        (LandmarkType::NoseTip, (0.5, 0.6, -0.3)),
        (LandmarkType::MouthCenter, (0.5, 1.1 * jaw, -0.1)),
        (LandmarkType::LeftEye, (0.0, 0.0, 0.0)),
        (LandmarkType::RightEye, (1.0, 0.0, 0.0)),
        (LandmarkType::LeftEarTragion, (-0.6, 0.4, 0.8)),
        (LandmarkType::RightEarTragion, (1.6, 0.4, 0.8)),
        (LandmarkType::ChinGnathion, (0.5, 1.6 * jaw, 0.0)),
        (LandmarkType::LeftEyeTopBoundary, (0.0, -0.1, 0.0)),
        (LandmarkType::RightEyeTopBoundary, (1.0, -0.1, 0.0)),
        (LandmarkType::LeftEyeBottomBoundary, (0.0, 0.1, 0.0)),
        (LandmarkType::RightEyeBottomBoundary, (1.0, 0.1, 0.0)),
        (LandmarkType::LeftEyebrowUpperMidpoint, (0.0, -0.35, -0.05)),
        (LandmarkType::RightEyebrowUpperMidpoint, (1.0, -0.35, -0.05)),
        (LandmarkType::ForeheadGlabella, (0.5, -0.3, -0.1)),
        (LandmarkType::UpperLip, (0.5, 1.0 * jaw, -0.15)),
        (LandmarkType::LowerLip, (0.5, 1.2 * jaw, -0.1)),
    ];
    FaceAnnotation::new(
        points
            .iter()
            .map(|(kind, (x, y, z))| {
                Landmark::new(
                    *kind,
                    Position::new(x * scale + offset.0, y * scale + offset.1, z * scale),
                )
            })
            .collect(),
    )
}

pub fn same_person() -> FaceAnnotation {
    face((0.0, 0.0), 1.0, 1.0)
}

pub fn other_person() -> FaceAnnotation {
    face((0.0, 0.0), 1.0, 1.6)
}

pub fn without(mut face: FaceAnnotation, kind: LandmarkType) -> FaceAnnotation {
    face.landmarks.retain(|l| l.kind != kind);
    face
}

pub fn payload(id: &str) -> ImagePayload {
    ImagePayload::new(id, id.as_bytes().to_vec())
}

/// In-memory container served in pages. Ids are `img-<n>`.
pub struct FakeSource {
    pub total: usize,
    pub fail_page: Option<usize>,
    pub fail_fetch: HashSet<String>,
    pub list_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            fail_page: None,
            fail_fetch: HashSet::new(),
            list_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_page(mut self, page: usize) -> Self {
        self.fail_page = Some(page);
        self
    }

    pub fn failing_fetch(mut self, id: &str) -> Self {
        self.fail_fetch.insert(id.to_string());
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CorpusSource for FakeSource {
    async fn list_page(&self, request: PageRequest<'_>) -> Result<ListingPage, SourceError> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_page == Some(call) {
            return Err(SourceError::Status {
                status: 500,
                message: "Internal Server Error".into(),
            });
        }
        let start = request
            .page_token
            .and_then(|t| t.parse::<usize>().ok())
            .unwrap_or(0);
        let end = (start + request.page_size as usize).min(self.total);
        Ok(ListingPage {
            items: (start..end)
                .map(|i| ListedItem {
                    id: format!("img-{i}"),
                    name: format!("IMG_{i:04}.jpg"),
                    mime_type: "image/jpeg".into(),
                })
                .collect(),
            next_page_token: (end < self.total).then(|| end.to_string()),
        })
    }

    async fn fetch(&self, image: &ImageRef) -> Result<ImagePayload, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.contains(&image.id) {
            return Err(SourceError::Status {
                status: 404,
                message: "Not Found".into(),
            });
        }
        Ok(payload(&image.id))
    }
}

#[derive(Clone)]
pub enum Behaviour {
    Face(FaceAnnotation),
    NoFace,
    Fail,
    Panic,
}

/// Detector answering from a per-id table. Unlisted ids get `default`.
pub struct FakeDetector {
    pub table: HashMap<String, Behaviour>,
    pub default: Behaviour,
    pub delay: Option<Duration>,
    pub cancel_after: Option<(usize, CancellationToken)>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeDetector {
    pub fn new(reference: FaceAnnotation, default: Behaviour) -> Self {
        let mut table = HashMap::new();
        table.insert(REFERENCE_ID.to_string(), Behaviour::Face(reference));
        Self {
            table,
            default,
            delay: None,
            cancel_after: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, id: &str, behaviour: Behaviour) -> Self {
        self.table.insert(id.to_string(), behaviour);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn cancelling_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceDetector for FakeDetector {
    async fn detect(&self, payload: &ImagePayload) -> Result<Option<FaceAnnotation>, DetectionError> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((after, token)) = &self.cancel_after {
            if calls > *after {
                token.cancel();
            }
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.table.get(&payload.id).unwrap_or(&self.default) {
            Behaviour::Face(face) => Ok(Some(face.clone())),
            Behaviour::NoFace => Ok(None),
            Behaviour::Fail => Err(DetectionError("quota exceeded".into())),
            Behaviour::Panic => panic!("detector blew up on {}", payload.id),
        }
    }
}

pub fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
