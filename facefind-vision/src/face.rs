use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::FeatureError;

/// Number of landmark kinds that make up a feature vector.
pub const LANDMARK_COUNT: usize = 16;

/// Length of every feature vector: one (x, y, z) triple per landmark kind.
pub const FEATURE_LEN: usize = LANDMARK_COUNT * 3;

/// Facial points the extractor understands. Anything else reported by the
/// detection service is dropped when the annotation is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LandmarkType {
    NoseTip,
    MouthCenter,
    LeftEye,
    RightEye,
    LeftEarTragion,
    RightEarTragion,
    ChinGnathion,
    LeftEyeTopBoundary,
    RightEyeTopBoundary,
    LeftEyeBottomBoundary,
    RightEyeBottomBoundary,
    LeftEyebrowUpperMidpoint,
    RightEyebrowUpperMidpoint,
    ForeheadGlabella,
    UpperLip,
    LowerLip,
}

impl LandmarkType {
    /// Order in which landmark coordinates are laid out in a [`FeatureVector`].
    pub const FEATURE_ORDER: [LandmarkType; LANDMARK_COUNT] = [
        LandmarkType::NoseTip,
        LandmarkType::MouthCenter,
        LandmarkType::LeftEye,
        LandmarkType::RightEye,
        LandmarkType::LeftEarTragion,
        LandmarkType::RightEarTragion,
        LandmarkType::ChinGnathion,
        LandmarkType::LeftEyeTopBoundary,
        LandmarkType::RightEyeTopBoundary,
        LandmarkType::LeftEyeBottomBoundary,
        LandmarkType::RightEyeBottomBoundary,
        LandmarkType::LeftEyebrowUpperMidpoint,
        LandmarkType::RightEyebrowUpperMidpoint,
        LandmarkType::ForeheadGlabella,
        LandmarkType::UpperLip,
        LandmarkType::LowerLip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LandmarkType::NoseTip => "NOSE_TIP",
            LandmarkType::MouthCenter => "MOUTH_CENTER",
            LandmarkType::LeftEye => "LEFT_EYE",
            LandmarkType::RightEye => "RIGHT_EYE",
            LandmarkType::LeftEarTragion => "LEFT_EAR_TRAGION",
            LandmarkType::RightEarTragion => "RIGHT_EAR_TRAGION",
            LandmarkType::ChinGnathion => "CHIN_GNATHION",
            LandmarkType::LeftEyeTopBoundary => "LEFT_EYE_TOP_BOUNDARY",
            LandmarkType::RightEyeTopBoundary => "RIGHT_EYE_TOP_BOUNDARY",
            LandmarkType::LeftEyeBottomBoundary => "LEFT_EYE_BOTTOM_BOUNDARY",
            LandmarkType::RightEyeBottomBoundary => "RIGHT_EYE_BOTTOM_BOUNDARY",
            LandmarkType::LeftEyebrowUpperMidpoint => "LEFT_EYEBROW_UPPER_MIDPOINT",
            LandmarkType::RightEyebrowUpperMidpoint => "RIGHT_EYEBROW_UPPER_MIDPOINT",
            LandmarkType::ForeheadGlabella => "FOREHEAD_GLABELLA",
            LandmarkType::UpperLip => "UPPER_LIP",
            LandmarkType::LowerLip => "LOWER_LIP",
        }
    }
}

impl fmt::Display for LandmarkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned for landmark names outside the recognised set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLandmark(pub String);

impl FromStr for LandmarkType {
    type Err = UnknownLandmark;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LandmarkType::FEATURE_ORDER
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownLandmark(s.to_string()))
    }
}

/// Landmark coordinates. Zero-valued axes may be omitted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    #[serde(rename = "type")]
    pub kind: LandmarkType,
    pub position: Position,
}

impl Landmark {
    pub fn new(kind: LandmarkType, position: Position) -> Self {
        Self { kind, position }
    }
}

/// Landmarks of the first face found in an image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceAnnotation {
    pub landmarks: Vec<Landmark>,
}

impl FaceAnnotation {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    /// First landmark of the given kind, if the detector reported one.
    pub fn find(&self, kind: LandmarkType) -> Option<&Position> {
        self.landmarks
            .iter()
            .find(|l| l.kind == kind)
            .map(|l| &l.position)
    }
}

/// Eye-normalized landmark geometry, always [`FEATURE_LEN`] long.
///
/// Slots of landmarks absent from the source annotation hold `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    vector: Array1<f32>,
}

impl FeatureVector {
    pub fn view(&self) -> ArrayView1<'_, f32> {
        self.vector.view()
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    /// True when at least one landmark slot carries the missing-landmark sentinel.
    pub fn has_missing(&self) -> bool {
        self.vector.iter().any(|v| v.is_nan())
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.vector.to_vec()
    }
}

/// Normalize a face's landmarks into a [`FeatureVector`].
///
/// Positions are translated so the left eye sits at the origin and divided by
/// the inter-eye distance. Both eyes are required.
pub fn normalize(face: &FaceAnnotation) -> Result<FeatureVector, FeatureError> {
    let left_eye = *face
        .find(LandmarkType::LeftEye)
        .ok_or(FeatureError::InsufficientLandmarks(LandmarkType::LeftEye.as_str()))?;
    let right_eye = *face
        .find(LandmarkType::RightEye)
        .ok_or(FeatureError::InsufficientLandmarks(LandmarkType::RightEye.as_str()))?;

    let eye_distance = left_eye.distance(&right_eye);
    if !eye_distance.is_normal() {
        return Err(FeatureError::DegenerateEyeDistance(eye_distance));
    }

    let mut values = Vec::with_capacity(FEATURE_LEN);
    for kind in LandmarkType::FEATURE_ORDER {
        match face.find(kind) {
            Some(p) => {
                values.push((p.x - left_eye.x) / eye_distance);
                values.push((p.y - left_eye.y) / eye_distance);
                values.push((p.z - left_eye.z) / eye_distance);
            }
            None => {
                log::trace!("landmark {} not present, using sentinel", kind);
                values.extend_from_slice(&[f32::NAN; 3]);
            }
        }
    }

    Ok(FeatureVector {
        vector: Array1::from_vec(values),
    })
}
