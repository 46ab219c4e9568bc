use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::corpus::{
    CorpusFetcher, CorpusSource, ImagePayload, ImageRef, PartialEnumeration, DEFAULT_PAGE_SIZE,
    IMAGE_MIME_TYPES,
};
use crate::detector::FaceDetector;
use crate::error::{RunError, UnitError};
use crate::face::{self, FeatureVector};
use crate::locator::ContainerLocator;
use crate::matcher::{Matcher, Score, DEFAULT_THRESHOLD};

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub threshold: f32,
    pub page_size: u32,
    /// Upper bound on units in flight at once.
    pub max_concurrency: usize,
    pub mime_types: Vec<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            page_size: DEFAULT_PAGE_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            mime_types: IMAGE_MIME_TYPES.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Append-only status log, optionally mirrored to an observer channel.
#[derive(Debug, Default)]
pub struct Progress {
    entries: Vec<String>,
    observer: Option<mpsc::UnboundedSender<String>>,
}

impl Progress {
    pub fn new(observer: Option<mpsc::UnboundedSender<String>>) -> Self {
        Self {
            entries: Vec::new(),
            observer,
        }
    }

    pub fn emit(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::debug!("{}", message);
        if let Some(observer) = &self.observer {
            // A dropped receiver only means nobody is watching anymore
            let _ = observer.send(message.clone());
        }
        self.entries.push(message);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<String> {
        self.entries
    }
}

/// Terminal outcome of one corpus item.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub image: ImageRef,
    pub is_match: bool,
    /// `None` when the item failed before scoring or the distance is not a number.
    pub distance: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchedImage {
    pub image: ImageRef,
    pub payload: ImagePayload,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitFailure {
    pub image: ImageRef,
    pub error: UnitError,
}

#[derive(Debug, Default)]
pub struct MatchReport {
    pub matches: Vec<MatchedImage>,
    pub results: Vec<MatchResult>,
    pub failures: Vec<UnitFailure>,
    pub progress: Vec<String>,
    /// Set when listing stopped early; matching still ran on what was listed.
    pub partial: Option<PartialEnumeration>,
    pub cancelled: bool,
}

impl MatchReport {
    /// True when every listed page was fetched and no cancellation occurred.
    pub fn is_complete_scan(&self) -> bool {
        self.partial.is_none() && !self.cancelled
    }

    pub fn failure_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.error.kind()).or_insert(0) += 1;
        }
        counts
    }
}

struct Scored {
    score: Score,
    payload: ImagePayload,
}

struct UnitOutcome {
    seq: u64,
    image: ImageRef,
    result: Result<Scored, UnitError>,
}

/// Sole writer of a run's aggregate collections.
#[derive(Default)]
struct Collector {
    results: Vec<MatchResult>,
    matches: Vec<MatchedImage>,
    failures: Vec<UnitFailure>,
    in_flight: HashMap<u64, ImageRef>,
    next_seq: u64,
}

impl Collector {
    /// Register a unit about to be spawned. The sequence number comes back in its outcome.
    fn track(&mut self, image: ImageRef) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight.insert(seq, image);
        seq
    }

    fn absorb(&mut self, joined: Result<UnitOutcome, JoinError>) {
        let UnitOutcome { seq, image, result } = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                // The image stays in `in_flight` and is settled by `finish`
                log::error!("unit task did not complete: {}", e);
                return;
            }
        };
        self.in_flight.remove(&seq);

        match result {
            Ok(Scored { score, payload }) => {
                log::debug!("{}: distance {:.4}", image, score.distance);
                self.results.push(MatchResult {
                    image: image.clone(),
                    is_match: score.is_match,
                    distance: (!score.distance.is_nan()).then_some(score.distance),
                });
                if score.is_match {
                    self.matches.push(MatchedImage {
                        image,
                        payload,
                        distance: score.distance,
                    });
                }
            }
            Err(error) => {
                match &error {
                    UnitError::NoFaceDetected => log::debug!("{}: no face detected", image),
                    UnitError::Panicked(_) => log::error!("{}: {}", image, error),
                    _ => log::warn!("{}: {}", image, error),
                }
                self.results.push(MatchResult {
                    image: image.clone(),
                    is_match: false,
                    distance: None,
                });
                self.failures.push(UnitFailure { image, error });
            }
        }
    }

    /// Settle every tracked unit that never reported back, so each spawned
    /// image still ends with exactly one result.
    fn finish(&mut self) {
        let mut lost: Vec<_> = self.in_flight.drain().collect();
        lost.sort_by_key(|(seq, _)| *seq);
        for (_, image) in lost {
            self.results.push(MatchResult {
                image: image.clone(),
                is_match: false,
                distance: None,
            });
            self.failures.push(UnitFailure {
                image,
                error: UnitError::Interrupted,
            });
        }
    }
}

/// Finds corpus images showing the same face as a reference photo.
pub struct MatchPipeline {
    source: Arc<dyn CorpusSource>,
    detector: Arc<dyn FaceDetector>,
    options: PipelineOptions,
    observer: Option<mpsc::UnboundedSender<String>>,
}

impl MatchPipeline {
    pub fn new(
        source: Arc<dyn CorpusSource>,
        detector: Arc<dyn FaceDetector>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            detector,
            options,
            observer: None,
        }
    }

    /// Mirror progress entries into `observer` as they are emitted.
    pub fn with_progress_observer(mut self, observer: mpsc::UnboundedSender<String>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Detect and normalize the reference face.
    pub async fn reference_vector(&self, photo: &ImagePayload) -> Result<FeatureVector, RunError> {
        let face = self
            .detector
            .detect(photo)
            .await
            .map_err(RunError::ReferenceDetection)?
            .ok_or(RunError::NoReferenceFace)?;
        let vector = face::normalize(&face).map_err(RunError::ReferenceLandmarks)?;
        if vector.has_missing() {
            log::warn!("reference face is missing landmarks, no image can match it");
        }
        Ok(vector)
    }

    /// Search `container` for faces matching `reference`.
    ///
    /// Only reference-photo problems fail the run. Every per-image failure is
    /// recorded in the report as a non-match. Once `cancel` fires no new units
    /// are started and those already running are drained.
    pub async fn run(
        &self,
        reference: &ImagePayload,
        container: &ContainerLocator,
        cancel: CancellationToken,
    ) -> Result<MatchReport, RunError> {
        let mut progress = Progress::new(self.observer.clone());

        progress.emit("Calculating reference face annotations...");
        let reference = Arc::new(self.reference_vector(reference).await?);
        progress.emit("Reference face computed.");

        let matcher = Matcher::new(self.options.threshold);
        let semaphore = Arc::new(Semaphore::new(
            self.options
                .max_concurrency
                .clamp(1, Semaphore::MAX_PERMITS),
        ));
        let mut units: JoinSet<UnitOutcome> = JoinSet::new();
        let mut collector = Collector::default();

        let mime_types: Vec<&str> = self.options.mime_types.iter().map(String::as_str).collect();
        let mut listing = CorpusFetcher::new(self.source.clone()).list_images(
            container.id(),
            &mime_types,
            self.options.page_size,
        );

        let mut enumerated: Vec<ImageRef> = Vec::new();
        let mut partial = None;
        let mut cancelled = false;
        let mut comparing = false;

        progress.emit(format!("Fetching photos from {}...", container));
        'listing: loop {
            let page = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                page = listing.next_page() => page,
            };

            let page = match page {
                None => break,
                Some(Ok(page)) => page,
                Some(Err(error)) => {
                    partial = Some(PartialEnumeration {
                        images: enumerated.clone(),
                        pages_fetched: listing.pages_fetched(),
                        error,
                    });
                    break;
                }
            };

            if !comparing {
                progress.emit("Comparing photos...");
                comparing = true;
            }

            for image in page {
                let permit = loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            cancelled = true;
                            break 'listing;
                        }
                        Some(joined) = units.join_next(), if !units.is_empty() => {
                            collector.absorb(joined);
                        }
                        permit = semaphore.clone().acquire_owned() => match permit {
                            Ok(permit) => break permit,
                            Err(_) => break 'listing,
                        },
                    }
                };

                enumerated.push(image.clone());
                let seq = collector.track(image.clone());
                let source = self.source.clone();
                let detector = self.detector.clone();
                let reference = reference.clone();
                units.spawn(async move {
                    let _permit = permit;
                    let result = AssertUnwindSafe(run_unit(
                        source.as_ref(),
                        detector.as_ref(),
                        &image,
                        &reference,
                        matcher,
                    ))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(UnitError::Panicked(panic_message(panic))));
                    UnitOutcome { seq, image, result }
                });
            }
        }

        if cancelled {
            progress.emit(format!(
                "Cancelled after listing {} photo(s), waiting for {} running comparison(s)...",
                enumerated.len(),
                units.len()
            ));
        } else if let Some(partial) = &partial {
            progress.emit(format!(
                "Listing stopped early, continuing with {} photo(s): {}",
                enumerated.len(),
                partial.error
            ));
        } else {
            progress.emit(format!(
                "Done fetching photos from {}: {} photo(s).",
                container,
                enumerated.len()
            ));
        }

        while let Some(joined) = units.join_next().await {
            collector.absorb(joined);
        }
        collector.finish();

        let Collector {
            results,
            matches,
            failures,
            ..
        } = collector;

        progress.emit(format!(
            "Done comparing matching photos. Found {} photos.",
            matches.len()
        ));
        if !failures.is_empty() {
            progress.emit(format!("{} photo(s) could not be compared.", failures.len()));
        }

        Ok(MatchReport {
            matches,
            results,
            failures,
            progress: progress.into_entries(),
            partial,
            cancelled,
        })
    }
}

/// Fetch, detect, normalize and score one corpus image.
async fn run_unit(
    source: &dyn CorpusSource,
    detector: &dyn FaceDetector,
    image: &ImageRef,
    reference: &FeatureVector,
    matcher: Matcher,
) -> Result<Scored, UnitError> {
    let payload = source.fetch(image).await?;
    let face = detector
        .detect(&payload)
        .await?
        .ok_or(UnitError::NoFaceDetected)?;
    let candidate = face::normalize(&face)?;
    let score = matcher.score(reference, &candidate)?;
    Ok(Scored { score, payload })
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_mirrors_to_observer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut progress = Progress::new(Some(tx));
        progress.emit("one");
        progress.emit(String::from("two"));
        assert_eq!(progress.entries(), ["one", "two"]);
        assert_eq!(rx.try_recv().unwrap(), "one");
        assert_eq!(rx.try_recv().unwrap(), "two");
    }

    #[test]
    fn test_progress_survives_dropped_observer() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut progress = Progress::new(Some(tx));
        progress.emit("still recorded");
        assert_eq!(progress.into_entries(), vec!["still recorded".to_string()]);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7u8)), "unknown panic");
    }

    fn image(id: &str) -> ImageRef {
        ImageRef {
            id: id.into(),
            display_name: format!("{}.jpg", id),
            container_id: "c".into(),
        }
    }

    #[tokio::test]
    async fn test_unit_lost_to_join_error_still_gets_a_result() {
        let mut collector = Collector::default();
        let kept = collector.track(image("kept"));
        let _lost = collector.track(image("lost"));

        let mut units: JoinSet<UnitOutcome> = JoinSet::new();
        let handle = units.spawn(futures::future::pending());
        handle.abort();
        let joined = units.join_next().await.unwrap();
        assert!(joined.as_ref().is_err_and(|e| e.is_cancelled()));
        collector.absorb(joined);

        collector.absorb(Ok(UnitOutcome {
            seq: kept,
            image: image("kept"),
            result: Err(UnitError::NoFaceDetected),
        }));
        collector.finish();

        assert_eq!(collector.results.len(), 2);
        assert!(collector.in_flight.is_empty());
        let lost = collector
            .failures
            .iter()
            .find(|f| f.image.id == "lost")
            .unwrap();
        assert_eq!(lost.error, UnitError::Interrupted);
        let result = collector
            .results
            .iter()
            .find(|r| r.image.id == "lost")
            .unwrap();
        assert!(!result.is_match);
        assert_eq!(result.distance, None);
    }

    #[test]
    fn test_failure_counts() {
        let image = ImageRef {
            id: "1".into(),
            display_name: "1.jpg".into(),
            container_id: "c".into(),
        };
        let report = MatchReport {
            failures: vec![
                UnitFailure {
                    image: image.clone(),
                    error: UnitError::NoFaceDetected,
                },
                UnitFailure {
                    image: image.clone(),
                    error: UnitError::NoFaceDetected,
                },
                UnitFailure {
                    image,
                    error: UnitError::Panicked("x".into()),
                },
            ],
            ..Default::default()
        };
        let counts = report.failure_counts();
        assert_eq!(counts.get("no_face"), Some(&2));
        assert_eq!(counts.get("panicked"), Some(&1));
        assert!(report.is_complete_scan());
    }
}
