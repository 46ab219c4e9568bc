use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SourceError;

/// Media types enumerated by default.
pub const IMAGE_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// A corpus image, identified by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: String,
    pub display_name: String,
    pub container_id: String,
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

/// Raw bytes of one image.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub id: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            bytes,
        }
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("id", &self.id)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// One entry of a listing page as reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedItem {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub items: Vec<ListedItem>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub container_id: &'a str,
    pub mime_types: &'a [String],
    pub page_size: u32,
    pub page_token: Option<&'a str>,
}

/// Remote container of images: paginated listing plus payload retrieval.
#[async_trait]
pub trait CorpusSource: Send + Sync {
    async fn list_page(&self, request: PageRequest<'_>) -> Result<ListingPage, SourceError>;

    async fn fetch(&self, image: &ImageRef) -> Result<ImagePayload, SourceError>;
}

/// Listing stopped after a failed page. Carries what was collected before the failure.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("enumeration stopped after {pages_fetched} page(s) with {} image(s): {error}", .images.len())]
pub struct PartialEnumeration {
    pub images: Vec<ImageRef>,
    pub pages_fetched: usize,
    pub error: SourceError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Enumeration {
    Complete(Vec<ImageRef>),
    Partial(PartialEnumeration),
}

impl Enumeration {
    pub fn images(&self) -> &[ImageRef] {
        match self {
            Enumeration::Complete(images) => images,
            Enumeration::Partial(partial) => &partial.images,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Enumeration::Complete(_))
    }
}

/// Starts paged enumerations over a [`CorpusSource`].
#[derive(Clone)]
pub struct CorpusFetcher {
    source: Arc<dyn CorpusSource>,
}

impl CorpusFetcher {
    pub fn new(source: Arc<dyn CorpusSource>) -> Self {
        Self { source }
    }

    /// Begin a fresh enumeration of `container_id`. Nothing is requested until
    /// the first call to [`ImageListing::next_page`].
    pub fn list_images(
        &self,
        container_id: &str,
        mime_filter: &[&str],
        page_size: u32,
    ) -> ImageListing {
        ImageListing {
            source: self.source.clone(),
            container_id: container_id.to_string(),
            mime_types: mime_filter.iter().map(|m| m.to_string()).collect(),
            page_size: page_size.max(1),
            cursor: Cursor::Start,
            pages_fetched: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Lazy, single-pass enumeration of a container.
pub struct ImageListing {
    source: Arc<dyn CorpusSource>,
    container_id: String,
    mime_types: Vec<String>,
    page_size: u32,
    cursor: Cursor,
    pages_fetched: usize,
}

impl ImageListing {
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetch the next page. Returns `None` once the continuation token is
    /// exhausted or after a page has failed.
    pub async fn next_page(&mut self) -> Option<Result<Vec<ImageRef>, SourceError>> {
        let token = match &self.cursor {
            Cursor::Done => return None,
            Cursor::Start => None,
            Cursor::Next(token) => Some(token.as_str()),
        };

        let request = PageRequest {
            container_id: &self.container_id,
            mime_types: &self.mime_types,
            page_size: self.page_size,
            page_token: token,
        };

        let page = match self.source.list_page(request).await {
            Ok(page) => page,
            Err(e) => {
                log::warn!(
                    "listing {} failed after {} page(s): {}",
                    self.container_id,
                    self.pages_fetched,
                    e
                );
                self.cursor = Cursor::Done;
                return Some(Err(e));
            }
        };

        self.pages_fetched += 1;
        self.cursor = match page.next_page_token {
            Some(token) if !token.is_empty() => Cursor::Next(token),
            _ => Cursor::Done,
        };

        let total = page.items.len();
        let images: Vec<ImageRef> = page
            .items
            .into_iter()
            .filter(|item| self.mime_types.iter().any(|m| *m == item.mime_type))
            .map(|item| ImageRef {
                id: item.id,
                display_name: item.name,
                container_id: self.container_id.clone(),
            })
            .collect();

        log::debug!(
            "page {} of {}: {} item(s), {} image(s)",
            self.pages_fetched,
            self.container_id,
            total,
            images.len()
        );

        Some(Ok(images))
    }

    /// Drain the whole listing.
    pub async fn collect(mut self) -> Enumeration {
        let mut images = Vec::new();
        while let Some(page) = self.next_page().await {
            match page {
                Ok(mut page) => images.append(&mut page),
                Err(error) => {
                    return Enumeration::Partial(PartialEnumeration {
                        images,
                        pages_fetched: self.pages_fetched,
                        error,
                    })
                }
            }
        }
        Enumeration::Complete(images)
    }
}
