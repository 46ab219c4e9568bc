use async_trait::async_trait;
use facefind_vision::corpus::{ListedItem, ListingPage, PageRequest};
use facefind_vision::error::SourceError;
use facefind_vision::{CorpusSource, ImagePayload, ImageRef};
use reqwest::{Client, Response};
use serde::Deserialize;

use crate::credentials::AccessToken;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType)";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
}

/// A folder that can be searched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

/// Client for a Drive v3 style files API.
#[derive(Clone)]
pub struct DriveClient {
    client: Client,
    endpoint: String,
    token: AccessToken,
}

impl DriveClient {
    pub fn new(client: Client, endpoint: &str, token: AccessToken) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.endpoint)
    }

    async fn list(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FileList, SourceError> {
        let page_size = page_size.to_string();
        let params = [
            ("q", query),
            ("pageSize", page_size.as_str()),
            ("fields", LIST_FIELDS),
            ("includeItemsFromAllDrives", "true"),
            ("supportsAllDrives", "true"),
            ("pageToken", page_token.unwrap_or("")),
        ];

        let resp = self
            .client
            .get(self.files_url())
            .bearer_auth(self.token.secret())
            .query(&params)
            .send()
            .await
            .map_err(transport)?;

        check_status(resp)
            .await?
            .json::<FileList>()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))
    }

    /// Every folder visible to the token, across all pages.
    pub async fn list_folders(&self) -> Result<Vec<Folder>, SourceError> {
        let query = format!("mimeType='{}' and trashed=false", FOLDER_MIME_TYPE);
        let mut folders = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list(&query, 1000, page_token.as_deref()).await?;
            folders.extend(page.files.into_iter().map(|f| Folder {
                id: f.id,
                name: f.name,
            }));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        log::debug!("Found {} folder(s)", folders.len());
        Ok(folders)
    }
}

#[async_trait]
impl CorpusSource for DriveClient {
    async fn list_page(&self, request: PageRequest<'_>) -> Result<ListingPage, SourceError> {
        let query = children_query(request.container_id, request.mime_types);
        let list = self
            .list(&query, request.page_size, request.page_token)
            .await?;

        Ok(ListingPage {
            items: list
                .files
                .into_iter()
                .map(|f| ListedItem {
                    id: f.id,
                    name: f.name,
                    mime_type: f.mime_type,
                })
                .collect(),
            next_page_token: list.next_page_token,
        })
    }

    async fn fetch(&self, image: &ImageRef) -> Result<ImagePayload, SourceError> {
        let resp = self
            .client
            .get(format!("{}/{}", self.files_url(), image.id))
            .bearer_auth(self.token.secret())
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(transport)?;

        let bytes = check_status(resp).await?.bytes().await.map_err(transport)?;
        log::trace!("fetched {} ({} bytes)", image, bytes.len());
        Ok(ImagePayload::new(image.id.clone(), bytes.to_vec()))
    }
}

/// Search expression selecting direct children of `container_id` with one of `mime_types`.
pub fn children_query(container_id: &str, mime_types: &[String]) -> String {
    let mut query = format!(
        "'{}' in parents and trashed=false",
        container_id.replace('\\', "\\\\").replace('\'', "\\'")
    );
    if !mime_types.is_empty() {
        let types: Vec<String> = mime_types
            .iter()
            .map(|m| format!("mimeType='{}'", m))
            .collect();
        query.push_str(&format!(" and ({})", types.join(" or ")));
    }
    query
}

async fn check_status(resp: Response) -> Result<Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status.canonical_reason().unwrap_or("unknown").to_string()
    } else {
        body
    };
    Err(SourceError::Status {
        status: status.as_u16(),
        message,
    })
}

fn transport(e: reqwest::Error) -> SourceError {
    SourceError::Transport(e.to_string())
}
