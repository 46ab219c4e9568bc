use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::LocatorError;

static FOLDER_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?://)?drive\.google\.com/(?:drive/(?:u/\d+/)?folders/|open\?id=)([A-Za-z0-9_-]+)")
        .expect("folder link pattern is valid")
});

static CONTAINER_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("container id pattern is valid"));

/// Identifies the container whose images are searched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerLocator {
    id: String,
}

impl ContainerLocator {
    /// Use a bare container id as given.
    pub fn from_id(id: &str) -> Result<Self, LocatorError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(LocatorError::Empty);
        }
        if !CONTAINER_ID.is_match(id) {
            return Err(LocatorError::Malformed(id.to_string()));
        }
        Ok(Self { id: id.to_string() })
    }

    /// Extract the container id from a shared folder link.
    pub fn from_link(link: &str) -> Result<Self, LocatorError> {
        let link = link.trim();
        if link.is_empty() {
            return Err(LocatorError::Empty);
        }
        FOLDER_LINK
            .captures(link)
            .and_then(|c| c.get(1))
            .map(|m| Self {
                id: m.as_str().to_string(),
            })
            .ok_or_else(|| LocatorError::Malformed(link.to_string()))
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl FromStr for ContainerLocator {
    type Err = LocatorError;

    /// Accepts either a folder link or a bare id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains('/') || s.contains('?') {
            Self::from_link(s)
        } else {
            Self::from_id(s)
        }
    }
}

impl fmt::Display for ContainerLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
