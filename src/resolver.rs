use log::debug;
use std::fmt;
use std::sync::Arc;

use crate::storages::{ChildQuery, DriveBackend, StorageError};

/// Slash-delimited folder path. Empty segments are dropped, so `""`, `"/"`
/// and `"//"` all denote the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderPath {
    raw: String,
    segments: Vec<String>,
}

impl FolderPath {
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            segments: raw
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(String),
    Missing { segment: String },
}

impl Resolution {
    pub fn id(self) -> Option<String> {
        match self {
            Resolution::Found(id) => Some(id),
            Resolution::Missing { .. } => None,
        }
    }
}

#[derive(Clone)]
pub struct PathResolver {
    backend: Arc<dyn DriveBackend>,
}

impl PathResolver {
    pub fn new(backend: Arc<dyn DriveBackend>) -> Self {
        Self { backend }
    }

    pub async fn resolve_folder(&self, path: &FolderPath) -> Result<Resolution, StorageError> {
        let mut current = self.backend.root_id();

        for segment in path.segments() {
            let query = ChildQuery::under(&current).named(segment).folders();
            let matches = self.backend.list_children(&query).await?;

            match matches.into_iter().next() {
                Some(folder) => current = folder.id,
                None => {
                    debug!("Folder segment {:?} of {:?} not found", segment, path.as_str());
                    return Ok(Resolution::Missing {
                        segment: segment.clone(),
                    });
                }
            }
        }

        Ok(Resolution::Found(current))
    }

    pub async fn resolve_file(
        &self,
        folder: &FolderPath,
        file_name: &str,
    ) -> Result<Resolution, StorageError> {
        let folder_id = match self.resolve_folder(folder).await? {
            Resolution::Found(id) => id,
            missing => return Ok(missing),
        };

        let query = ChildQuery::under(&folder_id).named(file_name);
        // Duplicate names resolve to whatever the backend lists first
        match self.backend.list_children(&query).await?.into_iter().next() {
            Some(entry) => Ok(Resolution::Found(entry.id)),
            None => Ok(Resolution::Missing {
                segment: file_name.to_string(),
            }),
        }
    }
}
