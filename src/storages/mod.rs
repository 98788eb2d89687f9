use async_trait::async_trait;
use thiserror::Error;

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
pub const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";
pub const PLAIN_TEXT_MIME: &str = "text/plain";
pub const PDF_MIME: &str = "application/pdf";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("\"{0}\" already exists there")]
    AlreadyExists(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Drive API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Authorization failed: {0}")]
    Auth(String),
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Folder,
    File,
}

#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub kind: EntryKind,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ChildQuery {
    pub parent_id: String,
    pub name: Option<String>,
    pub folders_only: bool,
    pub mime_types: Vec<String>,
}

impl ChildQuery {
    pub fn under(parent_id: &str) -> Self {
        Self {
            parent_id: parent_id.to_string(),
            ..Default::default()
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn folders(mut self) -> Self {
        self.folders_only = true;
        self
    }

    pub fn with_mime_types(mut self, mime_types: &[&str]) -> Self {
        self.mime_types = mime_types.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn matches(&self, entry: &RemoteEntry) -> bool {
        if self.folders_only && entry.kind != EntryKind::Folder {
            return false;
        }
        if let Some(name) = &self.name {
            if &entry.name != name {
                return false;
            }
        }
        if !self.mime_types.is_empty() {
            return entry
                .mime_type
                .as_ref()
                .map(|m| self.mime_types.contains(m))
                .unwrap_or(false);
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub parent_id: String,
    pub mime_type: String,
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CreatedFile {
    pub id: String,
    pub name: String,
    pub web_view_link: Option<String>,
}

#[async_trait]
pub trait DriveBackend: Send + Sync {
    fn name(&self) -> String;
    fn root_id(&self) -> String;
    async fn list_children(&self, query: &ChildQuery) -> Result<Vec<RemoteEntry>, StorageError>;
    async fn get_parents(&self, id: &str) -> Result<Vec<String>, StorageError>;
    /// Adds `add_parent` and removes every id in `remove_parents` in a single
    /// backend call.
    async fn update_parents(
        &self,
        id: &str,
        add_parent: &str,
        remove_parents: &[String],
    ) -> Result<(), StorageError>;
    async fn rename(&self, id: &str, new_name: &str) -> Result<(), StorageError>;
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
    async fn create_file(&self, file: NewFile) -> Result<CreatedFile, StorageError>;
    async fn export_text(&self, id: &str) -> Result<String, StorageError>;
    async fn download_text(&self, id: &str) -> Result<String, StorageError>;
}

pub mod google;
pub mod local;
#[cfg(test)]
pub mod memory;
