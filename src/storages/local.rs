use super::{
    ChildQuery, CreatedFile, DriveBackend, EntryKind, NewFile, RemoteEntry, StorageError,
    FOLDER_MIME,
};
use async_trait::async_trait;
use mime_guess::from_path;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const LOCAL_SCHEME: &str = "local://";

// Entry ids are `local://` followed by the path relative to the root
#[derive(Debug)]
pub struct LocalStorage {
    root: String,
}

impl LocalStorage {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
        }
    }

    fn root_path(&self) -> Result<PathBuf, StorageError> {
        PathBuf::from(&self.root)
            .canonicalize()
            .map_err(StorageError::Io)
    }

    // Parse and validate an entry id
    fn resolve_path(&self, id: &str) -> Result<PathBuf, StorageError> {
        let clean_path = id.trim_start_matches(LOCAL_SCHEME).trim_start_matches('/');

        let root_path = self.root_path()?;
        let full_path = root_path.join(clean_path);

        let canonical_path = if full_path.exists() {
            full_path.canonicalize().map_err(StorageError::Io)?
        } else {
            // For non-existent paths, canonicalize the parent and then append the filename
            let parent = full_path.parent().ok_or_else(|| {
                StorageError::InvalidPath("Invalid path: no parent directory".to_string())
            })?;
            let filename = full_path.file_name().ok_or_else(|| {
                StorageError::InvalidPath("Invalid path: no filename".to_string())
            })?;
            parent
                .canonicalize()
                .map_err(StorageError::Io)?
                .join(filename)
        };

        // Security check: ensure path is under root directory
        if !canonical_path.starts_with(&root_path) {
            return Err(StorageError::InvalidPath(
                "Path attempts to escape root directory".to_string(),
            ));
        }

        Ok(canonical_path)
    }

    fn id_for(&self, root_path: &Path, path: &Path) -> String {
        let relative = path
            .strip_prefix(root_path)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        format!("{}{}", LOCAL_SCHEME, relative)
    }

    fn validate_name(name: &str) -> Result<(), StorageError> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(StorageError::InvalidPath(format!(
                "Invalid file name: {}",
                name
            )));
        }
        Ok(())
    }

    async fn existing(&self, id: &str) -> Result<PathBuf, StorageError> {
        let full_path = self.resolve_path(id)?;
        match fs::metadata(&full_path).await {
            Ok(_) => Ok(full_path),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(format!(
                "No such file or folder: {}",
                id
            ))),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    // A directory entry is never replaced by a move, rename or upload
    async fn ensure_vacant(target: &Path) -> Result<(), StorageError> {
        if fs::try_exists(target).await? {
            return Err(Self::occupied(target));
        }
        Ok(())
    }

    fn occupied(target: &Path) -> StorageError {
        StorageError::AlreadyExists(
            target
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned(),
        )
    }
}

#[async_trait]
impl DriveBackend for LocalStorage {
    fn name(&self) -> String {
        LOCAL_SCHEME.trim_end_matches("://").to_string()
    }

    fn root_id(&self) -> String {
        LOCAL_SCHEME.to_string()
    }

    async fn list_children(&self, query: &ChildQuery) -> Result<Vec<RemoteEntry>, StorageError> {
        let full_path = self.existing(&query.parent_id).await?;
        let root_path = self.root_path()?;
        let parent_id = self.id_for(&root_path, &full_path);
        let mut entries = Vec::new();

        let mut read_dir = fs::read_dir(&full_path).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            let path_buf = entry.path();

            let name = path_buf
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned();

            let (kind, mime_type, size) = if metadata.is_dir() {
                (EntryKind::Folder, FOLDER_MIME.to_string(), None)
            } else {
                (
                    EntryKind::File,
                    from_path(&path_buf)
                        .first_or_octet_stream()
                        .essence_str()
                        .to_owned(),
                    Some(metadata.len()),
                )
            };

            let item = RemoteEntry {
                id: self.id_for(&root_path, &path_buf),
                name,
                kind,
                mime_type: Some(mime_type),
                size,
                parents: vec![parent_id.clone()],
            };
            if query.matches(&item) {
                entries.push(item);
            }
        }

        // read_dir order is platform dependent
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn get_parents(&self, id: &str) -> Result<Vec<String>, StorageError> {
        let full_path = self.existing(id).await?;
        let root_path = self.root_path()?;
        if full_path == root_path {
            return Ok(Vec::new());
        }
        Ok(full_path
            .parent()
            .map(|p| vec![self.id_for(&root_path, p)])
            .unwrap_or_default())
    }

    async fn update_parents(
        &self,
        id: &str,
        add_parent: &str,
        _remove_parents: &[String],
    ) -> Result<(), StorageError> {
        // A file on disk has exactly one parent, so moving it replaces them all
        let source = self.existing(id).await?;
        let destination_dir = self.existing(add_parent).await?;
        let file_name = source
            .file_name()
            .ok_or_else(|| StorageError::InvalidPath(id.to_string()))?;
        let target = destination_dir.join(file_name);
        if target == source {
            return Ok(());
        }
        Self::ensure_vacant(&target).await?;
        fs::rename(&source, target).await?;
        Ok(())
    }

    async fn rename(&self, id: &str, new_name: &str) -> Result<(), StorageError> {
        Self::validate_name(new_name)?;
        let source = self.existing(id).await?;
        let parent = source
            .parent()
            .ok_or_else(|| StorageError::InvalidPath(id.to_string()))?;
        let target = parent.join(new_name);
        if target == source {
            return Ok(());
        }
        Self::ensure_vacant(&target).await?;
        fs::rename(&source, target).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let full_path = self.existing(id).await?;
        if fs::metadata(&full_path).await?.is_dir() {
            fs::remove_dir_all(&full_path).await?;
        } else {
            fs::remove_file(&full_path).await?;
        }
        Ok(())
    }

    async fn create_file(&self, file: NewFile) -> Result<CreatedFile, StorageError> {
        Self::validate_name(&file.name)?;
        let parent = self.existing(&file.parent_id).await?;
        let target = parent.join(&file.name);

        let mut out = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(out) => out,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(Self::occupied(&target)),
            Err(e) => return Err(StorageError::Io(e)),
        };
        out.write_all(&file.contents).await?;
        out.flush().await?;

        let root_path = self.root_path()?;
        Ok(CreatedFile {
            id: self.id_for(&root_path, &target),
            name: file.name,
            web_view_link: Some(format!("file://{}", target.display())),
        })
    }

    async fn export_text(&self, id: &str) -> Result<String, StorageError> {
        Err(StorageError::InvalidPath(format!(
            "{} is not a native document and cannot be exported",
            id
        )))
    }

    async fn download_text(&self, id: &str) -> Result<String, StorageError> {
        let full_path = self.existing(id).await?;
        let contents = fs::read(&full_path).await?;
        Ok(String::from_utf8_lossy(&contents).into_owned())
    }
}
