use log::error;
use std::path::Path;
use std::sync::Arc;

use crate::resolver::{FolderPath, PathResolver, Resolution};
use crate::storages::{ChildQuery, DriveBackend, NewFile, StorageError};
use crate::summary::{ContentKind, FolderSummary, Summarizer};

#[derive(Clone)]
pub struct Operations {
    backend: Arc<dyn DriveBackend>,
    resolver: PathResolver,
    summarizer: Arc<dyn Summarizer>,
    summary_max_tokens: u32,
}

fn or_error(action: &str, result: Result<String, StorageError>) -> String {
    result.unwrap_or_else(|e| {
        error!("Error {}: {}", action, e);
        format!("Error {}: {}", action, e)
    })
}

fn format_size(size: Option<u64>) -> String {
    match size {
        Some(bytes) => format!("{:.2} KB", bytes as f64 / 1024.0),
        None => "N/A".to_string(),
    }
}

impl Operations {
    pub fn new(
        backend: Arc<dyn DriveBackend>,
        summarizer: Arc<dyn Summarizer>,
        summary_max_tokens: u32,
    ) -> Self {
        Self {
            resolver: PathResolver::new(backend.clone()),
            backend,
            summarizer,
            summary_max_tokens,
        }
    }

    pub fn backend_name(&self) -> String {
        self.backend.name()
    }

    pub async fn list_files(&self, folder: &FolderPath) -> String {
        or_error("listing files", self.try_list_files(folder).await)
    }

    async fn try_list_files(&self, folder: &FolderPath) -> Result<String, StorageError> {
        let folder_id = match self.resolver.resolve_folder(folder).await?.id() {
            Some(id) => id,
            None => return Ok(format!("Folder \"{}\" not found.", folder)),
        };

        let mut files = self
            .backend
            .list_children(&ChildQuery::under(&folder_id))
            .await?;
        if files.is_empty() {
            return Ok(format!("No files found in \"{}\".", folder));
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));

        let mut result = format!("📁 Files in \"{}\":\n\n", folder);
        for (index, file) in files.iter().enumerate() {
            result.push_str(&format!(
                "{}. {}\n   Type: {}\n   Size: {}\n\n",
                index + 1,
                file.name,
                file.mime_type.as_deref().unwrap_or("unknown"),
                format_size(file.size)
            ));
        }
        Ok(result)
    }

    pub async fn delete_file(&self, folder: &FolderPath, file_name: &str) -> String {
        or_error("deleting file", self.try_delete_file(folder, file_name).await)
    }

    async fn try_delete_file(
        &self,
        folder: &FolderPath,
        file_name: &str,
    ) -> Result<String, StorageError> {
        let file_id = match self.resolver.resolve_file(folder, file_name).await?.id() {
            Some(id) => id,
            None => {
                return Ok(format!(
                    "File \"{}\" not found in \"{}\".",
                    file_name, folder
                ))
            }
        };

        self.backend.delete(&file_id).await?;
        Ok(format!(
            "✅ Successfully deleted \"{}\" from \"{}\".",
            file_name, folder
        ))
    }

    pub async fn move_file(
        &self,
        source: &str,
        source_folder: &FolderPath,
        file_name: &str,
        destination: &FolderPath,
    ) -> String {
        or_error(
            "moving file",
            self.try_move_file(source, source_folder, file_name, destination)
                .await,
        )
    }

    async fn try_move_file(
        &self,
        source: &str,
        source_folder: &FolderPath,
        file_name: &str,
        destination: &FolderPath,
    ) -> Result<String, StorageError> {
        let file_id = match self.resolver.resolve_file(source_folder, file_name).await? {
            Resolution::Found(id) => id,
            Resolution::Missing { .. } => return Ok(format!("File not found: {}", source)),
        };
        let destination_id = match self.resolver.resolve_folder(destination).await? {
            Resolution::Found(id) => id,
            Resolution::Missing { .. } => {
                return Ok(format!(
                    "Destination folder \"{}\" not found.",
                    destination
                ))
            }
        };

        let previous_parents = self.backend.get_parents(&file_id).await?;
        self.backend
            .update_parents(&file_id, &destination_id, &previous_parents)
            .await?;

        Ok(format!(
            "✅ Successfully moved \"{}\" to \"{}\".",
            file_name, destination
        ))
    }

    pub async fn rename_file(&self, folder: &FolderPath, old_name: &str, new_name: &str) -> String {
        or_error(
            "renaming file",
            self.try_rename_file(folder, old_name, new_name).await,
        )
    }

    async fn try_rename_file(
        &self,
        folder: &FolderPath,
        old_name: &str,
        new_name: &str,
    ) -> Result<String, StorageError> {
        let file_id = match self.resolver.resolve_file(folder, old_name).await?.id() {
            Some(id) => id,
            None => {
                return Ok(format!(
                    "File \"{}\" not found in \"{}\".",
                    old_name, folder
                ))
            }
        };

        self.backend.rename(&file_id, new_name).await?;
        Ok(format!(
            "✅ Successfully renamed \"{}\" to \"{}\".",
            old_name, new_name
        ))
    }

    // The caller owns the local file and removes it
    pub async fn upload_file(
        &self,
        local_path: &Path,
        file_name: &str,
        mime_type: &str,
        destination: &FolderPath,
    ) -> String {
        or_error(
            "uploading file",
            self.try_upload_file(local_path, file_name, mime_type, destination)
                .await,
        )
    }

    async fn try_upload_file(
        &self,
        local_path: &Path,
        file_name: &str,
        mime_type: &str,
        destination: &FolderPath,
    ) -> Result<String, StorageError> {
        let folder_id = match self.resolver.resolve_folder(destination).await?.id() {
            Some(id) => id,
            None => return Ok(format!("Folder \"{}\" not found.", destination)),
        };

        let contents = tokio::fs::read(local_path).await?;
        let created = self
            .backend
            .create_file(NewFile {
                name: file_name.to_string(),
                parent_id: folder_id,
                mime_type: mime_type.to_string(),
                contents,
            })
            .await?;

        let mut reply = format!(
            "✅ Successfully uploaded \"{}\" to \"{}\".",
            created.name, destination
        );
        if let Some(link) = created.web_view_link {
            reply.push_str(&format!("\nLink: {}", link));
        }
        Ok(reply)
    }

    pub async fn summarize_folder(&self, folder: &FolderPath) -> String {
        or_error("summarizing folder", self.try_summarize_folder(folder).await)
    }

    async fn try_summarize_folder(&self, folder: &FolderPath) -> Result<String, StorageError> {
        let folder_id = match self.resolver.resolve_folder(folder).await?.id() {
            Some(id) => id,
            None => return Ok(format!("Folder \"{}\" not found.", folder)),
        };

        let candidates = self
            .backend
            .list_children(&ChildQuery::under(&folder_id).with_mime_types(&ContentKind::MIME_TYPES))
            .await?;
        if candidates.is_empty() {
            return Ok(format!("No supported files found in \"{}\".", folder));
        }

        let summary = FolderSummary::build(
            folder.as_str(),
            candidates,
            self.backend.as_ref(),
            self.summarizer.as_ref(),
            self.summary_max_tokens,
        )
        .await;
        Ok(summary.render())
    }
}
