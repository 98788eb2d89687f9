use anyhow::Context;
use log::{info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::command::{self, Command, HELP_TEXT};
use crate::operations::Operations;
use crate::payload::{Attachment, InboundMessage};
use crate::resolver::FolderPath;
use crate::storages::DriveBackend;
use crate::summary::Summarizer;

pub const SUMMARY_PENDING: &str = "⏳ Generating summaries... This may take a moment.";
pub const MISSING_ATTACHMENT: &str = "Please attach a file with the UPLOAD command.";
pub const STORAGE_UNAVAILABLE: &str = "⚠️ Storage backend is not connected. Check the server logs.";
pub const GENERIC_FAILURE: &str = "❌ An error occurred while processing your request.";

pub struct Assistant {
    operations: Option<Operations>,
    temp_dir: PathBuf,
}

impl Assistant {
    pub fn new(
        backend: Option<Arc<dyn DriveBackend>>,
        summarizer: Arc<dyn Summarizer>,
        summary_max_tokens: u32,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            operations: backend
                .map(|backend| Operations::new(backend, summarizer, summary_max_tokens)),
            temp_dir,
        }
    }

    pub fn storage_name(&self) -> Option<String> {
        self.operations.as_ref().map(Operations::backend_name)
    }

    pub async fn handle_message(&self, message: InboundMessage) -> anyhow::Result<Vec<String>> {
        let command = match command::parse(&message.body) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(Vec::new()),
            Err(usage) => return Ok(vec![usage.to_string()]),
        };
        info!("Command from {}: {:?}", message.sender(), command);

        if command == Command::Help {
            return Ok(vec![HELP_TEXT.to_string()]);
        }

        let ops = match &self.operations {
            Some(ops) => ops,
            None => return Ok(vec![STORAGE_UNAVAILABLE.to_string()]),
        };

        let replies = match command {
            Command::List { folder } => vec![ops.list_files(&folder).await],
            Command::Delete { folder, file } => vec![ops.delete_file(&folder, &file).await],
            Command::Move {
                source,
                source_folder,
                file,
                destination,
            } => vec![
                ops.move_file(&source, &source_folder, &file, &destination)
                    .await,
            ],
            Command::Rename {
                folder,
                old_name,
                new_name,
            } => vec![ops.rename_file(&folder, &old_name, &new_name).await],
            Command::Summary { folder } => vec![
                SUMMARY_PENDING.to_string(),
                ops.summarize_folder(&folder).await,
            ],
            Command::Upload {
                file_name,
                destination,
            } => match message.attachment {
                Some(attachment) => vec![
                    self.upload(ops, &file_name, &destination, attachment)
                        .await?,
                ],
                None => vec![MISSING_ATTACHMENT.to_string()],
            },
            Command::Help => vec![HELP_TEXT.to_string()],
        };

        Ok(replies)
    }

    async fn upload(
        &self,
        ops: &Operations,
        requested_name: &str,
        destination: &FolderPath,
        attachment: Attachment,
    ) -> anyhow::Result<String> {
        let file_name = upload_name(attachment.filename.as_deref(), requested_name);
        let mime_type = attachment
            .mime_type
            .filter(|m| !m.is_empty())
            .or_else(|| {
                mime_guess::from_path(&file_name)
                    .first()
                    .map(|m| m.essence_str().to_string())
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        // Removed on drop if anything below returns early
        let mut temp = tempfile::Builder::new()
            .prefix("upload_")
            .tempfile_in(&self.temp_dir)
            .with_context(|| {
                format!("creating temporary file in {}", self.temp_dir.display())
            })?;
        temp.write_all(&attachment.data)
            .context("writing attachment to temporary file")?;

        let reply = ops
            .upload_file(temp.path(), &file_name, &mime_type, destination)
            .await;

        if let Err(e) = temp.close() {
            warn!("Failed to remove temporary upload file: {}", e);
        }
        Ok(reply)
    }
}

fn upload_name(attachment_name: Option<&str>, requested_name: &str) -> String {
    attachment_name
        .and_then(|name| Path::new(name).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| requested_name.to_string())
}
