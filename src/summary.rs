use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storages::{
    DriveBackend, RemoteEntry, StorageError, GOOGLE_DOC_MIME, PDF_MIME, PLAIN_TEXT_MIME,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 500;

pub const MAX_CONTENT_CHARS: usize = 10_000;
pub const MAX_DOCUMENTS: usize = 5;
pub const FALLBACK_SUMMARY: &str = "Unable to generate summary.";

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("ANTHROPIC_API_KEY is not set")]
    MissingApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Anthropic API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Summary response contained no text")]
    EmptyResponse,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        text: &str,
        document_name: &str,
        max_tokens: u32,
    ) -> Result<String, SummaryError>;
}

pub struct AnthropicSummarizer {
    client: Client,
    api_key: Option<String>,
    model: String,
}

impl AnthropicSummarizer {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<RequestMessage>,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[async_trait]
impl Summarizer for AnthropicSummarizer {
    async fn summarize(
        &self,
        text: &str,
        document_name: &str,
        max_tokens: u32,
    ) -> Result<String, SummaryError> {
        let api_key = self.api_key.as_deref().ok_or(SummaryError::MissingApiKey)?;

        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            messages: vec![RequestMessage {
                role: "user",
                content: format!(
                    "Please provide a concise summary of the following document \"{}\":\n\n{}",
                    document_name, text
                ),
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SummaryError::Api { status, message });
        }

        let body: MessagesResponse = response.json().await?;
        body.content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .ok_or(SummaryError::EmptyResponse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    PlainText,
    NativeDocument,
    PortableDocument,
}

impl ContentKind {
    pub const MIME_TYPES: [&'static str; 3] = [PDF_MIME, GOOGLE_DOC_MIME, PLAIN_TEXT_MIME];

    pub fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type {
            PLAIN_TEXT_MIME => Some(ContentKind::PlainText),
            GOOGLE_DOC_MIME => Some(ContentKind::NativeDocument),
            PDF_MIME => Some(ContentKind::PortableDocument),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum Extraction {
    Text(String),
    Unsupported,
    Failed(StorageError),
}

pub async fn extract_text(backend: &dyn DriveBackend, entry: &RemoteEntry) -> Extraction {
    let kind = entry.mime_type.as_deref().and_then(ContentKind::from_mime);
    let result = match kind {
        Some(ContentKind::NativeDocument) => backend.export_text(&entry.id).await,
        Some(ContentKind::PlainText) => backend.download_text(&entry.id).await,
        Some(ContentKind::PortableDocument) | None => return Extraction::Unsupported,
    };
    match result {
        Ok(text) => Extraction::Text(text),
        Err(e) => Extraction::Failed(e),
    }
}

pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Debug)]
pub enum DocumentOutcome {
    Summarized(String),
    Skipped,
    Failed(StorageError),
}

#[derive(Debug)]
pub struct DocumentSummary {
    pub name: String,
    pub outcome: DocumentOutcome,
}

#[derive(Debug)]
pub struct FolderSummary {
    pub folder: String,
    pub documents: Vec<DocumentSummary>,
}

impl FolderSummary {
    pub async fn build(
        folder: &str,
        candidates: Vec<RemoteEntry>,
        backend: &dyn DriveBackend,
        summarizer: &dyn Summarizer,
        max_tokens: u32,
    ) -> Self {
        let mut documents = Vec::new();

        for entry in candidates.into_iter().take(MAX_DOCUMENTS) {
            let outcome = match extract_text(backend, &entry).await {
                Extraction::Text(text) => {
                    let text = truncate_chars(&text, MAX_CONTENT_CHARS);
                    match summarizer.summarize(text, &entry.name, max_tokens).await {
                        Ok(summary) => DocumentOutcome::Summarized(summary),
                        Err(e) => {
                            warn!("Error generating summary for {}: {}", entry.name, e);
                            DocumentOutcome::Summarized(FALLBACK_SUMMARY.to_string())
                        }
                    }
                }
                Extraction::Unsupported => {
                    debug!("Skipping {}: no text extractor for its type", entry.name);
                    DocumentOutcome::Skipped
                }
                Extraction::Failed(e) => {
                    warn!("Error getting content of {}: {}", entry.name, e);
                    DocumentOutcome::Failed(e)
                }
            };
            documents.push(DocumentSummary {
                name: entry.name,
                outcome,
            });
        }

        Self {
            folder: folder.to_string(),
            documents,
        }
    }

    pub fn render(&self) -> String {
        let mut result = format!("📝 Summaries for \"{}\":\n\n", self.folder);
        for document in &self.documents {
            if let DocumentOutcome::Summarized(summary) = &document.outcome {
                result.push_str(&format!("📄 {}\n{}\n\n", document.name, summary));
            }
        }
        result
    }
}
