use super::{
    ChildQuery, CreatedFile, DriveBackend, EntryKind, NewFile, RemoteEntry, StorageError,
    FOLDER_MIME,
};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";
const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const ROOT_ID: &str = "root";
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, size, parents)";
// Refresh a little before the advertised expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub auth_uri: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<OAuthClient>,
    web: Option<OAuthClient>,
}

impl OAuthClient {
    pub fn from_file(path: &Path) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path)?;
        let file: CredentialsFile = serde_json::from_str(&content)?;
        file.installed.or(file.web).ok_or_else(|| {
            StorageError::Auth(format!(
                "{} has neither an \"installed\" nor a \"web\" client",
                path.display()
            ))
        })
    }

    pub fn authorization_url(&self) -> String {
        let redirect_uri = self.redirect_uris.first().map(String::as_str).unwrap_or("");
        let base = self.auth_uri.as_deref().unwrap_or(AUTH_URI);
        url::Url::parse_with_params(
            base,
            &[
                ("access_type", "offline"),
                ("scope", DRIVE_SCOPE),
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
            ],
        )
        .map(|u| u.to_string())
        .unwrap_or_else(|_| base.to_string())
    }

    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(TOKEN_URI)
    }
}

#[derive(Debug, Deserialize)]
pub struct StoredToken {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    // ms since the Unix epoch
    #[serde(default)]
    pub expiry_date: Option<u64>,
}

impl StoredToken {
    pub fn from_file(path: &Path) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn expires_at(&self) -> Option<Instant> {
        let expiry = UNIX_EPOCH + Duration::from_millis(self.expiry_date?);
        let remaining = expiry.duration_since(SystemTime::now()).unwrap_or_default();
        Some(Instant::now() + remaining)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Option<Instant>,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() + EXPIRY_MARGIN < at,
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: Option<String>,
    // Drive encodes int64 fields as strings
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    web_view_link: Option<String>,
}

impl From<DriveFile> for RemoteEntry {
    fn from(file: DriveFile) -> Self {
        let kind = if file.mime_type.as_deref() == Some(FOLDER_MIME) {
            EntryKind::Folder
        } else {
            EntryKind::File
        };
        RemoteEntry {
            id: file.id,
            name: file.name,
            kind,
            mime_type: file.mime_type,
            size: file.size.and_then(|s| s.parse().ok()),
            parents: file.parents,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn api_error(status: u16, body: String) -> StorageError {
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body);
    if status == 404 {
        let message = if message.trim().is_empty() {
            "File not found in Google Drive".to_string()
        } else {
            message
        };
        return StorageError::NotFound(message);
    }
    StorageError::Api { status, message }
}

pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

pub fn search_expression(query: &ChildQuery) -> String {
    let mut clauses = Vec::new();
    if let Some(name) = &query.name {
        clauses.push(format!("name={}", quote(name)));
    }
    clauses.push(format!("{} in parents", quote(&query.parent_id)));
    if query.folders_only {
        clauses.push(format!("mimeType={}", quote(FOLDER_MIME)));
    }
    if !query.mime_types.is_empty() {
        let alternatives: Vec<String> = query
            .mime_types
            .iter()
            .map(|m| format!("mimeType={}", quote(m)))
            .collect();
        clauses.push(format!("({})", alternatives.join(" or ")));
    }
    clauses.push("trashed=false".to_string());
    clauses.join(" and ")
}

pub struct GoogleDrive {
    client: Client,
    api_base: String,
    oauth: OAuthClient,
    refresh_token: Option<String>,
    token: RwLock<AccessToken>,
}

impl GoogleDrive {
    pub async fn connect(credentials_path: &Path, token_path: &Path) -> Result<Self, StorageError> {
        let oauth = OAuthClient::from_file(credentials_path)?;

        if !token_path.exists() {
            info!(
                "Authorize this app by visiting this url: {}",
                oauth.authorization_url()
            );
            info!("After authorization, save the token to {}", token_path.display());
            return Err(StorageError::Auth(format!(
                "token file {} not found",
                token_path.display()
            )));
        }

        let stored = StoredToken::from_file(token_path)?;
        let token = AccessToken {
            value: stored.access_token.clone().unwrap_or_default(),
            expires_at: stored.expires_at(),
        };

        let drive = Self {
            client: Client::new(),
            api_base: DRIVE_API.to_string(),
            oauth,
            refresh_token: stored.refresh_token,
            token: RwLock::new(token),
        };

        // Validate the session once so a bad token shows up at startup
        drive.access_token().await?;
        Ok(drive)
    }

    async fn access_token(&self) -> Result<String, StorageError> {
        {
            let token = self.token.read().await;
            if !token.value.is_empty() && token.is_fresh() {
                return Ok(token.value.clone());
            }
        }

        let mut token = self.token.write().await;
        // Another request may have refreshed while we waited for the lock
        if !token.value.is_empty() && token.is_fresh() {
            return Ok(token.value.clone());
        }

        let refresh_token = self.refresh_token.as_deref().ok_or_else(|| {
            StorageError::Auth("access token expired and no refresh token is stored".to_string())
        })?;

        debug!("Refreshing Google access token");
        let response = self
            .client
            .post(self.oauth.token_uri())
            .form(&[
                ("client_id", self.oauth.client_id.as_str()),
                ("client_secret", self.oauth.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Token refresh failed ({}): {}", status, body);
            return Err(StorageError::Auth(format!("token refresh failed ({}): {}", status, body)));
        }

        let refreshed: TokenResponse = response.json().await?;
        *token = AccessToken {
            value: refreshed.access_token,
            expires_at: refreshed
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        };
        Ok(token.value.clone())
    }

    // Marks the rejected token stale unless another request already replaced it
    async fn invalidate(&self, rejected: &str) {
        let mut token = self.token.write().await;
        if token.value == rejected {
            token.expires_at = Some(Instant::now());
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StorageError> {
        let retry = request.try_clone();
        let token = self.access_token().await?;
        let mut response = request.bearer_auth(&token).send().await?;

        // Token files without an expiry only learn about it from a 401
        if response.status() == StatusCode::UNAUTHORIZED && self.refresh_token.is_some() {
            if let Some(retry) = retry {
                debug!("Drive rejected the access token, refreshing");
                self.invalidate(&token).await;
                let token = self.access_token().await?;
                response = retry.bearer_auth(token).send().await?;
            }
        }

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(api_error(status, body))
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/files/{}", self.api_base, id)
    }
}

#[async_trait]
impl DriveBackend for GoogleDrive {
    fn name(&self) -> String {
        "google-drive".to_string()
    }

    fn root_id(&self) -> String {
        ROOT_ID.to_string()
    }

    async fn list_children(&self, query: &ChildQuery) -> Result<Vec<RemoteEntry>, StorageError> {
        let q = search_expression(query);
        debug!("Drive query: {}", q);

        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = vec![
                ("q", q.clone()),
                ("fields", LIST_FIELDS.to_string()),
                ("spaces", "drive".to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let response = self
                .send(self.client.get(format!("{}/files", self.api_base)).query(&params))
                .await?;
            let page: FileList = response.json().await?;
            entries.extend(page.files.into_iter().map(RemoteEntry::from));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(entries)
    }

    async fn get_parents(&self, id: &str) -> Result<Vec<String>, StorageError> {
        let response = self
            .send(
                self.client
                    .get(self.file_url(id))
                    .query(&[("fields", "id, parents")]),
            )
            .await?;
        let file: DriveFile = response.json().await?;
        Ok(file.parents)
    }

    async fn update_parents(
        &self,
        id: &str,
        add_parent: &str,
        remove_parents: &[String],
    ) -> Result<(), StorageError> {
        let remove = remove_parents.join(",");
        self.send(
            self.client
                .patch(self.file_url(id))
                .query(&[
                    ("addParents", add_parent),
                    ("removeParents", remove.as_str()),
                    ("fields", "id, parents"),
                ])
                .json(&serde_json::json!({})),
        )
        .await?;
        Ok(())
    }

    async fn rename(&self, id: &str, new_name: &str) -> Result<(), StorageError> {
        self.send(
            self.client
                .patch(self.file_url(id))
                .json(&serde_json::json!({ "name": new_name })),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.send(self.client.delete(self.file_url(id))).await?;
        Ok(())
    }

    async fn create_file(&self, file: NewFile) -> Result<CreatedFile, StorageError> {
        let boundary = format!(
            "drive-assistant-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or_default()
        );
        let metadata = serde_json::json!({
            "name": file.name,
            "parents": [file.parent_id],
        });

        // multipart/related: JSON metadata part followed by the media part
        let mut body = Vec::with_capacity(file.contents.len() + 512);
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: {t}\r\n\r\n",
                b = boundary,
                m = metadata,
                t = file.mime_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(&file.contents);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let response = self
            .send(
                self.client
                    .post(format!("{}/files", DRIVE_UPLOAD_API))
                    .query(&[("uploadType", "multipart"), ("fields", "id, name, webViewLink")])
                    .header(
                        reqwest::header::CONTENT_TYPE,
                        format!("multipart/related; boundary={}", boundary),
                    )
                    .body(body),
            )
            .await?;
        let created: DriveFile = response.json().await?;
        Ok(CreatedFile {
            id: created.id,
            name: created.name,
            web_view_link: created.web_view_link,
        })
    }

    async fn export_text(&self, id: &str) -> Result<String, StorageError> {
        let response = self
            .send(
                self.client
                    .get(format!("{}/export", self.file_url(id)))
                    .query(&[("mimeType", "text/plain")]),
            )
            .await?;
        Ok(response.text().await?)
    }

    async fn download_text(&self, id: &str) -> Result<String, StorageError> {
        let response = self
            .send(self.client.get(self.file_url(id)).query(&[("alt", "media")]))
            .await?;
        Ok(response.text().await?)
    }
}
