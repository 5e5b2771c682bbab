//! Google Drive backend over the Drive v3 REST API.
//!
//! Drive addresses objects by id, so paths are resolved one component at a
//! time and the results cached. Requests are async reqwest futures driven to
//! completion on the calling blocking thread.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::DateTime;
use ferryfile_core::{FileEntry, VfsError, VfsResult};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info};

use crate::path;
use crate::provider::{ProviderKind, VfsProvider};
use crate::tree;

/// Drive v3 metadata endpoint.
pub const API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Drive v3 upload endpoint.
pub const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,size,modifiedTime)";
const ROOT_ID: &str = "root";

/// Connection parameters for a Drive account.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// OAuth2 bearer token with a Drive scope.
    pub access_token: String,
    pub timeout: Duration,
}

impl DriveConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    size: Option<String>,
    modified_time: Option<String>,
}

impl DriveFile {
    fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }

    fn to_entry(&self, full_path: String) -> FileEntry {
        let modified = self
            .modified_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.timestamp())
            .unwrap_or(0);
        if self.is_folder() {
            FileEntry::directory(self.name.as_str(), full_path, modified)
        } else {
            let size = self.size.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0);
            FileEntry::file(self.name.as_str(), full_path, size, modified)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// Escape a value for use inside a single-quoted Drive query literal.
pub fn query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn status_error(status: StatusCode, target: &str, body: &str) -> VfsError {
    match status {
        StatusCode::UNAUTHORIZED => VfsError::Auth {
            message: format!("Drive rejected the access token: {}", body),
        },
        StatusCode::FORBIDDEN => VfsError::permission_denied(target),
        StatusCode::NOT_FOUND => VfsError::not_found(target),
        StatusCode::TOO_MANY_REQUESTS => VfsError::connection(format!("Drive rate limit hit: {}", body)),
        s if s.is_server_error() => VfsError::connection(format!("Drive server error {}: {}", s, body)),
        s => VfsError::protocol(format!("Drive returned {} for {}: {}", s, target, body)),
    }
}

fn network_error(e: reqwest::Error) -> VfsError {
    VfsError::connection(format!("Drive request failed: {}", e))
}

/// Thin async wrapper over the REST calls this provider needs.
#[derive(Clone)]
struct DriveApi {
    client: Client,
    token: String,
}

impl DriveApi {
    fn new(config: &DriveConfig) -> VfsResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VfsError::connection(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            token: config.access_token.clone(),
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(&self.token)
    }

    async fn send(&self, request: RequestBuilder, target: &str) -> VfsResult<Response> {
        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, target, &body))
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder, target: &str) -> VfsResult<T> {
        self.send(request, target)
            .await?
            .json()
            .await
            .map_err(|e| VfsError::protocol(format!("Unexpected Drive response: {}", e)))
    }

    async fn check_account(&self) -> VfsResult<()> {
        let url = format!("{}/about", API_BASE);
        self.send(self.request(Method::GET, &url).query(&[("fields", "user")]), "about")
            .await
            .map(|_| ())
    }

    async fn query(&self, q: String, target: &str) -> VfsResult<Vec<DriveFile>> {
        let url = format!("{}/files", API_BASE);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.request(Method::GET, &url).query(&[
                ("q", q.as_str()),
                ("fields", LIST_FIELDS),
                ("pageSize", "1000"),
            ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: FileList = self.json(request, target).await?;
            files.extend(page.files);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(files),
            }
        }
    }

    async fn children(&self, parent_id: &str, target: &str) -> VfsResult<Vec<DriveFile>> {
        self.query(format!("'{}' in parents and trashed=false", query_literal(parent_id)), target)
            .await
    }

    async fn child_named(&self, parent_id: &str, name: &str, target: &str) -> VfsResult<Option<DriveFile>> {
        let q = format!(
            "'{}' in parents and name = '{}' and trashed=false",
            query_literal(parent_id),
            query_literal(name)
        );
        Ok(self.query(q, target).await?.into_iter().next())
    }

    async fn download(&self, id: &str, dest: &Path, target: &str) -> VfsResult<()> {
        let url = format!("{}/files/{}", API_BASE, id);
        let bytes = self
            .send(self.request(Method::GET, &url).query(&[("alt", "media")]), target)
            .await?
            .bytes()
            .await
            .map_err(network_error)?;
        std::fs::write(dest, &bytes).map_err(|e| VfsError::io(dest, e))
    }

    async fn create(&self, parent_id: &str, name: &str, mime: Option<&str>, target: &str) -> VfsResult<String> {
        let url = format!("{}/files", API_BASE);
        let mut metadata = json!({ "name": name, "parents": [parent_id] });
        if let Some(mime) = mime {
            metadata["mimeType"] = json!(mime);
        }
        let created: CreatedFile = self
            .json(self.request(Method::POST, &url).json(&metadata), target)
            .await?;
        Ok(created.id)
    }

    async fn upload_content(&self, id: &str, content: Vec<u8>, target: &str) -> VfsResult<()> {
        let url = format!("{}/files/{}", UPLOAD_BASE, id);
        let request = self
            .request(Method::PATCH, &url)
            .query(&[("uploadType", "media")])
            .body(content);
        self.send(request, target).await.map(|_| ())
    }

    async fn delete(&self, id: &str, target: &str) -> VfsResult<()> {
        let url = format!("{}/files/{}", API_BASE, id);
        self.send(self.request(Method::DELETE, &url), target).await.map(|_| ())
    }

    async fn update(
        &self,
        id: &str,
        new_name: &str,
        reparent: Option<(&str, &str)>,
        target: &str,
    ) -> VfsResult<()> {
        let url = format!("{}/files/{}", API_BASE, id);
        let mut request = self
            .request(Method::PATCH, &url)
            .json(&json!({ "name": new_name }));
        if let Some((add, remove)) = reparent {
            request = request.query(&[("addParents", add), ("removeParents", remove)]);
        }
        self.send(request, target).await.map(|_| ())
    }
}

/// Drive the future to completion from synchronous provider code.
///
/// Inside the transfer engine this runs on a blocking pool thread, where the
/// ambient runtime can be reused. Outside any runtime a private one is built.
fn block_on<F: Future>(fallback: &mut Option<Runtime>, future: F) -> VfsResult<F::Output> {
    if let Ok(handle) = Handle::try_current() {
        return Ok(handle.block_on(future));
    }
    if fallback.is_none() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| VfsError::other(format!("Failed to start HTTP runtime: {}", e)))?;
        *fallback = Some(runtime);
    }
    match fallback {
        Some(runtime) => Ok(runtime.block_on(future)),
        None => Err(VfsError::other("HTTP runtime unavailable")),
    }
}

/// Google Drive provider. Paths are `/`-separated from "My Drive".
pub struct DriveProvider {
    config: DriveConfig,
    api: Option<DriveApi>,
    runtime: Option<Runtime>,
    ids: HashMap<String, String>,
    location: String,
}

impl DriveProvider {
    pub fn new(config: DriveConfig) -> Self {
        Self {
            config,
            api: None,
            runtime: None,
            ids: HashMap::new(),
            location: "/".to_string(),
        }
    }

    /// Connected API client; the account is verified on first use.
    fn api(&mut self) -> VfsResult<DriveApi> {
        if let Some(api) = &self.api {
            return Ok(api.clone());
        }
        let api = DriveApi::new(&self.config)?;
        block_on(&mut self.runtime, api.check_account())??;
        info!("Google Drive connected");
        self.api = Some(api.clone());
        Ok(api)
    }

    fn call<T, Fut>(&mut self, f: impl FnOnce(DriveApi) -> Fut) -> VfsResult<T>
    where
        Fut: Future<Output = VfsResult<T>>,
    {
        let api = self.api()?;
        let result = block_on(&mut self.runtime, f(api))?;
        if let Err(VfsError::Auth { .. }) = &result {
            self.api = None;
        }
        result
    }

    fn canonical(target: &str) -> String {
        let trimmed = target.trim_matches('/');
        format!("/{}", trimmed)
    }

    /// Resolve a path to its Drive id, walking and caching each component.
    fn resolve(&mut self, target: &str) -> VfsResult<Option<String>> {
        let target = Self::canonical(target);
        if target == "/" {
            return Ok(Some(ROOT_ID.to_string()));
        }
        if let Some(id) = self.ids.get(&target) {
            return Ok(Some(id.clone()));
        }

        let parent = path::parent(&target);
        let Some(parent_id) = self.resolve(&parent)? else {
            return Ok(None);
        };
        let name = path::basename(&target).to_string();
        let lookup = target.clone();
        let found = self
            .call(move |api| async move { api.child_named(&parent_id, &name, &lookup).await })?;

        Ok(found.map(|file| {
            self.ids.insert(target, file.id.clone());
            file.id
        }))
    }

    fn require(&mut self, target: &str) -> VfsResult<String> {
        self.resolve(target)?.ok_or_else(|| VfsError::not_found(target))
    }

    fn forget(&mut self, target: &str) {
        let target = Self::canonical(target);
        let prefix = format!("{}/", target);
        self.ids.retain(|cached, _| cached != &target && !cached.starts_with(&prefix));
    }
}

impl VfsProvider for DriveProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CloudDrive
    }

    fn display_name(&self) -> String {
        "gdrive:".to_string()
    }

    fn list_directory(&mut self, dir: &str) -> VfsResult<Vec<FileEntry>> {
        let dir = Self::canonical(dir);
        let id = self.require(&dir)?;
        let lookup = dir.clone();
        let files = self.call(move |api| async move { api.children(&id, &lookup).await })?;

        let listing = files
            .iter()
            .map(|file| {
                let full_path = path::join(&dir, &file.name);
                self.ids.insert(full_path.clone(), file.id.clone());
                file.to_entry(full_path)
            })
            .collect();
        debug!(dir = %dir, "Drive listing");
        self.location = dir;
        Ok(listing)
    }

    fn fetch_to_local(&mut self, remote_path: &str, local_dir: &Path) -> VfsResult<PathBuf> {
        let id = self.require(remote_path)?;
        let dest = local_dir.join(tree::safe_name(path::basename(remote_path))?);
        let target = remote_path.to_string();
        let out = dest.clone();
        self.call(move |api| async move { api.download(&id, &out, &target).await })?;
        Ok(dest)
    }

    /// Replaces the content when a file with that name already exists.
    fn push_from_local(&mut self, local_path: &Path, remote_dest: &str) -> VfsResult<()> {
        let content = std::fs::read(local_path).map_err(|e| VfsError::io(local_path, e))?;
        let target = Self::canonical(remote_dest);

        let id = match self.resolve(&target)? {
            Some(existing) => existing,
            None => {
                let parent_id = self.require(&path::parent(&target))?;
                let name = path::basename(&target).to_string();
                let lookup = target.clone();
                let id = self
                    .call(move |api| async move { api.create(&parent_id, &name, None, &lookup).await })?;
                self.ids.insert(target.clone(), id.clone());
                id
            }
        };

        self.call(move |api| async move { api.upload_content(&id, content, &target).await })
    }

    fn delete(&mut self, target: &str, _is_directory: bool) -> VfsResult<()> {
        let id = self.require(target)?;
        let lookup = target.to_string();
        self.call(move |api| async move { api.delete(&id, &lookup).await })?;
        self.forget(target);
        Ok(())
    }

    fn make_directory(&mut self, dir: &str) -> VfsResult<()> {
        let dir = Self::canonical(dir);
        let parent_id = self.require(&path::parent(&dir))?;
        let name = path::basename(&dir).to_string();
        let lookup = dir.clone();
        let id = self
            .call(move |api| async move { api.create(&parent_id, &name, Some(FOLDER_MIME), &lookup).await })?;
        self.ids.insert(dir, id);
        Ok(())
    }

    fn fetch_all(&mut self, dest_dir: &Path) -> VfsResult<()> {
        let location = self.location.clone();
        tree::mirror(self, &location, dest_dir)
    }

    fn close(&mut self) {
        self.api = None;
        self.ids.clear();
    }

    fn supports_rename(&self) -> bool {
        true
    }

    fn rename(&mut self, from: &str, to: &str) -> VfsResult<()> {
        let (from, to) = (Self::canonical(from), Self::canonical(to));
        let id = self.require(&from)?;
        let (old_parent, new_parent) = (path::parent(&from), path::parent(&to));

        let reparent = if old_parent != new_parent {
            Some((self.require(&new_parent)?, self.require(&old_parent)?))
        } else {
            None
        };
        let new_name = path::basename(&to).to_string();
        let lookup = from.clone();
        self.call(move |api| async move {
            let reparent = reparent.as_ref().map(|(add, remove)| (add.as_str(), remove.as_str()));
            api.update(&id, &new_name, reparent, &lookup).await
        })?;

        self.forget(&from);
        self.forget(&to);
        Ok(())
    }
}
