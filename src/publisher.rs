//! Publishing extracts to Tableau Server / Tableau Cloud over the REST API.
//!
//! A publish is one signed-in session:
//!
//! ```text
//! sign in ─> find project ─┬─> single multipart request      (file <= chunk size)
//!                          └─> upload session, PUT per chunk,
//!                              publish with uploadSessionId  (larger files)
//!                                        │
//!                          sign out <────┘
//! ```
//!
//! The data source is always published with `overwrite=true`; the server's
//! data source id (LUID) is returned as the identity.
//!
//! The publish endpoint only takes `.hyper`, `.tds`, `.tdsx` and `.tde`
//! files. Anything else, including the Parquet files written by
//! [`crate::store::ExtractStore`], is refused before signing in.

use crate::config::TableauSettings;
use crate::ports::{PublishRequest, Publisher};
use anyhow::{Context as _, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use secrecy::ExposeSecret as _;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read as _;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

const AUTH_HEADER: &str = "X-Tableau-Auth";
const JSON: &str = "application/json";

/// File types the publish-data-source endpoint accepts.
const PUBLISHABLE_EXTENSIONS: [&str; 4] = ["hyper", "tds", "tdsx", "tde"];

pub struct TableauPublisher {
    client: Client,
    api_version: String,
    chunk_size_bytes: u64,
}

impl TableauPublisher {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(settings: &TableauSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_version: settings.api_version.clone(),
            chunk_size_bytes: settings.chunk_size_bytes.max(1),
        })
    }

    fn sign_in(&self, api: &ApiBase, request: &PublishRequest) -> Result<Session> {
        let body = SignInRequest::new(request);
        let response = self
            .client
            .post(api.url("auth/signin"))
            .header(ACCEPT, JSON)
            .json(&body)
            .send()
            .context("Failed to reach Tableau server")?;
        let parsed: SignInResponse = check(response, "Sign in failed")?
            .json()
            .context("Failed to parse sign-in response")?;

        tracing::info!("Signed in to {} as {}", api.server, request.username);
        Ok(Session {
            token: parsed.credentials.token,
            site_id: parsed.credentials.site.id,
        })
    }

    fn sign_out(&self, api: &ApiBase, session: &Session) -> Result<()> {
        let response = self
            .client
            .post(api.url("auth/signout"))
            .header(AUTH_HEADER, &session.token)
            .send()
            .context("Failed to reach Tableau server")?;
        check(response, "Sign out failed")?;
        Ok(())
    }

    fn find_project_id(&self, api: &ApiBase, session: &Session, project: &str) -> Result<String> {
        let response = self
            .client
            .get(api.site_url(session, "projects"))
            .header(AUTH_HEADER, &session.token)
            .header(ACCEPT, JSON)
            .query(&[("filter", format!("name:eq:{project}"))])
            .send()
            .context("Failed to query projects")?;
        let parsed: ProjectsResponse = check(response, "Project lookup failed")?
            .json()
            .context("Failed to parse projects response")?;

        parsed
            .projects
            .project
            .into_iter()
            .find(|p| p.name == project)
            .map(|p| p.id)
            .ok_or_else(|| anyhow::anyhow!("Project '{project}' not found on server"))
    }

    fn publish_in_session(
        &self,
        api: &ApiBase,
        session: &Session,
        request: &PublishRequest,
        file_path: &Path,
    ) -> Result<String> {
        let project_id = self.find_project_id(api, session, &request.project_name)?;
        let payload =
            serde_json::to_vec(&PublishPayload::new(&request.datasource_name, &project_id))?;
        let file_name = file_path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid extract path: {}", file_path.display()))?;

        let file_size = std::fs::metadata(file_path)
            .with_context(|| format!("Failed to stat extract: {}", file_path.display()))?
            .len();

        let response = if file_size <= self.chunk_size_bytes {
            let bytes = std::fs::read(file_path)
                .with_context(|| format!("Failed to read extract: {}", file_path.display()))?;
            let body = MultipartMixed::new()
                .json_part("request_payload", &payload)
                .file_part("tableau_datasource", file_name, &bytes);
            self.client
                .post(api.site_url(session, "datasources"))
                .query(&[("overwrite", "true")])
                .header(AUTH_HEADER, &session.token)
                .header(ACCEPT, JSON)
                .header(CONTENT_TYPE, body.content_type())
                .body(body.finish())
                .send()
                .context("Failed to upload data source")?
        } else {
            let upload_id = self.upload_in_chunks(api, session, file_path)?;
            let datasource_type = publishable_extension(file_path)?;
            let body = MultipartMixed::new().json_part("request_payload", &payload);
            self.client
                .post(api.site_url(session, "datasources"))
                .query(&[
                    ("uploadSessionId", upload_id.as_str()),
                    ("datasourceType", datasource_type.as_str()),
                    ("overwrite", "true"),
                ])
                .header(AUTH_HEADER, &session.token)
                .header(ACCEPT, JSON)
                .header(CONTENT_TYPE, body.content_type())
                .body(body.finish())
                .send()
                .context("Failed to commit chunked upload")?
        };

        let parsed: DatasourceResponse = check(response, "Publishing data source failed")?
            .json()
            .context("Failed to parse publish response")?;
        Ok(parsed.datasource.id)
    }

    fn upload_in_chunks(
        &self,
        api: &ApiBase,
        session: &Session,
        file_path: &Path,
    ) -> Result<String> {
        let response = self
            .client
            .post(api.site_url(session, "fileUploads"))
            .header(AUTH_HEADER, &session.token)
            .header(ACCEPT, JSON)
            .send()
            .context("Failed to start upload session")?;
        let upload_id = check(response, "Starting upload session failed")?
            .json::<FileUploadResponse>()
            .context("Failed to parse upload session response")?
            .file_upload
            .upload_session_id;

        let mut file = File::open(file_path)
            .with_context(|| format!("Failed to open extract: {}", file_path.display()))?;
        let mut chunks = 0usize;
        loop {
            let mut chunk = Vec::new();
            (&mut file)
                .take(self.chunk_size_bytes)
                .read_to_end(&mut chunk)
                .context("Failed to read extract chunk")?;
            if chunk.is_empty() {
                break;
            }

            let body = MultipartMixed::new()
                .json_part("request_payload", b"")
                .file_part("tableau_file", "file", &chunk);
            let response = self
                .client
                .put(api.site_url(session, &format!("fileUploads/{upload_id}")))
                .header(AUTH_HEADER, &session.token)
                .header(ACCEPT, JSON)
                .header(CONTENT_TYPE, body.content_type())
                .body(body.finish())
                .send()
                .context("Failed to upload chunk")?;
            check(response, "Uploading chunk failed")?;
            chunks += 1;
        }

        tracing::info!("Uploaded {chunks} chunk(s) in session {upload_id}");
        Ok(upload_id)
    }
}

impl Publisher for TableauPublisher {
    fn publish(&self, request: &PublishRequest, file_path: &Path) -> Result<String> {
        publishable_extension(file_path)?;
        let api = ApiBase::new(&request.server_url, &self.api_version);
        let session = self.sign_in(&api, request)?;

        let result = self.publish_in_session(&api, &session, request, file_path);

        if let Err(e) = self.sign_out(&api, &session) {
            tracing::warn!("Failed to sign out of {}: {e:#}", api.server);
        }
        result
    }
}

/// The lower-cased extension of `file_path`, if the server accepts that file type.
fn publishable_extension(file_path: &Path) -> Result<String> {
    let ext = file_path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    if !PUBLISHABLE_EXTENSIONS.contains(&ext.as_str()) {
        anyhow::bail!(
            "Cannot publish {}: server accepts .hyper/.tds/.tdsx/.tde, got .{ext}",
            file_path.display()
        );
    }
    Ok(ext)
}

/// Fails with the server's response body when the status is not 2xx.
fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    anyhow::bail!("{what}: HTTP {status}: {body}")
}

struct Session {
    token: String,
    site_id: String,
}

struct ApiBase {
    server: String,
    version: String,
}

impl ApiBase {
    fn new(server_url: &str, version: &str) -> Self {
        Self {
            server: server_url.trim_end_matches('/').to_owned(),
            version: version.to_owned(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}/{path}", self.server, self.version)
    }

    fn site_url(&self, session: &Session, path: &str) -> String {
        self.url(&format!("sites/{}/{path}", session.site_id))
    }
}

/// Hand-assembled `multipart/mixed` body; the REST API rejects `form-data`.
struct MultipartMixed {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartMixed {
    fn new() -> Self {
        Self::with_boundary(Uuid::new_v4().simple().to_string())
    }

    fn with_boundary(boundary: String) -> Self {
        Self {
            boundary,
            body: Vec::new(),
        }
    }

    fn json_part(mut self, name: &str, content: &[u8]) -> Self {
        self.start_part(&format!("name=\"{name}\""), JSON);
        self.body.extend_from_slice(content);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn file_part(mut self, name: &str, file_name: &str, content: &[u8]) -> Self {
        self.start_part(
            &format!("name=\"{name}\"; filename=\"{file_name}\""),
            "application/octet-stream",
        );
        self.body.extend_from_slice(content);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn start_part(&mut self, disposition: &str, content_type: &str) {
        let header = format!(
            "--{}\r\nContent-Disposition: {disposition}\r\nContent-Type: {content_type}\r\n\r\n",
            self.boundary
        );
        self.body.extend_from_slice(header.as_bytes());
    }

    fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary)
    }

    fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.body
    }
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    credentials: SignInCredentials<'a>,
}

#[derive(Serialize)]
struct SignInCredentials<'a> {
    name: &'a str,
    password: &'a str,
    site: SiteRef<'a>,
}

#[derive(Serialize)]
struct SiteRef<'a> {
    #[serde(rename = "contentUrl")]
    content_url: &'a str,
}

impl<'a> SignInRequest<'a> {
    fn new(request: &'a PublishRequest) -> Self {
        Self {
            credentials: SignInCredentials {
                name: &request.username,
                password: request.password.expose_secret(),
                site: SiteRef {
                    content_url: &request.site_id,
                },
            },
        }
    }
}

#[derive(Deserialize)]
struct SignInResponse {
    credentials: SessionCredentials,
}

#[derive(Deserialize)]
struct SessionCredentials {
    token: String,
    site: SiteId,
}

#[derive(Deserialize)]
struct SiteId {
    id: String,
}

#[derive(Deserialize)]
struct ProjectsResponse {
    #[serde(default)]
    projects: ProjectList,
}

#[derive(Deserialize, Default)]
struct ProjectList {
    #[serde(default)]
    project: Vec<Project>,
}

#[derive(Deserialize)]
struct Project {
    id: String,
    name: String,
}

#[derive(Serialize)]
struct PublishPayload<'a> {
    datasource: DatasourceSpec<'a>,
}

#[derive(Serialize)]
struct DatasourceSpec<'a> {
    name: &'a str,
    project: ProjectId<'a>,
}

#[derive(Serialize)]
struct ProjectId<'a> {
    id: &'a str,
}

impl<'a> PublishPayload<'a> {
    fn new(name: &'a str, project_id: &'a str) -> Self {
        Self {
            datasource: DatasourceSpec {
                name,
                project: ProjectId { id: project_id },
            },
        }
    }
}

#[derive(Deserialize)]
struct DatasourceResponse {
    datasource: PublishedDatasource,
}

#[derive(Deserialize)]
struct PublishedDatasource {
    id: String,
}

#[derive(Deserialize)]
struct FileUploadResponse {
    #[serde(rename = "fileUpload")]
    file_upload: FileUpload,
}

#[derive(Deserialize)]
struct FileUpload {
    #[serde(rename = "uploadSessionId")]
    upload_session_id: String,
}
