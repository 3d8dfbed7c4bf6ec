use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::state::{WorkflowState, WorkflowStep, CONTENTS_CHAIN};
use super::PanelPublisher;
use crate::config::{CommitAuthor, GitHubPanelsConfig};
use crate::error::{Result, VigilError};
use crate::mutate::{brand_entries, replace_primary, PanelEntry};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// File content with the blob sha that must accompany an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content: String,
    pub sha: String,
}

/// Hosted repository contents API.
#[async_trait]
pub trait ContentsApi: Send + Sync {
    async fn get_file(&self, path: &str) -> Result<RemoteFile>;

    /// Replaces `path`, guarded by the `sha` it was read at. Returns the new
    /// blob sha; a stale sha is a [`VigilError::Conflict`].
    async fn put_file(
        &self,
        path: &str,
        content: &str,
        sha: &str,
        message: &str,
        author: &CommitAuthor,
    ) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

#[derive(Debug, Serialize)]
struct Identity<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    sha: &'a str,
    branch: &'a str,
    committer: Identity<'a>,
    author: Identity<'a>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Decodes the line-wrapped base64 payload of a contents response.
fn decode_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| VigilError::MalformedDocument(format!("invalid base64 content: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| VigilError::MalformedDocument(e.to_string()))
}

fn check_status(status: StatusCode, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    let message = serde_json::from_str::<ApiError>(body)
        .map(|e| e.message)
        .unwrap_or_default();
    let message = if message.is_empty() {
        format!("request failed with status {}", status)
    } else {
        message
    };

    match status {
        StatusCode::CONFLICT => Err(VigilError::Conflict(message)),
        StatusCode::UNPROCESSABLE_ENTITY if message.contains("sha") => {
            Err(VigilError::Conflict(message))
        }
        StatusCode::TOO_MANY_REQUESTS => Err(VigilError::RateLimited(message)),
        _ => Err(VigilError::Provider {
            status: status.as_u16(),
            message,
        }),
    }
}

/// GitHub REST contents API client for one repository branch.
#[derive(Debug, Clone)]
pub struct GitHubContentsClient {
    http: Client,
    token: String,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
}

impl GitHubContentsClient {
    pub fn new(config: &GitHubPanelsConfig) -> Result<Self> {
        Self::with_timeout(config, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(config: &GitHubPanelsConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            token: config.token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            self.owner,
            self.repo,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ContentsApi for GitHubContentsClient {
    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn get_file(&self, path: &str) -> Result<RemoteFile> {
        let response = self
            .http
            .get(self.contents_url(path))
            .query(&[("ref", self.branch.as_str())])
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        check_status(status, &body)?;

        let file: ContentsResponse = serde_json::from_str(&body)?;
        debug!(sha = %file.sha, "Fetched file");
        Ok(RemoteFile {
            content: decode_content(&file.content)?,
            sha: file.sha,
        })
    }

    #[instrument(skip(self, content, author), fields(repo = %self.repo))]
    async fn put_file(
        &self,
        path: &str,
        content: &str,
        sha: &str,
        message: &str,
        author: &CommitAuthor,
    ) -> Result<String> {
        let identity = || Identity {
            name: &author.name,
            email: &author.email,
        };
        let request = PutRequest {
            message,
            content: STANDARD.encode(content.as_bytes()),
            sha,
            branch: &self.branch,
            committer: identity(),
            author: identity(),
        };

        let response = self
            .http
            .put(self.contents_url(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        check_status(status, &body)?;

        let updated: PutResponse = serde_json::from_str(&body)?;
        Ok(updated.content.sha)
    }
}

/// Publishes the panels document through a [`ContentsApi`].
///
/// `FETCH → MUTATE → COMMIT`; the local mirror is refreshed only after a
/// successful commit.
pub struct GitHubPublisher {
    api: Arc<dyn ContentsApi>,
    file_path: String,
    author: CommitAuthor,
    mirror_path: Option<PathBuf>,
}

impl GitHubPublisher {
    pub fn new(api: Arc<dyn ContentsApi>, file_path: &str, author: CommitAuthor) -> Self {
        Self {
            api,
            file_path: file_path.to_string(),
            author,
            mirror_path: None,
        }
    }

    pub fn with_mirror(mut self, mirror_path: Option<PathBuf>) -> Self {
        self.mirror_path = mirror_path;
        self
    }

    pub fn from_config(config: &GitHubPanelsConfig, author: CommitAuthor) -> Result<Self> {
        let client = GitHubContentsClient::new(config)?;
        Ok(Self::new(Arc::new(client), &config.file_path, author)
            .with_mirror(config.mirror_path.clone()))
    }

    async fn write_mirror(&self, document: &str) {
        let Some(path) = &self.mirror_path else {
            return;
        };
        if let Err(e) = tokio::fs::write(path, document).await {
            warn!(path = %path.display(), error = %e, "Failed to refresh local mirror");
        }
    }
}

#[async_trait]
impl PanelPublisher for GitHubPublisher {
    fn backend(&self) -> &'static str {
        "github"
    }

    async fn current_entries(&self, brand: &str) -> Result<Vec<PanelEntry>> {
        let file = self.api.get_file(&self.file_path).await?;
        brand_entries(&file.content, brand)
    }

    #[instrument(skip(self, entry, message), fields(url = %entry.url))]
    async fn publish(&self, brand: &str, entry: &PanelEntry, message: &str) -> WorkflowState {
        let mut state = WorkflowState::new(self.backend(), CONTENTS_CHAIN);

        let file = match self.api.get_file(&self.file_path).await {
            Ok(file) => file,
            Err(e) => return state.fail(WorkflowStep::Fetch, e),
        };
        state.pass(WorkflowStep::Fetch);

        let change = match replace_primary(&file.content, brand, entry) {
            Ok(change) => change,
            Err(e) => return state.fail(WorkflowStep::Mutate, e),
        };
        state.pass(WorkflowStep::Mutate);
        if !change.changed {
            info!(brand, "Primary entry already published");
            return state.noop();
        }

        match self
            .api
            .put_file(&self.file_path, &change.document, &file.sha, message, &self.author)
            .await
        {
            Ok(sha) => {
                debug!(sha = %sha, "Committed");
                state.pass(WorkflowStep::Commit);
            }
            Err(e) => return state.fail(WorkflowStep::Commit, e),
        }

        self.write_mirror(&change.document).await;
        info!(brand, replaced = ?change.replaced, "Published primary entry");
        state.succeed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const DOCUMENT: &str = r#"{"panels": {"wujie": [{"url": "https://apiwj250201.wj0001.cfd", "description": "old"}]}}"#;

    /// In-memory repository file with optimistic concurrency on the sha.
    struct FakeContents {
        file: Mutex<RemoteFile>,
        /// Simulates a concurrent writer between fetch and commit
        race: bool,
        commits: Mutex<Vec<String>>,
    }

    impl FakeContents {
        fn new(race: bool) -> Arc<Self> {
            Arc::new(Self {
                file: Mutex::new(RemoteFile {
                    content: DOCUMENT.to_string(),
                    sha: "sha-1".to_string(),
                }),
                race,
                commits: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ContentsApi for FakeContents {
        async fn get_file(&self, _path: &str) -> Result<RemoteFile> {
            let file = self.file.lock().unwrap().clone();
            if self.race {
                self.file.lock().unwrap().sha = "sha-concurrent".to_string();
            }
            Ok(file)
        }

        async fn put_file(
            &self,
            _path: &str,
            content: &str,
            sha: &str,
            message: &str,
            _author: &CommitAuthor,
        ) -> Result<String> {
            let mut file = self.file.lock().unwrap();
            if file.sha != sha {
                return Err(VigilError::Conflict(format!("{} does not match", sha)));
            }
            let next = format!("sha-{}", self.commits.lock().unwrap().len() + 2);
            *file = RemoteFile {
                content: content.to_string(),
                sha: next.clone(),
            };
            self.commits.lock().unwrap().push(message.to_string());
            Ok(next)
        }
    }

    fn entry() -> PanelEntry {
        PanelEntry::generated("wujie", "apiwj250301.wj0001.cfd")
    }

    #[tokio::test]
    async fn test_publish_commits_and_mirrors() {
        let api = FakeContents::new(false);
        let dir = tempfile::tempdir().unwrap();
        let mirror = dir.path().join("domains.json");
        let publisher = GitHubPublisher::new(api.clone(), "domains.json", CommitAuthor::default())
            .with_mirror(Some(mirror.clone()));

        let state = publisher.publish("wujie", &entry(), "Replace wujie").await;

        assert!(state.success, "{:?}", state.error);
        assert_eq!(state.steps.len(), 3);
        assert_eq!(*api.commits.lock().unwrap(), vec!["Replace wujie"]);

        let mirrored = std::fs::read_to_string(mirror).unwrap();
        assert_eq!(brand_entries(&mirrored, "wujie").unwrap()[0], entry());
        assert_eq!(publisher.current_entries("wujie").await.unwrap()[0], entry());
    }

    #[tokio::test]
    async fn test_republish_is_noop() {
        let api = FakeContents::new(false);
        let publisher = GitHubPublisher::new(api.clone(), "domains.json", CommitAuthor::default());

        publisher.publish("wujie", &entry(), "first").await;
        let state = publisher.publish("wujie", &entry(), "second").await;

        assert!(state.success);
        assert!(state.noop);
        assert_eq!(api.commits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_sha_fails_commit() {
        let api = FakeContents::new(true);
        let dir = tempfile::tempdir().unwrap();
        let mirror = dir.path().join("domains.json");
        let publisher = GitHubPublisher::new(api.clone(), "domains.json", CommitAuthor::default())
            .with_mirror(Some(mirror.clone()));

        let state = publisher.publish("wujie", &entry(), "Replace wujie").await;

        assert!(!state.success);
        assert_eq!(state.failed_step(), Some(WorkflowStep::Commit));
        assert!(state.error.unwrap().contains("Revision conflict"));
        assert!(!mirror.exists());
    }

    #[tokio::test]
    async fn test_malformed_document_fails_mutate() {
        let api = FakeContents::new(false);
        api.file.lock().unwrap().content = "not json".to_string();
        let publisher = GitHubPublisher::new(api, "domains.json", CommitAuthor::default());

        let state = publisher.publish("wujie", &entry(), "m").await;
        assert_eq!(state.failed_step(), Some(WorkflowStep::Mutate));
    }

    #[test]
    fn test_decode_wrapped_content() {
        let encoded = STANDARD.encode("{\"panels\": {}}\n");
        let (head, tail) = encoded.split_at(8);
        let wrapped = format!("{}\n{}\n", head, tail);
        assert_eq!(decode_content(&wrapped).unwrap(), "{\"panels\": {}}\n");
        assert!(decode_content("***").is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert!(check_status(StatusCode::OK, "").is_ok());
        assert!(matches!(
            check_status(StatusCode::CONFLICT, r#"{"message":"is at abc but expected def"}"#),
            Err(VigilError::Conflict(_))
        ));
        assert!(matches!(
            check_status(
                StatusCode::UNPROCESSABLE_ENTITY,
                r#"{"message":"Invalid request.\n\n\"sha\" wasn't supplied."}"#
            ),
            Err(VigilError::Conflict(_))
        ));
        match check_status(StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#) {
            Err(VigilError::Provider { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "Not Found");
            }
            other => panic!("expected Provider, got {:?}", other),
        }
    }
}
