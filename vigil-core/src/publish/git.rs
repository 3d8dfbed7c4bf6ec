use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::state::{WorkflowState, WorkflowStep, GIT_CHAIN};
use super::PanelPublisher;
use crate::config::{CommitAuthor, GitPanelsConfig};
use crate::error::{Result, VigilError};
use crate::mutate::{brand_entries, replace_primary, PanelEntry};

const GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Publishes the panels document from a local clone.
///
/// `FETCH → MUTATE → COMMIT → PUSH`. FETCH resets the clone to the remote
/// branch, so commits or edits left by an earlier failed run are dropped and
/// redone. A clean tree after the rewrite ends the run as a no-op.
#[derive(Debug, Clone)]
pub struct GitPublisher {
    repo_path: PathBuf,
    file_path: String,
    remote: String,
    branch: String,
    author: CommitAuthor,
    timeout: Duration,
}

impl GitPublisher {
    pub fn new(config: &GitPanelsConfig, author: CommitAuthor) -> Self {
        Self {
            repo_path: config.repo_path.clone(),
            file_path: config.file_path.clone(),
            remote: config.remote.clone(),
            branch: config.branch.clone(),
            author,
            timeout: GIT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn document_path(&self) -> PathBuf {
        self.repo_path.join(&self.file_path)
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        run_git(&self.repo_path, args, self.timeout).await
    }

    fn upstream(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    /// Makes the clone match the remote branch exactly.
    async fn sync(&self) -> Result<()> {
        self.git(&["fetch", &self.remote, &self.branch]).await?;
        self.git(&["reset", "--hard", &self.upstream()]).await?;
        Ok(())
    }

    /// Drops local work after a failed run.
    async fn discard(&self) {
        if let Err(e) = self.git(&["reset", "--hard", &self.upstream()]).await {
            warn!(error = %e, "Failed to discard local changes");
        }
    }

    /// Rewrites the document on disk; `Ok(false)` when it already matched.
    async fn mutate(&self, brand: &str, entry: &PanelEntry) -> Result<bool> {
        let path = self.document_path();
        let content = tokio::fs::read_to_string(&path).await?;
        let change = replace_primary(&content, brand, entry)?;
        if change.changed {
            tokio::fs::write(&path, &change.document).await?;
        }
        Ok(change.changed)
    }

    /// Commits the document; `Ok(false)` when there was nothing to commit.
    async fn commit(&self, message: &str) -> Result<bool> {
        let status = self
            .git(&["status", "--porcelain", "--", &self.file_path])
            .await?;
        if status.trim().is_empty() {
            return Ok(false);
        }

        self.git(&["add", "--", &self.file_path]).await?;
        let committer_name = format!("user.name={}", self.author.name);
        let committer_email = format!("user.email={}", self.author.email);
        let author = self.author.signature();
        self.git(&[
            "-c",
            &committer_name,
            "-c",
            &committer_email,
            "commit",
            "-m",
            message,
            "--author",
            &author,
        ])
        .await?;
        Ok(true)
    }

    async fn push(&self) -> Result<()> {
        self.git(&["push", &self.remote, &self.branch]).await.map(|_| ())
    }
}

/// Runs `git -C <repo> <args>` with a timeout, failing on a non-zero exit.
async fn run_git(repo: &Path, args: &[&str], timeout: Duration) -> Result<String> {
    let rendered = format!("git {}", args.join(" "));
    debug!(command = %rendered, "Running git");

    let child = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| VigilError::Timeout(rendered.clone()))??;

    if !output.status.success() {
        return Err(VigilError::CommandFailed {
            command: rendered,
            exit_code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[async_trait]
impl PanelPublisher for GitPublisher {
    fn backend(&self) -> &'static str {
        "git"
    }

    async fn current_entries(&self, brand: &str) -> Result<Vec<PanelEntry>> {
        let content = tokio::fs::read_to_string(self.document_path()).await?;
        brand_entries(&content, brand)
    }

    #[instrument(skip(self, entry, message), fields(repo = %self.repo_path.display()))]
    async fn publish(&self, brand: &str, entry: &PanelEntry, message: &str) -> WorkflowState {
        let mut state = WorkflowState::new(self.backend(), GIT_CHAIN);

        if let Err(e) = self.sync().await {
            return state.fail(WorkflowStep::Fetch, e);
        }
        state.pass(WorkflowStep::Fetch);

        if let Err(e) = self.mutate(brand, entry).await {
            self.discard().await;
            return state.fail(WorkflowStep::Mutate, e);
        }
        state.pass(WorkflowStep::Mutate);

        match self.commit(message).await {
            Ok(true) => state.pass(WorkflowStep::Commit),
            Ok(false) => {
                info!(brand, "Working tree clean after rewrite");
                return state.noop();
            }
            Err(e) => {
                self.discard().await;
                return state.fail(WorkflowStep::Commit, e);
            }
        }

        if let Err(e) = self.push().await {
            self.discard().await;
            return state.fail(WorkflowStep::Push, e);
        }
        state.pass(WorkflowStep::Push);

        info!(brand, url = %entry.url, "Pushed primary entry");
        state.succeed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::WorkflowStatus;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    const DOCUMENT: &str = "{\n    \"panels\": {\n        \"wujie\": []\n    }\n}";

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .arg("-C")
            .arg(dir)
            .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
            .args(args)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?}: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// A bare remote plus a working clone seeded with the document.
    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let remote = root.path().join("remote.git");
        let work = root.path().join("work");
        std::fs::create_dir_all(&remote).unwrap();
        std::fs::create_dir_all(&work).unwrap();

        git(&remote, &["init", "--bare", "-b", "main"]);
        git(&work, &["init", "-b", "main"]);
        git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);
        std::fs::write(work.join("domains.json"), DOCUMENT).unwrap();
        git(&work, &["add", "domains.json"]);
        git(&work, &["commit", "-m", "seed"]);
        git(&work, &["push", "origin", "main"]);

        (root, remote, work)
    }

    fn publisher(work: &Path, remote: &str) -> GitPublisher {
        let config = GitPanelsConfig {
            repo_path: work.to_path_buf(),
            file_path: "domains.json".to_string(),
            remote: remote.to_string(),
            branch: "main".to_string(),
        };
        GitPublisher::new(&config, CommitAuthor::default())
    }

    fn entry() -> PanelEntry {
        PanelEntry::generated("wujie", "apiwj250301.wj0001.cfd")
    }

    #[tokio::test]
    async fn test_publish_pushes_commit() {
        let (_root, remote, work) = setup();
        let publisher = publisher(&work, "origin");

        let state = publisher
            .publish("wujie", &entry(), "Replace wujie primary domain")
            .await;

        assert!(state.success, "{:?}", state.error);
        assert_eq!(state.steps.len(), 4);
        assert_eq!(
            git(&remote, &["log", "-1", "--format=%s"]),
            "Replace wujie primary domain"
        );
        assert_eq!(
            git(&remote, &["log", "-1", "--format=%an <%ae>"]),
            CommitAuthor::default().signature()
        );
        assert_eq!(publisher.current_entries("wujie").await.unwrap(), vec![entry()]);
    }

    #[tokio::test]
    async fn test_second_publish_is_noop() {
        let (_root, remote, work) = setup();
        let publisher = publisher(&work, "origin");

        publisher.publish("wujie", &entry(), "first").await;
        let state = publisher.publish("wujie", &entry(), "second").await;

        assert!(state.success);
        assert!(state.noop);
        assert_eq!(state.step(WorkflowStep::Push), Some(false));
        assert_eq!(git(&remote, &["log", "-1", "--format=%s"]), "first");
    }

    /// Installs a hook on the bare remote that rejects pushes while `flag` exists.
    #[cfg(unix)]
    fn reject_pushes_while(remote: &Path, flag: &Path) {
        use std::os::unix::fs::PermissionsExt;

        let hook = remote.join("hooks").join("pre-receive");
        let script = format!(
            "#!/bin/sh\nif [ -f '{}' ]; then\n  echo 'push rejected' >&2\n  exit 1\nfi\nexit 0\n",
            flag.display()
        );
        std::fs::write(&hook, script).unwrap();
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rejected_push_is_retried_next_run() {
        let (root, remote, work) = setup();
        let flag = root.path().join("reject");
        std::fs::write(&flag, "").unwrap();
        reject_pushes_while(&remote, &flag);
        let publisher = publisher(&work, "origin");

        let first = publisher.publish("wujie", &entry(), "first").await;
        assert_eq!(first.failed_step(), Some(WorkflowStep::Push));
        assert_eq!(first.step(WorkflowStep::Commit), Some(true));
        assert_eq!(first.status(), WorkflowStatus::Failed);
        assert_eq!(git(&remote, &["log", "-1", "--format=%s"]), "seed");
        assert_eq!(git(&work, &["log", "-1", "--format=%s"]), "seed");

        std::fs::remove_file(&flag).unwrap();
        let second = publisher.publish("wujie", &entry(), "second").await;

        assert!(second.success, "{:?}", second.error);
        assert!(!second.noop);
        assert_eq!(second.step(WorkflowStep::Push), Some(true));
        assert_eq!(git(&remote, &["log", "-1", "--format=%s"]), "second");
    }

    #[tokio::test]
    async fn test_leftover_edits_are_discarded() {
        let (_root, remote, work) = setup();
        std::fs::write(work.join("domains.json"), "{ half written").unwrap();
        let publisher = publisher(&work, "origin");

        let state = publisher.publish("wujie", &entry(), "publish").await;

        assert!(state.success, "{:?}", state.error);
        assert_eq!(git(&remote, &["log", "-1", "--format=%s"]), "publish");
        assert_eq!(git(&work, &["status", "--porcelain"]), "");
    }

    #[tokio::test]
    async fn test_unknown_remote_fails_fetch() {
        let (_root, _remote, work) = setup();
        let publisher = publisher(&work, "nowhere");

        let state = publisher.publish("wujie", &entry(), "m").await;

        assert_eq!(state.failed_step(), Some(WorkflowStep::Fetch));
        assert_eq!(state.status(), WorkflowStatus::Failed);
        assert_eq!(std::fs::read_to_string(work.join("domains.json")).unwrap(), DOCUMENT);
    }

    #[tokio::test]
    async fn test_missing_document_fails_mutate() {
        let (_root, _remote, work) = setup();
        let config = GitPanelsConfig {
            repo_path: work.clone(),
            file_path: "missing.json".to_string(),
            remote: "origin".to_string(),
            branch: "main".to_string(),
        };
        let publisher = GitPublisher::new(&config, CommitAuthor::default());

        let state = publisher.publish("wujie", &entry(), "m").await;
        assert_eq!(state.failed_step(), Some(WorkflowStep::Mutate));
    }
}
