use std::sync::Arc;

use chrono::Local;
use tracing::{info, instrument, warn};

use super::shell::{shell_quote, RemoteShell};
use super::state::{WorkflowState, WorkflowStep, PROXY_CHAIN};
use crate::config::ProxyConfig;
use crate::error::Result;
use crate::mutate::{AliasChange, Caddyfile};

pub const PROXY_BACKEND: &str = "ssh";

/// Adds domain aliases to the Caddyfile on the reverse-proxy host.
///
/// Runs `DOWNLOAD → MODIFY → BACKUP → UPLOAD → VALIDATE → RELOAD`, halting
/// at the first failing step.
pub struct ProxyWorkflow {
    shell: Arc<dyn RemoteShell>,
    config: ProxyConfig,
}

impl ProxyWorkflow {
    pub fn new(shell: Arc<dyn RemoteShell>, config: ProxyConfig) -> Self {
        Self { shell, config }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    async fn run_checked(&self, command: &str) -> Result<String> {
        let output = self.shell.exec(command).await?.check(command)?;
        Ok(output.stdout)
    }

    async fn download(&self) -> Result<String> {
        let command = format!("cat {}", shell_quote(&self.config.config_path));
        self.run_checked(&command).await
    }

    /// Aliases currently declared in `target_host`'s block.
    pub async fn list_aliases(&self, target_host: &str) -> Result<Vec<String>> {
        let content = self.download().await?;
        Caddyfile::parse(&content).brand_domains(target_host)
    }

    #[instrument(skip(self), fields(path = %self.config.config_path))]
    pub async fn add_alias(&self, target_host: &str, domain: &str) -> WorkflowState {
        let mut state = WorkflowState::new(PROXY_BACKEND, PROXY_CHAIN);
        let path = shell_quote(&self.config.config_path);

        let content = match self.download().await {
            Ok(content) => content,
            Err(e) => return state.fail(WorkflowStep::Download, e),
        };
        state.pass(WorkflowStep::Download);

        let updated = match Caddyfile::parse(&content).add_domain(target_host, domain) {
            Ok(AliasChange::Added(updated)) => updated,
            Ok(AliasChange::AlreadyExists) => {
                state.pass(WorkflowStep::Modify);
                info!(domain, "Alias already present");
                return state.noop();
            }
            Err(e) => return state.fail(WorkflowStep::Modify, e),
        };
        state.pass(WorkflowStep::Modify);

        let backup = format!(
            "{}.bak.{}",
            self.config.config_path,
            Local::now().format("%Y%m%d%H%M%S")
        );
        let command = format!("cp {} {}", path, shell_quote(&backup));
        if let Err(e) = self.run_checked(&command).await {
            return state.fail(WorkflowStep::Backup, e);
        }
        state.pass(WorkflowStep::Backup);
        state.backup_reference = Some(backup);

        let command = format!("printf '%s' {} > {}", shell_quote(&updated), path);
        if let Err(e) = self.run_checked(&command).await {
            return state.fail(WorkflowStep::Upload, e);
        }
        state.pass(WorkflowStep::Upload);

        let command = self.config.validate_command();
        if let Err(e) = self.run_checked(&command).await {
            warn!(backup = ?state.backup_reference, "Uploaded config failed validation");
            return state.fail(WorkflowStep::Validate, e);
        }
        state.pass(WorkflowStep::Validate);

        let command = self.config.reload_command();
        if let Err(e) = self.run_checked(&command).await {
            warn!(backup = ?state.backup_reference, "Proxy reload failed");
            return state.fail(WorkflowStep::Reload, e);
        }
        state.pass(WorkflowStep::Reload);

        info!(domain, target_host, "Alias added");
        state.succeed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VigilError;
    use crate::publish::shell::CommandOutput;
    use crate::publish::state::WorkflowStatus;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const CADDYFILE: &str = "apiwj250201.wj0001.cfd {\n    reverse_proxy https://wujie.one\n}\n";

    /// Shell that serves a fixed Caddyfile and fails commands by prefix.
    struct FakeShell {
        content: String,
        fail_prefix: Option<&'static str>,
        commands: Mutex<Vec<String>>,
    }

    impl FakeShell {
        fn new(fail_prefix: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                content: CADDYFILE.to_string(),
                fail_prefix,
                commands: Mutex::new(Vec::new()),
            })
        }

        fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteShell for FakeShell {
        async fn exec(&self, command: &str) -> Result<CommandOutput> {
            self.commands.lock().unwrap().push(command.to_string());
            if self.fail_prefix.is_some_and(|p| command.starts_with(p)) {
                return Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: "boom".to_string(),
                    exit_code: 1,
                });
            }
            let stdout = if command.starts_with("cat ") {
                self.content.clone()
            } else {
                String::new()
            };
            Ok(CommandOutput {
                stdout,
                stderr: String::new(),
                exit_code: 0,
            })
        }
    }

    struct DownShell;

    #[async_trait]
    impl RemoteShell for DownShell {
        async fn exec(&self, _command: &str) -> Result<CommandOutput> {
            Err(VigilError::Transport("connection refused".to_string()))
        }
    }

    fn proxy_config() -> ProxyConfig {
        ProxyConfig {
            host: "203.0.114.10".to_string(),
            port: 22,
            user: "root".to_string(),
            identity_file: None,
            config_path: "/etc/caddy/Caddyfile".to_string(),
            validate_cmd: "caddy validate --config {path}".to_string(),
            reload_cmd: "systemctl reload caddy".to_string(),
        }
    }

    #[tokio::test]
    async fn test_add_alias_runs_every_step() {
        let shell = FakeShell::new(None);
        let workflow = ProxyWorkflow::new(shell.clone(), proxy_config());

        let state = workflow.add_alias("wujie.one", "apiwj250301.wj0001.cfd").await;

        assert!(state.success, "{:?}", state.error);
        assert_eq!(state.steps.len(), 6);
        let backup = state.backup_reference.clone().unwrap();
        assert!(backup.starts_with("/etc/caddy/Caddyfile.bak."));

        let commands = shell.commands();
        assert_eq!(commands[0], "cat '/etc/caddy/Caddyfile'");
        assert!(commands[1].starts_with("cp '/etc/caddy/Caddyfile' '/etc/caddy/Caddyfile.bak."));
        assert!(commands[2].starts_with("printf '%s' 'apiwj250301.wj0001.cfd apiwj250201.wj0001.cfd {"));
        assert!(commands[2].ends_with("> '/etc/caddy/Caddyfile'"));
        assert_eq!(commands[3], "caddy validate --config /etc/caddy/Caddyfile");
        assert_eq!(commands[4], "systemctl reload caddy");
    }

    #[tokio::test]
    async fn test_existing_alias_stops_after_modify() {
        let shell = FakeShell::new(None);
        let workflow = ProxyWorkflow::new(shell.clone(), proxy_config());

        let state = workflow.add_alias("wujie.one", "apiwj250201.wj0001.cfd").await;

        assert!(state.success);
        assert!(state.noop);
        assert_eq!(state.step(WorkflowStep::Backup), Some(false));
        assert_eq!(shell.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_backup_failure_blocks_upload() {
        let shell = FakeShell::new(Some("cp "));
        let workflow = ProxyWorkflow::new(shell.clone(), proxy_config());

        let state = workflow.add_alias("wujie.one", "apiwj250301.wj0001.cfd").await;

        assert_eq!(state.status(), WorkflowStatus::Failed);
        assert_eq!(state.failed_step(), Some(WorkflowStep::Backup));
        assert!(!shell.commands().iter().any(|c| c.starts_with("printf")));
    }

    #[tokio::test]
    async fn test_validate_failure_records_whole_chain() {
        let shell = FakeShell::new(Some("caddy validate"));
        let workflow = ProxyWorkflow::new(shell.clone(), proxy_config());

        let state = workflow.add_alias("wujie.one", "apiwj250301.wj0001.cfd").await;

        let steps: Vec<(WorkflowStep, bool)> = state.steps.iter().map(|s| (s.step, s.ok)).collect();
        assert_eq!(
            steps,
            vec![
                (WorkflowStep::Download, true),
                (WorkflowStep::Modify, true),
                (WorkflowStep::Backup, true),
                (WorkflowStep::Upload, true),
                (WorkflowStep::Validate, false),
                (WorkflowStep::Reload, false),
            ]
        );
        assert_eq!(state.step(WorkflowStep::Reload), Some(false));
        assert!(!state.success);
        assert_eq!(state.status(), WorkflowStatus::Unverified);
        assert!(state.backup_reference.is_some());
        assert!(!shell.commands().iter().any(|c| c.starts_with("systemctl")));
    }

    #[tokio::test]
    async fn test_reload_failure_is_unverified() {
        let shell = FakeShell::new(Some("systemctl"));
        let workflow = ProxyWorkflow::new(shell, proxy_config());

        let state = workflow.add_alias("wujie.one", "apiwj250301.wj0001.cfd").await;

        assert_eq!(state.status(), WorkflowStatus::Unverified);
        assert_eq!(state.failed_step(), Some(WorkflowStep::Reload));
        assert!(state.backup_reference.is_some());
        assert!(state.error.as_deref().unwrap().starts_with("RELOAD: "));
    }

    #[tokio::test]
    async fn test_unknown_block_fails_modify() {
        let workflow = ProxyWorkflow::new(FakeShell::new(None), proxy_config());
        let state = workflow.add_alias("v2word.art", "apiv2250301.v20000.cfd").await;

        assert_eq!(state.failed_step(), Some(WorkflowStep::Modify));
        assert_eq!(state.status(), WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_transport_failure_fails_download() {
        let workflow = ProxyWorkflow::new(Arc::new(DownShell), proxy_config());
        let state = workflow.add_alias("wujie.one", "apiwj250301.wj0001.cfd").await;

        assert_eq!(state.failed_step(), Some(WorkflowStep::Download));
        assert!(workflow.list_aliases("wujie.one").await.is_err());
    }

    #[tokio::test]
    async fn test_list_aliases() {
        let workflow = ProxyWorkflow::new(FakeShell::new(None), proxy_config());
        assert_eq!(
            workflow.list_aliases("wujie.one").await.unwrap(),
            vec!["apiwj250201.wj0001.cfd"]
        );
    }
}
