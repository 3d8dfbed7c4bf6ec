use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::ProxyConfig;
use crate::error::{Result, VigilError};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// ssh exits with 255 when the connection itself failed.
const SSH_TRANSPORT_EXIT: i32 = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Converts a non-zero exit into [`VigilError::CommandFailed`].
    pub fn check(self, command: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(VigilError::CommandFailed {
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Command execution on the reverse-proxy host.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Runs `command` through the remote shell. A non-zero exit is a normal
    /// `Ok` result; only transport failures are errors.
    async fn exec(&self, command: &str) -> Result<CommandOutput>;
}

/// Quotes `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// [`RemoteShell`] backed by the system `ssh` client.
///
/// Runs in batch mode, so authentication must be key-based.
#[derive(Debug, Clone)]
pub struct SshShell {
    host: String,
    port: u16,
    user: String,
    identity_file: Option<PathBuf>,
    timeout: Duration,
}

impl SshShell {
    pub fn new(host: &str, port: u16, user: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            user: user.to_string(),
            identity_file: None,
            timeout: COMMAND_TIMEOUT,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        let mut shell = Self::new(&config.host, config.port, &config.user);
        shell.identity_file = config.identity_file.clone();
        shell
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn args(&self, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", CONNECT_TIMEOUT_SECS),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-p".to_string(),
            self.port.to_string(),
        ];
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args.push(format!("{}@{}", self.user, self.host));
        args.push("--".to_string());
        args.push(command.to_string());
        args
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    #[instrument(skip(self, command), fields(host = %self.host))]
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let preview: String = command.chars().take(80).collect();
        debug!(command = %preview, "Running remote command");

        let child = Command::new("ssh")
            .args(self.args(command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VigilError::Transport(format!("failed to start ssh: {}", e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| VigilError::Timeout(format!("ssh {}: {}", self.host, preview)))??;

        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if exit_code == SSH_TRANSPORT_EXIT {
            return Err(VigilError::Transport(stderr.trim().to_string()));
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr,
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$HOME `x`"), "'$HOME `x`'");
    }

    #[test]
    fn test_ssh_args() {
        let shell = SshShell::new("203.0.114.10", 2222, "deploy");
        let args = shell.args("cat /etc/caddy/Caddyfile");

        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"2222".to_string()));
        assert_eq!(args[args.len() - 2], "--");
        assert_eq!(args[args.len() - 3], "deploy@203.0.114.10");
        assert_eq!(args.last().unwrap(), "cat /etc/caddy/Caddyfile");
    }

    #[test]
    fn test_check_exit_code() {
        let failed = CommandOutput {
            stdout: String::new(),
            stderr: "no such file\n".to_string(),
            exit_code: 1,
        };
        match failed.check("cat x") {
            Err(VigilError::CommandFailed { exit_code, stderr, .. }) => {
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "no such file");
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }
}
