//! Publishing remediation changes.
//!
//! Each pipeline is a linear sequence of [`WorkflowStep`]s that stops at the
//! first failure and reports a [`WorkflowState`] rather than an error.

mod git;
mod github;
mod proxy;
mod shell;
mod state;

use async_trait::async_trait;

use crate::error::Result;
use crate::mutate::PanelEntry;

pub use git::GitPublisher;
pub use github::{ContentsApi, GitHubContentsClient, GitHubPublisher, RemoteFile};
pub use proxy::{ProxyWorkflow, PROXY_BACKEND};
pub use shell::{shell_quote, CommandOutput, RemoteShell, SshShell};
pub use state::{
    StepRecord, WorkflowState, WorkflowStatus, WorkflowStep, CONTENTS_CHAIN, GIT_CHAIN, PROXY_CHAIN,
};

/// A versioned store for the brand → domain list document.
#[async_trait]
pub trait PanelPublisher: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Entries currently published for `brand`.
    async fn current_entries(&self, brand: &str) -> Result<Vec<PanelEntry>>;

    /// Makes `entry` the brand's primary and publishes the document.
    async fn publish(&self, brand: &str, entry: &PanelEntry, message: &str) -> WorkflowState;
}
