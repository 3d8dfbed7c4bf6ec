use std::fmt;

use serde::{Deserialize, Serialize};

/// Steps of the publish pipelines, in the order they can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStep {
    Download,
    Modify,
    Backup,
    Upload,
    Validate,
    Reload,
    Fetch,
    Mutate,
    Commit,
    Push,
}

impl WorkflowStep {
    /// Steps after which the live system differs from before the run.
    fn changes_live_system(self) -> bool {
        matches!(self, WorkflowStep::Upload | WorkflowStep::Push)
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowStep::Download => "DOWNLOAD",
            WorkflowStep::Modify => "MODIFY",
            WorkflowStep::Backup => "BACKUP",
            WorkflowStep::Upload => "UPLOAD",
            WorkflowStep::Validate => "VALIDATE",
            WorkflowStep::Reload => "RELOAD",
            WorkflowStep::Fetch => "FETCH",
            WorkflowStep::Mutate => "MUTATE",
            WorkflowStep::Commit => "COMMIT",
            WorkflowStep::Push => "PUSH",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: WorkflowStep,
    pub ok: bool,
}

/// Derived outcome of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Succeeded,
    /// Failed before anything live changed
    Failed,
    /// The live system changed but a later step failed
    Unverified,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStatus::Succeeded => write!(f, "SUCCEEDED"),
            WorkflowStatus::Failed => write!(f, "FAILED"),
            WorkflowStatus::Unverified => write!(f, "UNVERIFIED"),
        }
    }
}

/// Step chain of the reverse-proxy workflow.
pub const PROXY_CHAIN: &[WorkflowStep] = &[
    WorkflowStep::Download,
    WorkflowStep::Modify,
    WorkflowStep::Backup,
    WorkflowStep::Upload,
    WorkflowStep::Validate,
    WorkflowStep::Reload,
];

/// Step chain of the hosted contents API publisher.
pub const CONTENTS_CHAIN: &[WorkflowStep] = &[
    WorkflowStep::Fetch,
    WorkflowStep::Mutate,
    WorkflowStep::Commit,
];

/// Step chain of the local clone publisher.
pub const GIT_CHAIN: &[WorkflowStep] = &[
    WorkflowStep::Fetch,
    WorkflowStep::Mutate,
    WorkflowStep::Commit,
    WorkflowStep::Push,
];

/// Step-by-step record of one publish run.
///
/// `steps` holds the whole chain of the backend in order. Each entry starts
/// out `false` and flips to `true` once the step completes, so steps that
/// never ran stay `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub backend: String,
    pub steps: Vec<StepRecord>,
    /// Step that halted the run
    pub halted_at: Option<WorkflowStep>,
    pub backup_reference: Option<String>,
    pub error: Option<String>,
    pub success: bool,
    /// The change was already in place
    pub noop: bool,
}

impl WorkflowState {
    pub fn new(backend: impl Into<String>, chain: &[WorkflowStep]) -> Self {
        Self {
            backend: backend.into(),
            steps: chain
                .iter()
                .map(|&step| StepRecord { step, ok: false })
                .collect(),
            halted_at: None,
            backup_reference: None,
            error: None,
            success: false,
            noop: false,
        }
    }

    pub fn pass(&mut self, step: WorkflowStep) {
        match self.steps.iter_mut().find(|s| s.step == step) {
            Some(record) => record.ok = true,
            None => self.steps.push(StepRecord { step, ok: true }),
        }
    }

    /// Records `step` as failed and returns the finished state.
    pub fn fail(mut self, step: WorkflowStep, error: impl fmt::Display) -> Self {
        match self.steps.iter_mut().find(|s| s.step == step) {
            Some(record) => record.ok = false,
            None => self.steps.push(StepRecord { step, ok: false }),
        }
        self.halted_at = Some(step);
        self.error = Some(format!("{}: {}", step, error));
        self.success = false;
        self
    }

    /// Finishes the run; successful only when every step in the chain passed.
    pub fn succeed(mut self) -> Self {
        self.success = self.error.is_none() && self.steps.iter().all(|s| s.ok);
        self
    }

    /// Finishes early because the change is already present. The remaining
    /// steps stay `false`.
    pub fn noop(mut self) -> Self {
        self.noop = true;
        self.success = self.error.is_none();
        self
    }

    pub fn step(&self, step: WorkflowStep) -> Option<bool> {
        self.steps.iter().find(|s| s.step == step).map(|s| s.ok)
    }

    pub fn failed_step(&self) -> Option<WorkflowStep> {
        self.halted_at
    }

    pub fn status(&self) -> WorkflowStatus {
        if self.success {
            WorkflowStatus::Succeeded
        } else if self
            .steps
            .iter()
            .any(|s| s.ok && s.step.changes_live_system())
        {
            WorkflowStatus::Unverified
        } else {
            WorkflowStatus::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_before_upload_is_clean() {
        let mut state = WorkflowState::new("ssh", PROXY_CHAIN);
        state.pass(WorkflowStep::Download);
        state.pass(WorkflowStep::Modify);
        let state = state.fail(WorkflowStep::Backup, "cp: permission denied");

        assert_eq!(state.status(), WorkflowStatus::Failed);
        assert_eq!(state.failed_step(), Some(WorkflowStep::Backup));
        assert_eq!(state.error.as_deref(), Some("BACKUP: cp: permission denied"));
        assert_eq!(state.step(WorkflowStep::Upload), Some(false));
        assert_eq!(state.steps.len(), 6);
    }

    #[test]
    fn test_failure_after_upload_is_unverified() {
        let mut state = WorkflowState::new("ssh", PROXY_CHAIN);
        for step in [
            WorkflowStep::Download,
            WorkflowStep::Modify,
            WorkflowStep::Backup,
            WorkflowStep::Upload,
        ] {
            state.pass(step);
        }
        let state = state.fail(WorkflowStep::Validate, "invalid directive");

        assert_eq!(state.status(), WorkflowStatus::Unverified);
        assert!(!state.success);
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
    }

    #[test]
    fn test_partial_chain_is_not_success() {
        let mut state = WorkflowState::new("git", GIT_CHAIN);
        state.pass(WorkflowStep::Fetch);
        state.pass(WorkflowStep::Mutate);
        let state = state.succeed();

        assert!(!state.success);
        assert_eq!(state.status(), WorkflowStatus::Failed);
    }

    #[test]
    fn test_noop_is_success() {
        let mut state = WorkflowState::new("github", CONTENTS_CHAIN);
        state.pass(WorkflowStep::Fetch);
        state.pass(WorkflowStep::Mutate);
        let state = state.noop();

        assert!(state.success);
        assert!(state.noop);
        assert_eq!(state.step(WorkflowStep::Commit), Some(false));
        assert_eq!(state.status(), WorkflowStatus::Succeeded);
    }

    #[test]
    fn test_serializes_step_names() {
        let mut state = WorkflowState::new("github", CONTENTS_CHAIN);
        for step in CONTENTS_CHAIN {
            state.pass(*step);
        }
        let json = serde_json::to_value(state.succeed()).unwrap();

        assert_eq!(json["steps"][0]["step"], "FETCH");
        assert_eq!(json["steps"][2]["step"], "COMMIT");
        assert_eq!(json["success"], true);
    }
}
