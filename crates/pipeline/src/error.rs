use crate::media::{FileId, MediaKind, ProjectId};
use crate::selection::SelectionMode;
use crate::service::JobKind;
use crate::stage::{Action, Stage};

/// Errors surfaced by the session entry points.
///
/// None are fatal: the project and the selection stay usable afterwards, and
/// every retry is a fresh user action.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No file of the required kind exists for the project. Nothing was dispatched.
    #[error("no {kind} file found for {action}")]
    MissingInput { action: Action, kind: MediaKind },

    /// The processing service refused the job or could not be reached.
    #[error("{kind} job was not accepted: {reason}")]
    DispatchRejected { kind: JobKind, reason: String },

    /// The job was accepted but recording the new stage failed, so the
    /// stored stage may now lag behind the work that was scheduled.
    #[error("job accepted but stage {stage} could not be saved for project {project}: {reason}")]
    Persistence {
        project: ProjectId,
        stage: Stage,
        reason: String,
    },

    /// The catalog refused to move the selected files.
    #[error("files could not be moved to project {project}: {reason}")]
    ReassignFailed { project: ProjectId, reason: String },

    /// The action is more than one stage ahead of the project.
    #[error("{action} is not available while the project is {stage}")]
    ActionDisabled { action: Action, stage: Stage },

    #[error("unknown project: {0}")]
    UnknownProject(ProjectId),

    #[error("unknown file: {0}")]
    UnknownFile(FileId),

    /// The catalog could not be read.
    #[error("catalog unavailable: {0}")]
    Catalog(String),

    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// Errors raised by the selection constraint engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("no selection mode is active")]
    NoActiveMode,

    #[error("{expected} mode is required but {active} mode is active")]
    WrongMode {
        expected: SelectionMode,
        active: SelectionMode,
    },

    #[error("file {file} cannot be selected: {reason}")]
    NotSelectable { file: FileId, reason: String },

    #[error("selection is incomplete for {0} mode")]
    Incomplete(SelectionMode),

    #[error("action already accepted for this selection")]
    ActionLocked,
}
