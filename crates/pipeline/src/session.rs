use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use log::{debug, error, info, warn};
use crate::catalog::Catalog;
use crate::config::PipelineConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{PipelineError, SelectionError};
use crate::latest::LatestFiles;
use crate::media::{FileId, MediaFile, MediaKind, Project, ProjectId};
use crate::selection::{SelectionMode, SelectionSet};
use crate::service::{JobKind, JobTicket, ProcessingService};
use crate::stage::{is_action_enabled, Action, Stage, SubtitleSource};

/// Cached state for one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectView {
    pub project: Project,
    pub files: Vec<MediaFile>,
    pub latest: LatestFiles,
}

impl ProjectView {
    fn new(project: Project, files: Vec<MediaFile>) -> Self {
        let latest = LatestFiles::from_files(&files);
        ProjectView { project, files, latest }
    }
}

/// Result of an accepted pipeline action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub action: Action,
    pub ticket: JobTicket,
    pub previous_stage: Stage,
    pub stage: Stage,
}

impl ActionOutcome {
    pub fn advanced(&self) -> bool {
        self.stage != self.previous_stage
    }

    pub fn notice(&self) -> Notice {
        let what = match self.action {
            Action::Compress => "Video compression scheduled",
            Action::Merge => "Audio merge scheduled",
            Action::Trim => "Video trim scheduled",
            Action::GenerateSubtitles => "Subtitle generation scheduled",
            Action::AddSubtitles => "Subtitle burn-in scheduled",
        };
        Notice::success(format!("{} (job {})", what, self.ticket.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    /// The job went through but stored state no longer matches it
    Warning,
    Error,
}

/// Transient user-facing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Notice { level: NoticeLevel::Success, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Notice { level: NoticeLevel::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Notice { level: NoticeLevel::Error, message: message.into() }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl PipelineError {
    pub fn notice(&self) -> Notice {
        match self {
            PipelineError::Persistence { .. } => Notice::warning(self.to_string()),
            _ => Notice::error(self.to_string()),
        }
    }
}

/// Marks an action as in flight until dropped
struct PendingGuard<'a> {
    pending: &'a Mutex<HashSet<(ProjectId, Action)>>,
    key: (ProjectId, Action),
}

impl<'a> PendingGuard<'a> {
    fn new(pending: &'a Mutex<HashSet<(ProjectId, Action)>>, key: (ProjectId, Action)) -> Self {
        lock(pending).insert(key.clone());
        PendingGuard { pending, key }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.key);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn catalog_error(e: anyhow::Error) -> PipelineError {
    PipelineError::Catalog(format!("{:#}", e))
}

/// Session-scoped context shared by every UI entry point
///
/// Caches each project's record, its files and the latest file per kind, and
/// owns the selection. Nothing is refreshed behind the caller's back;
/// collaborators that write files call `notify_files_changed`.
pub struct Session {
    subtitle_source: SubtitleSource,
    catalog: Arc<dyn Catalog>,
    dispatcher: Dispatcher,
    projects: Mutex<HashMap<ProjectId, ProjectView>>,
    selection: Mutex<SelectionSet>,
    pending: Mutex<HashSet<(ProjectId, Action)>>,
}

impl Session {
    pub fn new(
        config: &PipelineConfig,
        catalog: Arc<dyn Catalog>,
        service: Arc<dyn ProcessingService>,
    ) -> Self {
        Session {
            subtitle_source: config.subtitle_source,
            catalog,
            dispatcher: Dispatcher::new(service),
            projects: Mutex::new(HashMap::new()),
            selection: Mutex::new(SelectionSet::new()),
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Load every project from the catalog along with its files
    pub async fn load_projects(&self) -> Result<Vec<ProjectView>, PipelineError> {
        let projects = self.catalog.list_projects().await.map_err(catalog_error)?;
        let mut views = Vec::with_capacity(projects.len());

        for project in projects {
            let files = self.catalog.list_files(&project.id).await.map_err(catalog_error)?;
            views.push(ProjectView::new(project, files));
        }

        let mut cache = lock(&self.projects);
        for view in &views {
            cache.insert(view.project.id.clone(), view.clone());
        }
        info!("Loaded {} project(s)", views.len());
        Ok(views)
    }

    /// Load or reload a single project
    pub async fn load_project(&self, id: &ProjectId) -> Result<ProjectView, PipelineError> {
        let project = self
            .catalog
            .get_project(id)
            .await
            .map_err(catalog_error)?
            .ok_or_else(|| PipelineError::UnknownProject(id.clone()))?;
        let files = self.catalog.list_files(id).await.map_err(catalog_error)?;

        let view = ProjectView::new(project, files);
        lock(&self.projects).insert(id.clone(), view.clone());
        Ok(view)
    }

    pub fn project(&self, id: &ProjectId) -> Option<ProjectView> {
        lock(&self.projects).get(id).cloned()
    }

    pub fn projects(&self) -> Vec<ProjectView> {
        let mut views: Vec<_> = lock(&self.projects).values().cloned().collect();
        views.sort_by(|a, b| b.project.created_at.cmp(&a.project.created_at));
        views
    }

    pub fn stage(&self, id: &ProjectId) -> Option<Stage> {
        lock(&self.projects).get(id).map(|v| v.project.stage)
    }

    pub fn latest(&self, id: &ProjectId) -> Option<LatestFiles> {
        lock(&self.projects).get(id).map(|v| v.latest.clone())
    }

    /// Re-read a project's files after a collaborator changed them
    pub async fn notify_files_changed(&self, id: &ProjectId) -> Result<LatestFiles, PipelineError> {
        if self.project(id).is_none() {
            return self.load_project(id).await.map(|v| v.latest);
        }

        let files = self.catalog.list_files(id).await.map_err(catalog_error)?;
        let latest = LatestFiles::from_files(&files);

        let mut cache = lock(&self.projects);
        let view = cache
            .get_mut(id)
            .ok_or_else(|| PipelineError::UnknownProject(id.clone()))?;
        view.files = files;
        view.latest = latest.clone();
        debug!("Refreshed {} file(s) for project {}", view.files.len(), id);
        Ok(latest)
    }

    pub fn is_action_enabled(&self, id: &ProjectId, action: Action) -> bool {
        self.stage(id)
            .map(|stage| is_action_enabled(stage, action))
            .unwrap_or(false)
    }

    pub fn is_pending(&self, id: &ProjectId, action: Action) -> bool {
        lock(&self.pending).contains(&(id.clone(), action))
    }

    /// Run a pipeline action on a project
    ///
    /// Inputs are checked before anything is sent. The stored stage only
    /// moves once the job is accepted and the new stage is persisted; on any
    /// failure the cached stage stays where it was.
    pub async fn perform_action(
        &self,
        id: &ProjectId,
        action: Action,
    ) -> Result<ActionOutcome, PipelineError> {
        let view = self
            .project(id)
            .ok_or_else(|| PipelineError::UnknownProject(id.clone()))?;

        if !is_action_enabled(view.project.stage, action) {
            return Err(PipelineError::ActionDisabled {
                action,
                stage: view.project.stage,
            });
        }

        let file_ids = action.resolve_inputs(&view.latest, self.subtitle_source)?;

        let _pending = PendingGuard::new(&self.pending, (id.clone(), action));
        let _guard = self.dispatcher.lock(id).await;

        // the stage may have moved while waiting for the lock
        let stage = self
            .stage(id)
            .ok_or_else(|| PipelineError::UnknownProject(id.clone()))?;
        let accepted = self.dispatcher.dispatch_action(action, stage, &file_ids).await?;

        if accepted.next_stage == stage {
            debug!("{} on project {} left stage at {}", action, id, stage);
            return Ok(ActionOutcome {
                action,
                ticket: accepted.ticket,
                previous_stage: stage,
                stage,
            });
        }

        let persisted = match self.catalog.update_project_stage(id, accepted.next_stage).await {
            Ok(project) => project,
            Err(e) => {
                error!(
                    "Job {} accepted but stage {} was not saved for project {}: {:#}",
                    accepted.ticket.id, accepted.next_stage, id, e
                );
                return Err(PipelineError::Persistence {
                    project: id.clone(),
                    stage: accepted.next_stage,
                    reason: format!("{:#}", e),
                });
            }
        };

        if let Some(view) = lock(&self.projects).get_mut(id) {
            view.project = persisted;
        }

        info!("Project {} advanced {} -> {}", id, stage, accepted.next_stage);
        Ok(ActionOutcome {
            action,
            ticket: accepted.ticket,
            previous_stage: stage,
            stage: accepted.next_stage,
        })
    }

    pub fn selection(&self) -> SelectionSet {
        lock(&self.selection).clone()
    }

    /// Enter a selection mode, discarding any selection from the other mode
    pub fn enter_mode(&self, mode: SelectionMode) {
        lock(&self.selection).enter(mode);
        debug!("Entered {} selection mode", mode);
    }

    /// Leave selection mode; jobs already dispatched keep running
    pub fn exit_mode(&self) {
        lock(&self.selection).exit();
    }

    pub fn can_add(&self, file: &MediaFile) -> bool {
        lock(&self.selection).can_add(file)
    }

    pub fn can_remove(&self, id: FileId) -> bool {
        lock(&self.selection).can_remove(id)
    }

    /// Select or deselect a file by id; returns whether it ends up selected
    pub async fn toggle_file(&self, id: FileId) -> Result<bool, PipelineError> {
        let file = self
            .catalog
            .get_file(id)
            .await
            .map_err(catalog_error)?
            .ok_or(PipelineError::UnknownFile(id))?;
        self.toggle(&file)
    }

    pub fn toggle(&self, file: &MediaFile) -> Result<bool, PipelineError> {
        Ok(lock(&self.selection).toggle(file)?)
    }

    /// Complete a sync selection by merging the selected audio into the selected video
    ///
    /// No project stage changes. On acceptance the sync control stays
    /// disabled until the selection changes.
    pub async fn perform_sync(&self) -> Result<JobTicket, PipelineError> {
        let (snapshot, file_ids) = {
            let selection = lock(&self.selection);
            selection.require_ready(SelectionMode::Sync)?;
            let audio = selection
                .selected_of(MediaKind::Audio)
                .ok_or(SelectionError::Incomplete(SelectionMode::Sync))?;
            let video = selection
                .selected_of(MediaKind::Video)
                .ok_or(SelectionError::Incomplete(SelectionMode::Sync))?;
            (selection.clone(), vec![audio, video])
        };

        let ticket = self.dispatcher.dispatch(JobKind::MergeAudio, &file_ids).await?;

        let mut selection = lock(&self.selection);
        if *selection == snapshot {
            selection.lock_action();
        } else {
            debug!("Selection changed while sync job {} was in flight", ticket.id);
        }
        Ok(ticket)
    }

    /// Move every selected file to `target` and clear the selection
    ///
    /// Returns the number of files moved. Every project that lost or gained
    /// files is refreshed.
    pub async fn perform_bulk_reassign(&self, target: &ProjectId) -> Result<usize, PipelineError> {
        let (snapshot, ids) = {
            let selection = lock(&self.selection);
            selection.require_ready(SelectionMode::BulkReassign)?;
            (selection.clone(), selection.ids())
        };

        if self.project(target).is_none() {
            self.load_project(target).await?;
        }

        let mut affected = BTreeSet::new();
        affected.insert(target.clone());
        for id in &ids {
            let file = self
                .catalog
                .get_file(*id)
                .await
                .map_err(catalog_error)?
                .ok_or(PipelineError::UnknownFile(*id))?;
            if let Some(source) = file.project {
                affected.insert(source);
            }
        }

        if let Err(e) = self.catalog.reassign_files(&ids, target).await {
            warn!("Moving {} file(s) to project {} failed: {:#}", ids.len(), target, e);
            return Err(PipelineError::ReassignFailed {
                project: target.clone(),
                reason: format!("{:#}", e),
            });
        }
        info!("Moved {} file(s) to project {}", ids.len(), target);

        {
            let mut selection = lock(&self.selection);
            if *selection == snapshot {
                selection.clear();
            }
        }

        // the move is already committed; a stale cache must not turn it into an error
        for project in &affected {
            if let Err(e) = self.notify_files_changed(project).await {
                warn!("Could not refresh project {} after reassignment: {}", project, e);
            }
        }
        Ok(ids.len())
    }
}
