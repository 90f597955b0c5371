use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use log::{info, warn};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use crate::error::PipelineError;
use crate::media::{FileId, ProjectId};
use crate::service::{JobKind, JobTicket, ProcessingService};
use crate::stage::{Action, Stage};

/// A job the processing service accepted, with the stage it moves the project to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub ticket: JobTicket,
    pub next_stage: Stage,
}

/// Sends pipeline jobs to the processing service
///
/// Never retries; a failed dispatch is retried by the user invoking the
/// same action again. Stage transitions for one project are serialized
/// through `lock`.
pub struct Dispatcher {
    service: Arc<dyn ProcessingService>,
    locks: Mutex<HashMap<ProjectId, Arc<AsyncMutex<()>>>>,
}

impl Dispatcher {
    pub fn new(service: Arc<dyn ProcessingService>) -> Self {
        Dispatcher {
            service,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Take the transition lock for `project`
    ///
    /// Hold the guard from reading the current stage until the new stage is
    /// committed. Other projects are not blocked. Entries nobody holds or
    /// waits on are dropped here, so the registry stays as large as the set
    /// of projects with a transition in progress.
    pub async fn lock(&self, project: &ProjectId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|id, l| id == project || Arc::strong_count(l) > 1);
            locks
                .entry(project.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of projects currently tracked by the lock registry
    pub fn tracked_projects(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Schedule one job; any failure, including a timeout, is a rejection
    pub async fn dispatch(&self, kind: JobKind, file_ids: &[FileId]) -> Result<JobTicket, PipelineError> {
        match self.service.schedule_job(kind, file_ids).await {
            Ok(ticket) => {
                info!("{} job {} accepted for files {:?}", kind, ticket.id, file_ids);
                Ok(ticket)
            }
            Err(e) => {
                warn!("{} job rejected for files {:?}: {:#}", kind, file_ids, e);
                Err(PipelineError::DispatchRejected {
                    kind,
                    reason: format!("{:#}", e),
                })
            }
        }
    }

    /// Dispatch `action` for a project currently at `stage`
    ///
    /// On acceptance the transition function decides the next stage; on
    /// rejection no transition happens.
    pub async fn dispatch_action(
        &self,
        action: Action,
        stage: Stage,
        file_ids: &[FileId],
    ) -> Result<Accepted, PipelineError> {
        let ticket = self.dispatch(action.job_kind(), file_ids).await?;
        Ok(Accepted {
            ticket,
            next_stage: stage.after(action),
        })
    }
}
