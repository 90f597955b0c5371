pub mod config;
pub mod error;
pub mod media;
pub mod latest;
pub mod stage;
pub mod selection;
pub mod service;
pub mod catalog;
pub mod dispatcher;
pub mod session;

pub use config::PipelineConfig;
pub use error::{PipelineError, SelectionError};
pub use media::{FileId, MediaFile, MediaKind, Project, ProjectId};
pub use latest::{latest_file, LatestFiles};
pub use stage::{is_action_enabled, Action, Stage, SubtitleSource};
pub use selection::{SelectionMode, SelectionSet};
pub use service::{CommandService, JobKind, JobTicket, ProcessingService};
pub use catalog::{Catalog, JsonCatalog, MemoryCatalog};
pub use dispatcher::Dispatcher;
pub use session::{ActionOutcome, Notice, NoticeLevel, Session};
