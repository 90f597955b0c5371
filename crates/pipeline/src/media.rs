use std::fmt;
use std::str::FromStr;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::stage::Stage;

/// Identifier of an uploaded media file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(FileId)
            .map_err(|_| anyhow!("Invalid file id: {}", s))
    }
}

/// Identifier of a project
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn generate() -> Self {
        ProjectId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        ProjectId(s.to_string())
    }
}

/// Kind of media carried by a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Transcript,
    Text,
}

impl MediaKind {
    pub const ALL: [MediaKind; 4] = [
        MediaKind::Video,
        MediaKind::Audio,
        MediaKind::Transcript,
        MediaKind::Text,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Transcript => "transcript",
            MediaKind::Text => "text",
        }
    }

    /// Only video and audio files take part in a sync selection
    pub fn is_syncable(&self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::Audio)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "video" => Ok(MediaKind::Video),
            "audio" => Ok(MediaKind::Audio),
            "transcript" => Ok(MediaKind::Transcript),
            "text" => Ok(MediaKind::Text),
            other => Err(anyhow!("Unknown media kind: {}", other)),
        }
    }
}

/// An uploaded asset, optionally tied to a project
///
/// Everything except `project` is fixed once the file exists; only a bulk
/// reassignment moves a file between projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: FileId,
    pub name: String,
    pub url: String,
    pub kind: MediaKind,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub project: Option<ProjectId>,
}

impl MediaFile {
    pub fn new(id: FileId, name: impl Into<String>, url: impl Into<String>, kind: MediaKind) -> Self {
        MediaFile {
            id,
            name: name.into(),
            url: url.into(),
            kind,
            created_at: Utc::now(),
            thumbnail: None,
            project: None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.project.is_some()
    }

    pub fn belongs_to(&self, project: &ProjectId) -> bool {
        self.project.as_ref() == Some(project)
    }
}

/// A processing workflow over one video and its audio/transcript assets
///
/// Files are not held here; they point back at the project and are looked
/// up through the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub stage: Stage,
}

impl Project {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        let now = Utc::now();
        Project {
            id: ProjectId::generate(),
            name: name.into(),
            color: color.into(),
            created_at: now,
            updated_at: now,
            stage: Stage::Initial,
        }
    }
}
