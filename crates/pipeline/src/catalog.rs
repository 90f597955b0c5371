use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use walkdir::WalkDir;
use crate::media::{FileId, MediaFile, MediaKind, Project, ProjectId};
use crate::stage::Stage;

/// Persistence for projects and files
///
/// Projects do not list their files; a file points at its project and
/// `list_files` resolves that back-reference.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<Project>>;

    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>>;

    async fn get_file(&self, id: FileId) -> Result<Option<MediaFile>>;

    async fn list_files(&self, project: &ProjectId) -> Result<Vec<MediaFile>>;

    /// Persist a new stage and return the updated project
    async fn update_project_stage(&self, project: &ProjectId, stage: Stage) -> Result<Project>;

    /// Move every file in `ids` to `project`; nothing moves if any id is unknown
    async fn reassign_files(&self, ids: &[FileId], project: &ProjectId) -> Result<()>;
}

/// Catalog stored as one JSON document per record
///
/// Layout: `<root>/projects/<project-id>.json` and `<root>/files/<file-id>.json`.
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    root: PathBuf,
}

impl JsonCatalog {
    /// Open a catalog rooted at `root`, creating the directory layout if needed
    pub fn open(root: &Path) -> Result<Self> {
        let catalog = JsonCatalog { root: root.to_path_buf() };
        for dir in [catalog.projects_dir(), catalog.files_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create catalog directory: {}", dir.display()))?;
        }
        Ok(catalog)
    }

    fn projects_dir(&self) -> PathBuf {
        self.root.join("projects")
    }

    fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    fn project_path(&self, id: &ProjectId) -> PathBuf {
        self.projects_dir().join(format!("{}.json", id))
    }

    fn file_path(&self, id: FileId) -> PathBuf {
        self.files_dir().join(format!("{}.json", id))
    }

    pub fn save_project(&self, project: &Project) -> Result<()> {
        write_json(&self.project_path(&project.id), project)
    }

    pub fn save_file(&self, file: &MediaFile) -> Result<()> {
        write_json(&self.file_path(file.id), file)
    }

    pub fn load_all_projects(&self) -> Result<Vec<Project>> {
        load_all(&self.projects_dir())
    }

    pub fn load_all_files(&self) -> Result<Vec<MediaFile>> {
        load_all(&self.files_dir())
    }

    /// Create and persist a new project at the initial stage
    pub fn create_project(&self, name: &str, color: &str) -> Result<Project> {
        let project = Project::new(name, color);
        self.save_project(&project)?;
        info!("Created project {} ({})", project.id, project.name);
        Ok(project)
    }

    /// Register a new file under the next free id
    pub fn add_file(
        &self,
        name: &str,
        url: &str,
        kind: MediaKind,
        project: Option<ProjectId>,
    ) -> Result<MediaFile> {
        if let Some(ref id) = project {
            if !self.project_path(id).exists() {
                anyhow::bail!("Unknown project: {}", id);
            }
        }

        let next_id = self
            .load_all_files()?
            .iter()
            .map(|f| f.id.0)
            .max()
            .map_or(1, |max| max + 1);

        let mut file = MediaFile::new(FileId(next_id), name, url, kind);
        file.project = project;
        self.save_file(&file)?;
        info!("Added {} file {} ({})", file.kind, file.id, file.name);
        Ok(file)
    }

    fn read_project(&self, id: &ProjectId) -> Result<Option<Project>> {
        let path = self.project_path(id);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn read_file(&self, id: FileId) -> Result<Option<MediaFile>> {
        let path = self.file_path(id);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize record: {}", path.display()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .with_context(|| format!("Failed to write record: {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move record into place: {}", path.display()))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read record: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse record: {}", path.display()))
}

/// Load every `*.json` record directly under `dir`, skipping unreadable ones
fn load_all<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut records = Vec::new();
    if !dir.exists() {
        return Ok(records);
    }

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to read directory: {}", dir.display()))?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(path) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping unreadable record {}: {:#}", path.display(), e),
        }
    }

    debug!("Loaded {} records from {}", records.len(), dir.display());
    Ok(records)
}

#[async_trait]
impl Catalog for JsonCatalog {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects = self.load_all_projects()?;
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>> {
        self.read_project(id)
    }

    async fn get_file(&self, id: FileId) -> Result<Option<MediaFile>> {
        self.read_file(id)
    }

    async fn list_files(&self, project: &ProjectId) -> Result<Vec<MediaFile>> {
        let mut files: Vec<MediaFile> = self
            .load_all_files()?
            .into_iter()
            .filter(|f| f.belongs_to(project))
            .collect();
        files.sort_by_key(|f| f.id);
        Ok(files)
    }

    async fn update_project_stage(&self, project: &ProjectId, stage: Stage) -> Result<Project> {
        let mut record = self
            .read_project(project)?
            .ok_or_else(|| anyhow!("Unknown project: {}", project))?;
        record.stage = stage;
        record.updated_at = Utc::now();
        self.save_project(&record)?;
        Ok(record)
    }

    async fn reassign_files(&self, ids: &[FileId], project: &ProjectId) -> Result<()> {
        if !self.project_path(project).exists() {
            anyhow::bail!("Unknown project: {}", project);
        }

        let mut files = Vec::with_capacity(ids.len());
        for id in ids {
            let file = self
                .read_file(*id)?
                .ok_or_else(|| anyhow!("Unknown file: {}", id))?;
            files.push(file);
        }

        for mut file in files {
            file.project = Some(project.clone());
            self.save_file(&file)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    projects: BTreeMap<ProjectId, Project>,
    files: BTreeMap<FileId, MediaFile>,
}

/// In-process catalog
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<MemoryState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| anyhow!("catalog state lock poisoned"))
    }

    pub fn insert_project(&self, project: Project) -> Result<()> {
        self.state()?.projects.insert(project.id.clone(), project);
        Ok(())
    }

    pub fn insert_file(&self, file: MediaFile) -> Result<()> {
        self.state()?.files.insert(file.id, file);
        Ok(())
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.state()?.projects.values().cloned().collect())
    }

    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>> {
        Ok(self.state()?.projects.get(id).cloned())
    }

    async fn get_file(&self, id: FileId) -> Result<Option<MediaFile>> {
        Ok(self.state()?.files.get(&id).cloned())
    }

    async fn list_files(&self, project: &ProjectId) -> Result<Vec<MediaFile>> {
        Ok(self
            .state()?
            .files
            .values()
            .filter(|f| f.belongs_to(project))
            .cloned()
            .collect())
    }

    async fn update_project_stage(&self, project: &ProjectId, stage: Stage) -> Result<Project> {
        let mut state = self.state()?;
        let record = state
            .projects
            .get_mut(project)
            .ok_or_else(|| anyhow!("Unknown project: {}", project))?;
        record.stage = stage;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn reassign_files(&self, ids: &[FileId], project: &ProjectId) -> Result<()> {
        let mut state = self.state()?;
        if !state.projects.contains_key(project) {
            anyhow::bail!("Unknown project: {}", project);
        }
        if let Some(missing) = ids.iter().find(|id| !state.files.contains_key(*id)) {
            anyhow::bail!("Unknown file: {}", missing);
        }
        for id in ids {
            if let Some(file) = state.files.get_mut(id) {
                file.project = Some(project.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_catalog_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = JsonCatalog::open(dir.path()).unwrap();

        let project = catalog.create_project("Documentary", "#aa3355").unwrap();
        let video = catalog
            .add_file("raw.mp4", "/media/raw.mp4", MediaKind::Video, Some(project.id.clone()))
            .unwrap();
        let loose = catalog
            .add_file("notes.txt", "/media/notes.txt", MediaKind::Text, None)
            .unwrap();
        assert_eq!(video.id, FileId(1));
        assert_eq!(loose.id, FileId(2));

        let files = catalog.list_files(&project.id).await.unwrap();
        assert_eq!(files, vec![video.clone()]);

        let reopened = JsonCatalog::open(dir.path()).unwrap();
        let loaded = reopened.get_project(&project.id).await.unwrap().unwrap();
        assert_eq!(loaded, project);
    }

    #[tokio::test]
    async fn test_json_catalog_stage_update() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = JsonCatalog::open(dir.path()).unwrap();
        let project = catalog.create_project("Promo", "#000000").unwrap();

        let updated = catalog
            .update_project_stage(&project.id, Stage::Compressed)
            .await
            .unwrap();
        assert_eq!(updated.stage, Stage::Compressed);
        assert!(updated.updated_at >= project.updated_at);

        let missing = ProjectId::from("does-not-exist");
        assert!(catalog.update_project_stage(&missing, Stage::Merged).await.is_err());
    }

    #[tokio::test]
    async fn test_json_catalog_reassign_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = JsonCatalog::open(dir.path()).unwrap();
        let source = catalog.create_project("Source", "#111111").unwrap();
        let target = catalog.create_project("Target", "#222222").unwrap();
        let file = catalog
            .add_file("clip.mp4", "/media/clip.mp4", MediaKind::Video, Some(source.id.clone()))
            .unwrap();

        assert!(catalog
            .reassign_files(&[file.id, FileId(99)], &target.id)
            .await
            .is_err());
        assert_eq!(catalog.list_files(&source.id).await.unwrap().len(), 1);

        catalog.reassign_files(&[file.id], &target.id).await.unwrap();
        assert!(catalog.list_files(&source.id).await.unwrap().is_empty());
        assert_eq!(catalog.list_files(&target.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_json_catalog_skips_corrupt_records() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = JsonCatalog::open(dir.path()).unwrap();
        catalog.create_project("Valid", "#333333").unwrap();
        fs::write(dir.path().join("projects").join("broken.json"), "{").unwrap();

        assert_eq!(catalog.list_projects().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_file_rejects_unknown_project() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = JsonCatalog::open(dir.path()).unwrap();
        let result = catalog.add_file(
            "a.mp3",
            "/media/a.mp3",
            MediaKind::Audio,
            Some(ProjectId::from("nope")),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_memory_catalog_reassign() {
        let catalog = MemoryCatalog::new();
        let project = Project::new("Memory", "#444444");
        catalog.insert_project(project.clone()).unwrap();
        catalog
            .insert_file(MediaFile::new(FileId(5), "a.mp3", "/a.mp3", MediaKind::Audio))
            .unwrap();

        assert!(catalog.list_files(&project.id).await.unwrap().is_empty());
        catalog.reassign_files(&[FileId(5)], &project.id).await.unwrap();
        assert_eq!(catalog.list_files(&project.id).await.unwrap().len(), 1);
        assert!(catalog.reassign_files(&[FileId(6)], &project.id).await.is_err());
    }
}
