use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::error::SelectionError;
use crate::media::{FileId, MediaFile, MediaKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionMode {
    Sync,
    BulkReassign,
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionMode::Sync => f.write_str("sync"),
            SelectionMode::BulkReassign => f.write_str("bulk-reassign"),
        }
    }
}

/// Whether `file` may be added to `selected` under `mode`
///
/// A file that is already selected always passes, so the same control can
/// deselect it.
pub fn can_add(file: &MediaFile, selected: &BTreeMap<FileId, MediaKind>, mode: SelectionMode) -> bool {
    if selected.contains_key(&file.id) {
        return true;
    }

    match mode {
        SelectionMode::BulkReassign => true,
        SelectionMode::Sync => {
            if !file.kind.is_syncable() {
                return false;
            }
            match selected.len() {
                0 => true,
                1 => selected.values().all(|kind| *kind != file.kind),
                _ => false,
            }
        }
    }
}

/// Session-scoped selection state
///
/// Holds at most one selection, in one of two mutually exclusive modes. Sync
/// mode builds a cross-project pair of one video and one audio file;
/// bulk-reassign mode collects any files to move them to another project.
///
/// The action control is one-shot: once an action on this selection has been
/// accepted it stays disabled until the selection changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    mode: Option<SelectionMode>,
    entries: BTreeMap<FileId, MediaKind>,
    action_locked: bool,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Option<SelectionMode> {
        self.mode
    }

    pub fn entries(&self) -> &BTreeMap<FileId, MediaKind> {
        &self.entries
    }

    pub fn ids(&self) -> Vec<FileId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: FileId) -> bool {
        self.entries.contains_key(&id)
    }

    /// First selected file of `kind`
    pub fn selected_of(&self, kind: MediaKind) -> Option<FileId> {
        self.entries
            .iter()
            .find(|(_, k)| **k == kind)
            .map(|(id, _)| *id)
    }

    pub fn is_action_locked(&self) -> bool {
        self.action_locked
    }

    /// Enter `mode`, dropping whatever the previous mode had selected
    pub fn enter(&mut self, mode: SelectionMode) {
        self.mode = Some(mode);
        self.clear();
    }

    /// Leave the current mode. Jobs already dispatched are unaffected.
    pub fn exit(&mut self) {
        self.mode = None;
        self.clear();
    }

    /// Drop all entries and release the action lock, staying in the current mode
    pub fn clear(&mut self) {
        self.entries.clear();
        self.action_locked = false;
    }

    pub fn can_add(&self, file: &MediaFile) -> bool {
        match self.mode {
            Some(mode) => can_add(file, &self.entries, mode),
            None => false,
        }
    }

    pub fn can_remove(&self, id: FileId) -> bool {
        self.contains(id)
    }

    /// Select `file`, or deselect it if it is already selected
    ///
    /// Returns whether the file is selected afterwards.
    pub fn toggle(&mut self, file: &MediaFile) -> Result<bool, SelectionError> {
        let mode = self.mode.ok_or(SelectionError::NoActiveMode)?;

        if self.entries.remove(&file.id).is_some() {
            self.action_locked = false;
            return Ok(false);
        }

        if !can_add(file, &self.entries, mode) {
            return Err(SelectionError::NotSelectable {
                file: file.id,
                reason: self.rejection_reason(file),
            });
        }

        self.entries.insert(file.id, file.kind);
        self.action_locked = false;
        Ok(true)
    }

    fn rejection_reason(&self, file: &MediaFile) -> String {
        if !file.kind.is_syncable() {
            format!("{} files cannot be synced", file.kind)
        } else if self.entries.len() >= 2 {
            "a video and an audio file are already selected".to_string()
        } else {
            format!("a {} file is already selected", file.kind)
        }
    }

    /// Whether the selection is complete enough for its mode's action
    pub fn is_complete(&self) -> bool {
        match self.mode {
            Some(SelectionMode::Sync) => {
                self.selected_of(MediaKind::Video).is_some()
                    && self.selected_of(MediaKind::Audio).is_some()
            }
            Some(SelectionMode::BulkReassign) => !self.entries.is_empty(),
            None => false,
        }
    }

    pub fn is_action_enabled(&self) -> bool {
        !self.action_locked && self.is_complete()
    }

    /// Check that the action for `mode` may run on the current selection
    pub fn require_ready(&self, mode: SelectionMode) -> Result<(), SelectionError> {
        let active = self.mode.ok_or(SelectionError::NoActiveMode)?;
        if active != mode {
            return Err(SelectionError::WrongMode { expected: mode, active });
        }
        if self.action_locked {
            return Err(SelectionError::ActionLocked);
        }
        if !self.is_complete() {
            return Err(SelectionError::Incomplete(mode));
        }
        Ok(())
    }

    /// Disable the action control until the selection changes
    pub fn lock_action(&mut self) {
        self.action_locked = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn file(id: u64, kind: MediaKind) -> MediaFile {
        MediaFile::new(FileId(id), format!("file-{}", id), format!("/media/{}", id), kind)
    }

    fn media_kind() -> impl Strategy<Value = MediaKind> {
        prop::sample::select(MediaKind::ALL.to_vec())
    }

    #[test]
    fn test_sync_selection_scenario() {
        let mut selection = SelectionSet::new();
        selection.enter(SelectionMode::Sync);

        let v1 = file(1, MediaKind::Video);
        let v2 = file(2, MediaKind::Video);
        let a1 = file(3, MediaKind::Audio);
        let a2 = file(4, MediaKind::Audio);

        assert_eq!(selection.toggle(&v1), Ok(true));
        assert!(!selection.can_add(&v2));
        assert!(matches!(selection.toggle(&v2), Err(SelectionError::NotSelectable { .. })));
        assert_eq!(selection.toggle(&a1), Ok(true));
        assert_eq!(selection.len(), 2);
        assert!(!selection.can_add(&a2));
        assert!(selection.toggle(&a2).is_err());

        // selected files stay re-selectable so they can be removed
        assert!(selection.can_add(&v1));
        assert!(selection.can_remove(v1.id));
        assert_eq!(selection.toggle(&v1), Ok(false));
        assert_eq!(selection.ids(), vec![a1.id]);
    }

    #[test]
    fn test_sync_rejects_non_media_kinds() {
        let mut selection = SelectionSet::new();
        selection.enter(SelectionMode::Sync);
        assert!(!selection.can_add(&file(1, MediaKind::Transcript)));
        assert!(!selection.can_add(&file(2, MediaKind::Text)));
    }

    #[test]
    fn test_bulk_mode_accepts_everything() {
        let mut selection = SelectionSet::new();
        selection.enter(SelectionMode::BulkReassign);
        for (i, kind) in [MediaKind::Video, MediaKind::Video, MediaKind::Text, MediaKind::Audio]
            .into_iter()
            .enumerate()
        {
            assert_eq!(selection.toggle(&file(i as u64, kind)), Ok(true));
        }
        assert_eq!(selection.len(), 4);
        assert!(selection.is_action_enabled());
    }

    #[test]
    fn test_no_mode_means_nothing_selectable() {
        let mut selection = SelectionSet::new();
        let v = file(1, MediaKind::Video);
        assert!(!selection.can_add(&v));
        assert_eq!(selection.toggle(&v), Err(SelectionError::NoActiveMode));
    }

    #[test]
    fn test_switching_modes_clears_selection_and_lock() {
        let mut selection = SelectionSet::new();
        selection.enter(SelectionMode::Sync);
        selection.toggle(&file(1, MediaKind::Video)).unwrap();
        selection.toggle(&file(2, MediaKind::Audio)).unwrap();
        selection.lock_action();

        selection.enter(SelectionMode::BulkReassign);
        assert!(selection.is_empty());
        assert!(!selection.is_action_locked());
        assert_eq!(selection.mode(), Some(SelectionMode::BulkReassign));

        selection.exit();
        assert_eq!(selection.mode(), None);
        assert!(selection.is_empty());
    }

    #[test]
    fn test_action_lock_released_by_selection_change() {
        let mut selection = SelectionSet::new();
        selection.enter(SelectionMode::Sync);
        let v = file(1, MediaKind::Video);
        selection.toggle(&v).unwrap();
        selection.toggle(&file(2, MediaKind::Audio)).unwrap();
        assert!(selection.is_action_enabled());

        selection.lock_action();
        assert!(!selection.is_action_enabled());
        assert_eq!(selection.require_ready(SelectionMode::Sync), Err(SelectionError::ActionLocked));

        selection.toggle(&v).unwrap();
        selection.toggle(&v).unwrap();
        assert!(selection.is_action_enabled());
    }

    #[test]
    fn test_require_ready_checks_mode_and_completeness() {
        let mut selection = SelectionSet::new();
        assert_eq!(selection.require_ready(SelectionMode::Sync), Err(SelectionError::NoActiveMode));

        selection.enter(SelectionMode::Sync);
        selection.toggle(&file(1, MediaKind::Video)).unwrap();
        assert_eq!(
            selection.require_ready(SelectionMode::Sync),
            Err(SelectionError::Incomplete(SelectionMode::Sync))
        );
        assert_eq!(
            selection.require_ready(SelectionMode::BulkReassign),
            Err(SelectionError::WrongMode {
                expected: SelectionMode::BulkReassign,
                active: SelectionMode::Sync,
            })
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// No sequence of toggles in sync mode yields more than one video and one audio file
        #[test]
        fn test_sync_selection_bounded(picks in prop::collection::vec((0u64..12, media_kind()), 0..40)) {
            let mut selection = SelectionSet::new();
            selection.enter(SelectionMode::Sync);

            for (id, kind) in picks {
                let _ = selection.toggle(&file(id, kind));

                let videos = selection.entries().values().filter(|k| **k == MediaKind::Video).count();
                let audios = selection.entries().values().filter(|k| **k == MediaKind::Audio).count();
                prop_assert!(videos <= 1, "{} videos selected", videos);
                prop_assert!(audios <= 1, "{} audio files selected", audios);
                prop_assert_eq!(selection.len(), videos + audios);
            }
        }

        /// A rejected toggle leaves the selection untouched
        #[test]
        fn test_rejected_toggle_is_noop(picks in prop::collection::vec((0u64..12, media_kind()), 0..40)) {
            let mut selection = SelectionSet::new();
            selection.enter(SelectionMode::Sync);

            for (id, kind) in picks {
                let before = selection.clone();
                if selection.toggle(&file(id, kind)).is_err() {
                    prop_assert_eq!(&selection, &before);
                }
            }
        }
    }
}
