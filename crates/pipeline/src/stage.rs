use std::fmt;
use std::str::FromStr;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use crate::error::PipelineError;
use crate::latest::LatestFiles;
use crate::media::{FileId, MediaKind};
use crate::service::JobKind;

/// Ordered pipeline position of a project
///
/// Stages form a closed, totally ordered set. Each action targets exactly one
/// stage and can only advance a project that sits on the stage just before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    #[default]
    Initial,
    Compressed,
    Merged,
    Trimmed,
    SubtitlesGenerated,
    Completed,
}

impl Stage {
    /// Stages in pipeline order; a stage's index is its ordinal
    pub const ORDER: [Stage; 6] = [
        Stage::Initial,
        Stage::Compressed,
        Stage::Merged,
        Stage::Trimmed,
        Stage::SubtitlesGenerated,
        Stage::Completed,
    ];

    pub fn ordinal(&self) -> usize {
        match self {
            Stage::Initial => 0,
            Stage::Compressed => 1,
            Stage::Merged => 2,
            Stage::Trimmed => 3,
            Stage::SubtitlesGenerated => 4,
            Stage::Completed => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initial => "initial",
            Stage::Compressed => "compressed",
            Stage::Merged => "merged",
            Stage::Trimmed => "trimmed",
            Stage::SubtitlesGenerated => "subtitlesGenerated",
            Stage::Completed => "completed",
        }
    }

    /// No action advances a completed project
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed)
    }

    /// Stage after `action` has been accepted
    ///
    /// Advances by one position only when the project is exactly on the
    /// action's required stage. Re-running an earlier action, or running
    /// anything on a completed project, leaves the stage where it is.
    pub fn after(self, action: Action) -> Stage {
        if self == action.required_stage() {
            action.target_stage()
        } else {
            self
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Stage::ORDER
            .iter()
            .copied()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("Unknown stage: {}", s))
    }
}

/// A user-triggered pipeline action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Compress,
    Merge,
    Trim,
    GenerateSubtitles,
    AddSubtitles,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Compress,
        Action::Merge,
        Action::Trim,
        Action::GenerateSubtitles,
        Action::AddSubtitles,
    ];

    /// Stage a project reaches when this action advances it
    pub fn target_stage(&self) -> Stage {
        match self {
            Action::Compress => Stage::Compressed,
            Action::Merge => Stage::Merged,
            Action::Trim => Stage::Trimmed,
            Action::GenerateSubtitles => Stage::SubtitlesGenerated,
            Action::AddSubtitles => Stage::Completed,
        }
    }

    /// Stage a project must be on for this action to advance it
    pub fn required_stage(&self) -> Stage {
        Stage::ORDER[self.target_stage().ordinal() - 1]
    }

    /// Position of the action in the pipeline, shared with its target stage
    pub fn ordinal(&self) -> usize {
        self.target_stage().ordinal()
    }

    pub fn job_kind(&self) -> JobKind {
        match self {
            Action::Compress => JobKind::CompressVideo,
            Action::Merge => JobKind::MergeAudio,
            Action::Trim => JobKind::TrimVideo,
            Action::GenerateSubtitles => JobKind::GenerateSubtitles,
            Action::AddSubtitles => JobKind::AddSubtitles,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Compress => "compress",
            Action::Merge => "merge",
            Action::Trim => "trim",
            Action::GenerateSubtitles => "generateSubtitles",
            Action::AddSubtitles => "addSubtitles",
        }
    }

    /// Media kinds whose latest file this action needs, in job argument order
    pub fn required_inputs(&self, subtitle_source: SubtitleSource) -> &'static [MediaKind] {
        match self {
            Action::Compress | Action::Trim | Action::AddSubtitles => &[MediaKind::Video],
            Action::Merge => &[MediaKind::Audio, MediaKind::Video],
            Action::GenerateSubtitles => match subtitle_source {
                SubtitleSource::Audio => &[MediaKind::Audio],
                SubtitleSource::Video => &[MediaKind::Video],
            },
        }
    }

    /// Resolve the file ids to send with this action's job
    ///
    /// Fails on the first required kind with no file, before anything is
    /// dispatched.
    pub fn resolve_inputs(
        &self,
        latest: &LatestFiles,
        subtitle_source: SubtitleSource,
    ) -> std::result::Result<Vec<FileId>, PipelineError> {
        self.required_inputs(subtitle_source)
            .iter()
            .map(|&kind| {
                latest
                    .get(kind)
                    .map(|f| f.id)
                    .ok_or(PipelineError::MissingInput { action: *self, kind })
            })
            .collect()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "compress" => Ok(Action::Compress),
            "merge" => Ok(Action::Merge),
            "trim" => Ok(Action::Trim),
            "generatesubtitles" => Ok(Action::GenerateSubtitles),
            "addsubtitles" => Ok(Action::AddSubtitles),
            _ => Err(anyhow!("Unknown action: {}", s)),
        }
    }
}

/// Which latest file subtitle generation reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleSource {
    #[default]
    Audio,
    Video,
}

/// Whether the UI may trigger `action` on a project at `stage`
///
/// The next unperformed action and every action already performed are
/// enabled; anything further ahead is not.
pub fn is_action_enabled(stage: Stage, action: Action) -> bool {
    action.ordinal() <= stage.ordinal() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaFile;
    use proptest::prelude::*;

    fn stage() -> impl Strategy<Value = Stage> {
        prop::sample::select(Stage::ORDER.to_vec())
    }

    fn action() -> impl Strategy<Value = Action> {
        prop::sample::select(Action::ALL.to_vec())
    }

    #[test]
    fn test_order_table_matches_ord() {
        for (i, stage) in Stage::ORDER.iter().enumerate() {
            assert_eq!(stage.ordinal(), i);
        }
        assert!(Stage::Initial < Stage::Compressed);
        assert!(Stage::SubtitlesGenerated < Stage::Completed);
        assert!(Stage::Completed.is_terminal());
        assert!(Stage::ORDER[..5].iter().all(|s| !s.is_terminal()));
    }

    #[test]
    fn test_each_action_advances_from_previous_stage_only() {
        assert_eq!(Stage::Initial.after(Action::Compress), Stage::Compressed);
        assert_eq!(Stage::Compressed.after(Action::Merge), Stage::Merged);
        assert_eq!(Stage::Merged.after(Action::Trim), Stage::Trimmed);
        assert_eq!(Stage::Trimmed.after(Action::GenerateSubtitles), Stage::SubtitlesGenerated);
        assert_eq!(Stage::SubtitlesGenerated.after(Action::AddSubtitles), Stage::Completed);

        // re-running an earlier action is a no-op on the stage
        assert_eq!(Stage::Trimmed.after(Action::Compress), Stage::Trimmed);
        assert_eq!(Stage::Completed.after(Action::AddSubtitles), Stage::Completed);
    }

    #[test]
    fn test_enabled_gate_at_initial() {
        assert!(is_action_enabled(Stage::Initial, Action::Compress));
        assert!(!is_action_enabled(Stage::Initial, Action::Merge));
        assert!(!is_action_enabled(Stage::Initial, Action::AddSubtitles));
        for action in Action::ALL {
            assert!(is_action_enabled(Stage::Completed, action));
        }
    }

    #[test]
    fn test_parsing() {
        assert_eq!("subtitlesGenerated".parse::<Stage>().unwrap(), Stage::SubtitlesGenerated);
        assert_eq!("generate-subtitles".parse::<Action>().unwrap(), Action::GenerateSubtitles);
        assert_eq!("addSubtitles".parse::<Action>().unwrap(), Action::AddSubtitles);
        assert!("publish".parse::<Action>().is_err());
        assert!("archived".parse::<Stage>().is_err());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Stage::SubtitlesGenerated).unwrap(), "\"subtitlesGenerated\"");
        assert_eq!(serde_json::to_string(&Action::GenerateSubtitles).unwrap(), "\"generateSubtitles\"");
    }

    #[test]
    fn test_subtitle_source_selects_input_kind() {
        assert_eq!(
            Action::GenerateSubtitles.required_inputs(SubtitleSource::Audio),
            &[MediaKind::Audio]
        );
        assert_eq!(
            Action::GenerateSubtitles.required_inputs(SubtitleSource::Video),
            &[MediaKind::Video]
        );
    }

    #[test]
    fn test_resolve_inputs_reports_missing_kind() {
        let video = MediaFile::new(FileId(1), "v.mp4", "/v.mp4", MediaKind::Video);
        let latest = LatestFiles { video: Some(video), ..Default::default() };

        assert_eq!(
            Action::Compress.resolve_inputs(&latest, SubtitleSource::Audio).unwrap(),
            vec![FileId(1)]
        );
        match Action::Merge.resolve_inputs(&latest, SubtitleSource::Audio) {
            Err(PipelineError::MissingInput { action, kind }) => {
                assert_eq!(action, Action::Merge);
                assert_eq!(kind, MediaKind::Audio);
            }
            other => panic!("expected missing audio, got {:?}", other),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Enabling is monotonic: whatever is enabled stays enabled for all
        /// earlier actions and all later stages
        #[test]
        fn test_enabled_is_monotonic(s in stage(), a in action(), other_stage in stage(), other_action in action()) {
            prop_assume!(is_action_enabled(s, a));
            let later = s.max(other_stage);
            let earlier = if other_action.ordinal() <= a.ordinal() { other_action } else { a };
            prop_assert!(is_action_enabled(later, earlier));
        }

        /// Applying actions never moves a stage backwards and moves it at most one step
        #[test]
        fn test_stage_never_regresses(start in stage(), actions in prop::collection::vec(action(), 0..30)) {
            let mut current = start;
            for a in actions {
                let next = current.after(a);
                prop_assert!(next >= current);
                prop_assert!(next.ordinal() <= current.ordinal() + 1);
                current = next;
            }
        }
    }
}
