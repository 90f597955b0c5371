use crate::media::{MediaFile, MediaKind};

/// Pick the most recent file of `kind`
///
/// Files sharing the newest timestamp are ordered by id and the highest id
/// wins, so the answer never depends on the order of `files`.
pub fn latest_file<'a, I>(files: I, kind: MediaKind) -> Option<&'a MediaFile>
where
    I: IntoIterator<Item = &'a MediaFile>,
{
    files
        .into_iter()
        .filter(|f| f.kind == kind)
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
}

/// Current representative file per media kind for one project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatestFiles {
    pub video: Option<MediaFile>,
    pub audio: Option<MediaFile>,
    pub transcript: Option<MediaFile>,
    pub text: Option<MediaFile>,
}

impl LatestFiles {
    pub fn from_files(files: &[MediaFile]) -> Self {
        let pick = |kind| latest_file(files, kind).cloned();
        LatestFiles {
            video: pick(MediaKind::Video),
            audio: pick(MediaKind::Audio),
            transcript: pick(MediaKind::Transcript),
            text: pick(MediaKind::Text),
        }
    }

    pub fn get(&self, kind: MediaKind) -> Option<&MediaFile> {
        match kind {
            MediaKind::Video => self.video.as_ref(),
            MediaKind::Audio => self.audio.as_ref(),
            MediaKind::Transcript => self.transcript.as_ref(),
            MediaKind::Text => self.text.as_ref(),
        }
    }
}
