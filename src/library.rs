#![forbid(unsafe_code)]

//! On-disk layout of a transcript library and removal of a single video.
//!
//! Every artifact produced for a video is named `<date>-<video id>.<ext>` and
//! lives in one of a handful of sibling directories under the root.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use walkdir::WalkDir;

use crate::{
    state::StateStore,
    viewer::{ViewerPaths, build_viewer},
};

pub const VIDEO_ID_LEN: usize = 11;

pub const SUMMARIES_SUBDIR: &str = "summaries";
pub const METADATA_SUBDIR: &str = "metadata";
pub const TRANSCRIPTS_SUBDIR: &str = "transcripts";
pub const AUDIO_SUBDIR: &str = "audio";

const STATE_FILE: &str = "state.json";
const VIEWER_SUBDIR: &str = "viewer";
const TEMPLATE_FILE: &str = "template.html";
const OUTPUT_FILE: &str = "index.html";

/// (directory, extension) pairs holding per-video artifacts, in deletion
/// order.
const CONTENT_PATTERNS: [(&str, &str); 5] = [
    (SUMMARIES_SUBDIR, "md"),
    (METADATA_SUBDIR, "json"),
    (TRANSCRIPTS_SUBDIR, "txt"),
    (TRANSCRIPTS_SUBDIR, "srt"),
    (AUDIO_SUBDIR, "mp3"),
];

/// Ids are only checked for length; the character set is left to the
/// producer of the files.
pub fn is_valid_video_id(video_id: &str) -> bool {
    video_id.chars().count() == VIDEO_ID_LEN
}

#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("No files found for video ID: {0}")]
    NotFound(String),
    #[error("Failed to delete {name}: {source}")]
    Remove {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to update state: {0}")]
    State(String),
}

#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    pub fn viewer_paths(&self) -> ViewerPaths {
        ViewerPaths {
            summaries: self.root.join(SUMMARIES_SUBDIR),
            template: self.root.join(VIEWER_SUBDIR).join(TEMPLATE_FILE),
            output: self.root.join(OUTPUT_FILE),
        }
    }

    /// Every regular file belonging to `video_id`, in deletion order.
    pub fn video_files(&self, video_id: &str) -> Vec<PathBuf> {
        CONTENT_PATTERNS
            .iter()
            .flat_map(|(subdir, ext)| {
                let suffix = format!("-{video_id}.{ext}");
                WalkDir::new(self.root.join(subdir))
                    .min_depth(1)
                    .max_depth(1)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .filter(move |entry| entry.file_name().to_string_lossy().ends_with(&suffix))
                    .map(|entry| entry.into_path())
            })
            .collect()
    }

    /// Removes every file for `video_id`, forgets its state and rebuilds the
    /// viewer. Removal stops at the first failure; files already removed stay
    /// removed. Returns the removed paths relative to the root.
    pub fn delete_video(
        &self,
        store: &StateStore,
        video_id: &str,
    ) -> Result<Vec<PathBuf>, DeleteError> {
        self.delete_with(store, video_id, |path| fs::remove_file(path))
    }

    fn delete_with(
        &self,
        store: &StateStore,
        video_id: &str,
        mut remove: impl FnMut(&Path) -> io::Result<()>,
    ) -> Result<Vec<PathBuf>, DeleteError> {
        let mut removed = Vec::new();
        for path in self.video_files(video_id) {
            if let Err(source) = remove(&path) {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                return Err(DeleteError::Remove { name, source });
            }
            let relative = path.strip_prefix(&self.root).unwrap_or(&path);
            removed.push(relative.to_path_buf());
        }

        if removed.is_empty() {
            return Err(DeleteError::NotFound(video_id.to_string()));
        }

        store
            .remove(video_id)
            .map_err(|err| DeleteError::State(format!("{err:#}")))?;

        self.rebuild_viewer();
        Ok(removed)
    }

    /// Best effort: a failed rebuild is logged and otherwise ignored.
    pub fn rebuild_viewer(&self) {
        match build_viewer(&self.viewer_paths()) {
            Ok(report) => log::info!("rebuilt viewer with {} summaries", report.embedded),
            Err(err) => log::warn!("viewer rebuild skipped: {err:#}"),
        }
    }
}
