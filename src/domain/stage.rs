//! The fixed processing stage order for a meeting artifact.

use serde::{Deserialize, Serialize};

/// One discrete processing stage in the pipeline.
///
/// Stages execute strictly in declaration order. `Discovered` is recorded by
/// the fast cycle when a folder's source files are first fingerprinted; the
/// remaining five stages are the heavy work driven by the slow cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Folder seen and source files fingerprinted
    Discovered,

    /// Source video recompressed to the configured quality profile
    VideoCompressed,

    /// Audio track extracted from the compressed video
    AudioExtracted,

    /// Audio transcribed to text
    Transcribed,

    /// Transcript summarized
    Summarized,

    /// Summary upserted into the notes store
    Synced,
}

impl Stage {
    /// All stages, in pipeline order
    pub const ALL: [Stage; 6] = [
        Stage::Discovered,
        Stage::VideoCompressed,
        Stage::AudioExtracted,
        Stage::Transcribed,
        Stage::Summarized,
        Stage::Synced,
    ];

    /// The five action stages the slow cycle drives (everything after discovery)
    pub const ACTIONS: [Stage; 5] = [
        Stage::VideoCompressed,
        Stage::AudioExtracted,
        Stage::Transcribed,
        Stage::Summarized,
        Stage::Synced,
    ];

    /// Stable identifier used in persisted records and error signatures
    pub fn id(&self) -> &'static str {
        match self {
            Stage::Discovered => "discovered",
            Stage::VideoCompressed => "video_compressed",
            Stage::AudioExtracted => "audio_extracted",
            Stage::Transcribed => "transcribed",
            Stage::Summarized => "summarized",
            Stage::Synced => "synced",
        }
    }

    /// The stage that follows this one, if any
    pub fn next(&self) -> Option<Stage> {
        let idx = Stage::ALL.iter().position(|s| s == self)?;
        Stage::ALL.get(idx + 1).copied()
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
