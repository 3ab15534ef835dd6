//! Transcript accumulation and persistence.
//!
//! [`TranscriptSink`] keeps an append-only record of a session's segments.
//! Once the session completes it is turned into a [`Transcript`] and handed
//! to a [`TranscriptStore`].

use crate::demux::StreamEvent;
use crate::error::{ColloquyError, Result};
use crate::request::{DebateRequest, Panelist};
use crate::sink::EventSink;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const PLACEHOLDER_AVATAR: &str = "/avatars/placeholder-avatar.png";

/// One recorded segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub speaker_id: String,
    pub text: String,
    pub sequence_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptStatus {
    #[default]
    InProgress,
    Complete,
    Failed,
}

/// Sink that records segments and the session's terminal status.
#[derive(Debug, Default)]
pub struct TranscriptSink {
    entries: Vec<TranscriptEntry>,
    status: TranscriptStatus,
}

impl TranscriptSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn status(&self) -> TranscriptStatus {
        self.status
    }

    /// Entries with consecutive same-speaker runs coalesced.
    ///
    /// A merged entry keeps the sequence number of the first entry in its run;
    /// texts are joined with a newline.
    pub fn merged(&self) -> Vec<TranscriptEntry> {
        let mut merged: Vec<TranscriptEntry> = Vec::new();
        for entry in &self.entries {
            if let Some(last) = merged.last_mut()
                && last.speaker_id == entry.speaker_id
            {
                last.text.push('\n');
                last.text.push_str(&entry.text);
                continue;
            }
            merged.push(entry.clone());
        }
        merged
    }

    /// Each speaker's text concatenated in order, speakers in order of first
    /// appearance.
    pub fn by_speaker(&self) -> Vec<(String, String)> {
        let mut speakers: Vec<(String, String)> = Vec::new();
        for entry in &self.entries {
            match speakers.iter_mut().find(|(id, _)| *id == entry.speaker_id) {
                Some((_, text)) => {
                    text.push('\n');
                    text.push_str(&entry.text);
                }
                None => speakers.push((entry.speaker_id.clone(), entry.text.clone())),
            }
        }
        speakers
    }

    /// Builds the persisted document for a session.
    ///
    /// Speaker names come from the request's panelists plus the moderator;
    /// ids the request does not know fall back to the id itself.
    pub fn to_transcript(
        &self,
        id: &str,
        request: &DebateRequest,
        started_at: DateTime<Utc>,
    ) -> Transcript {
        let messages = self
            .merged()
            .into_iter()
            .enumerate()
            .map(|(sequence, entry)| {
                let speaker = request.speaker(&entry.speaker_id).unwrap_or_else(|| {
                    tracing::warn!(speaker = %entry.speaker_id, "Unknown speaker id in transcript");
                    Panelist {
                        avatar_url: PLACEHOLDER_AVATAR.to_string(),
                        ..Panelist::new(&entry.speaker_id, &entry.speaker_id)
                    }
                });
                TranscriptMessage {
                    id: format!("{}-{}", entry.speaker_id, sequence),
                    speaker_id: entry.speaker_id,
                    speaker_name: speaker.name,
                    avatar_url: speaker.avatar_url,
                    text: entry.text,
                    sequence: sequence as u64,
                }
            })
            .collect();

        let completed_at = match self.status {
            TranscriptStatus::InProgress => None,
            TranscriptStatus::Complete | TranscriptStatus::Failed => Some(Utc::now()),
        };

        Transcript {
            id: id.to_string(),
            topic: request.topic.trim().to_string(),
            panelists: request.selected_panelists.clone(),
            messages,
            status: self.status,
            started_at,
            completed_at,
        }
    }
}

#[async_trait]
impl EventSink for TranscriptSink {
    async fn accept(&mut self, event: &StreamEvent) -> Result<()> {
        match event {
            StreamEvent::Segment(segment) => self.entries.push(TranscriptEntry {
                speaker_id: segment.speaker_id.clone(),
                text: segment.text.clone(),
                sequence_number: segment.sequence,
            }),
            StreamEvent::Done => self.status = TranscriptStatus::Complete,
            StreamEvent::Error { .. } => self.status = TranscriptStatus::Failed,
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "transcript"
    }
}

/// A finished debate, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub id: String,
    pub topic: String,
    pub panelists: Vec<Panelist>,
    pub messages: Vec<TranscriptMessage>,
    pub status: TranscriptStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMessage {
    pub id: String,
    pub speaker_id: String,
    pub speaker_name: String,
    pub avatar_url: String,
    pub text: String,
    pub sequence: u64,
}

/// Listing entry for a stored transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSummary {
    pub id: String,
    pub topic: String,
    pub panelist_names: Vec<String>,
    pub message_count: usize,
    pub status: TranscriptStatus,
    pub started_at: DateTime<Utc>,
}

impl From<&Transcript> for TranscriptSummary {
    fn from(transcript: &Transcript) -> Self {
        Self {
            id: transcript.id.clone(),
            topic: transcript.topic.clone(),
            panelist_names: transcript.panelists.iter().map(|p| p.name.clone()).collect(),
            message_count: transcript.messages.len(),
            status: transcript.status,
            started_at: transcript.started_at,
        }
    }
}

/// Persistence seam for finished transcripts.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn save(&self, transcript: &Transcript) -> Result<()>;

    async fn load(&self, id: &str) -> Result<Transcript>;

    /// Every stored transcript, newest first.
    async fn list(&self) -> Result<Vec<TranscriptSummary>>;

    fn name(&self) -> &'static str {
        "store"
    }
}

/// Stores each transcript as `<id>.json` in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(ColloquyError::Other(format!("invalid transcript id '{id}'")));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl TranscriptStore for DirectoryStore {
    async fn save(&self, transcript: &Transcript) -> Result<()> {
        let path = self.path_for(&transcript.id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write then rename so readers never see a half-written file.
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(transcript)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::info!(id = %transcript.id, path = %path.display(), "Transcript saved");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Transcript> {
        let content = tokio::fs::read_to_string(self.path_for(id)?).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn list(&self) -> Result<Vec<TranscriptSummary>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = tokio::fs::read_to_string(&path)
                .await
                .map_err(ColloquyError::from)
                .and_then(|content| Ok(serde_json::from_str::<Transcript>(&content)?));
            match parsed {
                Ok(transcript) => summaries.push(TranscriptSummary::from(&transcript)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable transcript");
                }
            }
        }

        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }

    fn name(&self) -> &'static str {
        "directory"
    }
}
