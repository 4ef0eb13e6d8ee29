//! Viewer state machine
//!
//! The view is one tagged `Stage` rather than a handful of independent flags,
//! so analysis text and audio can only exist alongside the photo they describe.
//!
//! ```text
//! Idle → UsersLoaded → UserSelected → Analyzing → AnalysisShown
//!                          ↑                          ↓
//!                          └── select / next / prev ← SpeechRequested → SpeechReady
//! ```
//!
//! Every action that issues a request hands out a `Ticket`. Only the response
//! carrying the most recent ticket is applied; anything older is dropped.

use std::path::Path;

use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Synthesized speech held in memory until the view moves on.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    bytes: Bytes,
}

impl AudioClip {
    pub const CONTENT_TYPE: &'static str = "audio/mpeg";

    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.as_bytes())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub user: String,
    pub photos: Vec<String>,
    pub index: usize,
}

impl Selection {
    fn new(user: String, photos: Vec<String>) -> Self {
        Self {
            user,
            photos,
            index: 0,
        }
    }

    pub fn current_photo(&self) -> Option<&str> {
        self.photos.get(self.index).map(String::as_str)
    }

    pub fn has_photos(&self) -> bool {
        !self.photos.is_empty()
    }

    pub fn can_previous(&self) -> bool {
        self.index > 0
    }

    pub fn can_next(&self) -> bool {
        self.has_photos() && self.index < self.photos.len() - 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Idle,
    UsersLoaded,
    UserSelected(Selection),
    Analyzing {
        selection: Selection,
        ticket: Ticket,
    },
    AnalysisShown {
        selection: Selection,
        text: String,
    },
    SpeechRequested {
        selection: Selection,
        text: String,
        ticket: Ticket,
    },
    SpeechReady {
        selection: Selection,
        text: String,
        audio: AudioClip,
    },
}

impl Stage {
    pub fn selection(&self) -> Option<&Selection> {
        match self {
            Stage::Idle | Stage::UsersLoaded => None,
            Stage::UserSelected(selection)
            | Stage::Analyzing { selection, .. }
            | Stage::AnalysisShown { selection, .. }
            | Stage::SpeechRequested { selection, .. }
            | Stage::SpeechReady { selection, .. } => Some(selection),
        }
    }

    pub fn analysis_text(&self) -> Option<&str> {
        match self {
            Stage::AnalysisShown { text, .. }
            | Stage::SpeechRequested { text, .. }
            | Stage::SpeechReady { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn audio(&self) -> Option<&AudioClip> {
        match self {
            Stage::SpeechReady { audio, .. } => Some(audio),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewerError {
    #[error("no user selected")]
    NoUserSelected,

    #[error("no photos loaded for this user")]
    NoPhotos,

    #[error("already at the first photo")]
    AtFirstPhoto,

    #[error("already at the last photo")]
    AtLastPhoto,

    #[error("no analysis to speak")]
    NoAnalysis,

    #[error("unknown user: {0}")]
    UnknownUser(String),
}

#[derive(Debug)]
pub struct Viewer {
    users: Vec<String>,
    stage: Stage,
    latest: u64,
    pending_user: Option<(Ticket, String)>,
}

impl Default for Viewer {
    fn default() -> Self {
        Self::new()
    }
}

impl Viewer {
    pub fn new() -> Self {
        Self {
            users: Vec::new(),
            stage: Stage::Idle,
            latest: 0,
            pending_user: None,
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.stage.selection()
    }

    pub fn can_previous(&self) -> bool {
        self.selection().is_some_and(Selection::can_previous)
    }

    pub fn can_next(&self) -> bool {
        self.selection().is_some_and(Selection::can_next)
    }

    pub fn can_analyze(&self) -> bool {
        self.selection().is_some_and(Selection::has_photos)
    }

    fn issue(&mut self) -> Ticket {
        self.latest += 1;
        Ticket(self.latest)
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.latest
    }

    fn take_stage(&mut self) -> Stage {
        std::mem::replace(&mut self.stage, Stage::Idle)
    }

    pub fn users_loaded(&mut self, users: Vec<String>) {
        self.users = users;
        if self.stage == Stage::Idle {
            self.stage = Stage::UsersLoaded;
        }
    }

    /// Resolve an exact name, or failing that a 1-based position in the user list.
    pub fn resolve_user(&self, key: &str) -> Result<String, ViewerError> {
        if let Some(name) = self.users.iter().find(|u| u.as_str() == key) {
            return Ok(name.clone());
        }
        key.parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.users.get(i))
            .cloned()
            .ok_or_else(|| ViewerError::UnknownUser(key.to_string()))
    }

    /// Start selecting `user`. The view changes once the photo list arrives.
    pub fn select_user(&mut self, user: &str) -> Ticket {
        let ticket = self.issue();
        self.pending_user = Some((ticket, user.to_string()));
        ticket
    }

    /// Apply a photo list. Returns `false` if a newer action superseded it.
    pub fn photos_loaded(&mut self, ticket: Ticket, photos: Vec<String>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        let user = match self.pending_user.take() {
            Some((pending, user)) if pending == ticket => user,
            _ => return false,
        };
        self.stage = Stage::UserSelected(Selection::new(user, photos));
        true
    }

    pub fn next(&mut self) -> Result<(), ViewerError> {
        self.step(|s| {
            if s.can_next() {
                s.index += 1;
                Ok(())
            } else if s.has_photos() {
                Err(ViewerError::AtLastPhoto)
            } else {
                Err(ViewerError::NoPhotos)
            }
        })
    }

    pub fn previous(&mut self) -> Result<(), ViewerError> {
        self.step(|s| {
            if s.can_previous() {
                s.index -= 1;
                Ok(())
            } else {
                Err(ViewerError::AtFirstPhoto)
            }
        })
    }

    /// Move within the selection, discarding analysis and audio.
    fn step(
        &mut self,
        mv: impl FnOnce(&mut Selection) -> Result<(), ViewerError>,
    ) -> Result<(), ViewerError> {
        let mut selection = self
            .selection()
            .cloned()
            .ok_or(ViewerError::NoUserSelected)?;
        mv(&mut selection)?;
        self.issue();
        self.pending_user = None;
        self.stage = Stage::UserSelected(selection);
        Ok(())
    }

    /// Clear any previous result and start analysing the current photo.
    /// Returns the ticket and the photo URL to send.
    pub fn begin_analysis(&mut self) -> Result<(Ticket, String), ViewerError> {
        let selection = self
            .selection()
            .cloned()
            .ok_or(ViewerError::NoUserSelected)?;
        let url = selection
            .current_photo()
            .map(str::to_string)
            .ok_or(ViewerError::NoPhotos)?;

        let ticket = self.issue();
        self.pending_user = None;
        self.stage = Stage::Analyzing { selection, ticket };
        Ok((ticket, url))
    }

    pub fn analysis_received(&mut self, ticket: Ticket, text: String) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        match self.take_stage() {
            Stage::Analyzing {
                selection,
                ticket: expected,
            } if expected == ticket => {
                self.stage = Stage::AnalysisShown { selection, text };
                true
            }
            other => {
                self.stage = other;
                false
            }
        }
    }

    /// Request speech for the analysis currently shown.
    pub fn begin_speech(&mut self) -> Result<(Ticket, String), ViewerError> {
        match self.take_stage() {
            Stage::AnalysisShown { selection, text }
            | Stage::SpeechReady {
                selection, text, ..
            } => {
                let ticket = self.issue();
                let request = text.clone();
                self.stage = Stage::SpeechRequested {
                    selection,
                    text,
                    ticket,
                };
                Ok((ticket, request))
            }
            other => {
                self.stage = other;
                Err(ViewerError::NoAnalysis)
            }
        }
    }

    /// Attach audio. Any previous clip is dropped with the old stage.
    pub fn speech_received(&mut self, ticket: Ticket, audio: Bytes) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        match self.take_stage() {
            Stage::SpeechRequested {
                selection,
                text,
                ticket: expected,
            } if expected == ticket => {
                self.stage = Stage::SpeechReady {
                    selection,
                    text,
                    audio: AudioClip::new(audio),
                };
                true
            }
            other => {
                self.stage = other;
                false
            }
        }
    }

    /// A request failed: fall back to the last settled view.
    pub fn request_failed(&mut self, ticket: Ticket) {
        if !self.is_current(ticket) {
            return;
        }
        if matches!(&self.pending_user, Some((pending, _)) if *pending == ticket) {
            self.pending_user = None;
            return;
        }
        self.stage = match self.take_stage() {
            Stage::Analyzing { selection, .. } => Stage::UserSelected(selection),
            Stage::SpeechRequested {
                selection, text, ..
            } => Stage::AnalysisShown { selection, text },
            other => other,
        };
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let selected = self.selection().map(|s| s.user.as_str());

        out.push_str("Users\n");
        if self.users.is_empty() {
            out.push_str("  (none)\n");
        }
        for (i, user) in self.users.iter().enumerate() {
            let marker = if Some(user.as_str()) == selected { '*' } else { ' ' };
            out.push_str(&format!(" {}[{}] {}\n", marker, i + 1, user));
        }
        out.push('\n');

        let Some(selection) = self.selection() else {
            out.push_str("Select a user to browse photos.\n");
            return out;
        };

        match selection.current_photo() {
            Some(url) => out.push_str(&format!(
                "Photo {}/{} ({}): {}\n",
                selection.index + 1,
                selection.photos.len(),
                selection.user,
                url
            )),
            None => out.push_str(&format!("No photos for {}\n", selection.user)),
        }

        let button = |label: &str, enabled: bool| {
            if enabled {
                format!("[{}]", label)
            } else {
                format!("({} disabled)", label)
            }
        };
        out.push_str(&format!(
            "{} {} {}\n",
            button("Previous", self.can_previous()),
            button("Next", self.can_next()),
            button("Analyze Image", self.can_analyze()),
        ));

        let response = match &self.stage {
            Stage::Analyzing { .. } => "Analyzing...",
            stage => stage.analysis_text().unwrap_or("No response yet"),
        };
        out.push_str(response);
        out.push('\n');

        match &self.stage {
            Stage::SpeechRequested { .. } => out.push_str("Audio: generating...\n"),
            Stage::SpeechReady { audio, .. } => out.push_str(&format!(
                "Audio: ready ({} bytes, {})\n",
                audio.len(),
                AudioClip::CONTENT_TYPE
            )),
            _ => {}
        }

        out
    }
}
