//! Locally editable self text.
//!
//! The draft hydrates from the model only when the model's `text_version`
//! moves, which happens on HTTP snapshots. Push snapshots leave the version
//! alone, so whatever the user is typing survives them.

use corridor_types::PresenceState;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextDraft {
    draft: String,
    last_sent: String,
    version: u64,
    hydrated: bool,
}

impl TextDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.draft
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Pull the model's self text if it is newer than what we hydrated from.
    /// Returns whether the draft was overwritten.
    pub fn sync(&mut self, state: &PresenceState) -> bool {
        if self.hydrated && state.text_version <= self.version {
            return false;
        }
        if !self.hydrated && state.text_version == 0 {
            return false;
        }
        self.draft = state.me.text.clone();
        self.last_sent = state.me.text.clone();
        self.version = state.text_version;
        self.hydrated = true;
        true
    }

    /// Record a local edit. Returns the text to transmit, if any: nothing
    /// before the first hydration, nothing when unchanged since last sent.
    pub fn edit(&mut self, text: impl Into<String>) -> Option<&str> {
        self.draft = text.into();
        if !self.hydrated || self.draft == self.last_sent {
            return None;
        }
        self.last_sent = self.draft.clone();
        Some(&self.last_sent)
    }
}
