//! Author filtering shared by the poller and the realtime listener.

use crate::channel::HistoryEntry;

/// Decides which inbound entries reach the router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorFilter {
    /// The bridge's own user id, when known.
    pub bot_user_id: Option<String>,
    /// When set, only this author is accepted.
    pub source: SourceRestriction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SourceRestriction {
    /// Any human author is accepted.
    #[default]
    Anyone,
    /// Only the given user id is accepted.
    Only(String),
    /// A source identity was configured but could not be resolved; nothing
    /// is accepted.
    Unresolved,
}

impl AuthorFilter {
    pub fn accepts(&self, entry: &HistoryEntry) -> bool {
        if entry.subtype.is_some() || entry.bot_id.is_some() {
            return false;
        }
        if let (Some(bot), Some(user)) = (&self.bot_user_id, &entry.user) {
            if bot == user {
                return false;
            }
        }
        match &self.source {
            SourceRestriction::Anyone => true,
            SourceRestriction::Only(id) => entry.user.as_deref() == Some(id.as_str()),
            SourceRestriction::Unresolved => false,
        }
    }
}
