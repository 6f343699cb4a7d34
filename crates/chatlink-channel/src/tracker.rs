//! Per-session output buffering and main/sub-session bookkeeping.
//!
//! [`ActivityTracker`] is a pure state machine: it consumes runtime events
//! and returns the [`TrackerEffect`]s the bridge should apply.

use std::collections::{HashMap, HashSet};

use chatlink_agent::AgentEvent;
use tracing::debug;

use crate::format;
use crate::interaction::{PendingInteraction, PendingPermission, PendingQuestion};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEffect {
    /// Post this text to chat.
    Send(String),
    /// Make this the pending interaction. Always precedes its prompt.
    Install(PendingInteraction),
    /// The main session went idle.
    MainIdle,
}

pub struct ActivityTracker {
    instance_id: u16,
    buffers: HashMap<String, String>,
    sub_sessions: HashSet<String>,
    main_session: Option<String>,
}

impl ActivityTracker {
    pub fn new(instance_id: u16) -> Self {
        Self {
            instance_id,
            buffers: HashMap::new(),
            sub_sessions: HashSet::new(),
            main_session: None,
        }
    }

    pub fn main_session(&self) -> Option<&str> {
        self.main_session.as_deref()
    }

    pub fn is_sub_session(&self, session_id: &str) -> bool {
        self.sub_sessions.contains(session_id)
    }

    pub fn buffered(&self, session_id: &str) -> Option<&str> {
        self.buffers.get(session_id).map(String::as_str)
    }

    pub fn handle(&mut self, event: AgentEvent) -> Vec<TrackerEffect> {
        match event {
            AgentEvent::PartUpdated {
                session_id,
                text,
                delta,
            } => {
                if self.main_session.is_none() && !self.sub_sessions.contains(&session_id) {
                    debug!(session = %session_id, "main session established");
                    self.main_session = Some(session_id.clone());
                }
                let buffer = self.buffers.entry(session_id).or_default();
                match delta {
                    Some(delta) => buffer.push_str(&delta),
                    None => *buffer = text,
                }
                Vec::new()
            }
            AgentEvent::SessionCreated {
                session_id,
                parent_id: Some(parent),
            } => {
                debug!(session = %session_id, parent = %parent, "sub-session created");
                self.sub_sessions.insert(session_id.clone());
                self.buffers.remove(&session_id);
                if self.main_session.as_deref() == Some(parent.as_str()) {
                    self.buffers.remove(&parent);
                }
                Vec::new()
            }
            AgentEvent::SessionCreated { .. } => Vec::new(),
            AgentEvent::SessionIdle { session_id } => self.on_idle(&session_id),
            AgentEvent::QuestionAsked(request) => {
                let question = PendingQuestion::from(request);
                let prompt = format::question_prompt(&question);
                vec![
                    TrackerEffect::Install(PendingInteraction::Question(question)),
                    TrackerEffect::Send(prompt),
                ]
            }
            AgentEvent::PermissionAsked(request) => {
                let permission = PendingPermission::from(request);
                let prompt = format::permission_prompt(&permission);
                vec![
                    TrackerEffect::Install(PendingInteraction::Permission(permission)),
                    TrackerEffect::Send(prompt),
                ]
            }
            AgentEvent::Other(_) => Vec::new(),
        }
    }

    fn on_idle(&mut self, session_id: &str) -> Vec<TrackerEffect> {
        let buffer = self.buffers.remove(session_id);
        if self.sub_sessions.contains(session_id) {
            debug!(session = session_id, "discarding sub-session output");
            return Vec::new();
        }

        let mut effects = Vec::new();
        if let Some(text) = buffer.filter(|t| !t.trim().is_empty()) {
            effects.push(TrackerEffect::Send(format::transcript(self.instance_id, &text)));
        }
        if self.main_session.as_deref() == Some(session_id) {
            self.main_session = None;
            effects.push(TrackerEffect::MainIdle);
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatlink_agent::{PermissionRequest, QuestionRequest};

    fn part(session: &str, text: &str, delta: Option<&str>) -> AgentEvent {
        AgentEvent::PartUpdated {
            session_id: session.into(),
            text: text.into(),
            delta: delta.map(str::to_string),
        }
    }

    fn idle(session: &str) -> AgentEvent {
        AgentEvent::SessionIdle {
            session_id: session.into(),
        }
    }

    #[test]
    fn main_session_flushes_once_per_idle() {
        let mut tracker = ActivityTracker::new(4242);
        assert!(tracker.handle(part("ses_1", "Hel", None)).is_empty());
        tracker.handle(part("ses_1", "Hello", Some("lo")));
        assert_eq!(tracker.main_session(), Some("ses_1"));
        assert_eq!(tracker.buffered("ses_1"), Some("Hello"));

        assert_eq!(
            tracker.handle(idle("ses_1")),
            vec![
                TrackerEffect::Send("_opencode session [4242]_\nHello".into()),
                TrackerEffect::MainIdle,
            ]
        );
        assert_eq!(tracker.main_session(), None);
        assert!(tracker.handle(idle("ses_1")).is_empty());
    }

    #[test]
    fn replace_without_delta() {
        let mut tracker = ActivityTracker::new(1000);
        tracker.handle(part("ses_1", "draft", None));
        tracker.handle(part("ses_1", "final answer", None));
        assert_eq!(tracker.buffered("ses_1"), Some("final answer"));
    }

    #[test]
    fn sub_session_output_never_flushed() {
        let mut tracker = ActivityTracker::new(1000);
        tracker.handle(part("ses_main", "thinking", None));
        tracker.handle(AgentEvent::SessionCreated {
            session_id: "ses_sub".into(),
            parent_id: Some("ses_main".into()),
        });
        // Parent's partial output is superseded by the sub-session.
        assert_eq!(tracker.buffered("ses_main"), None);

        tracker.handle(part("ses_sub", "sub chatter", None));
        assert!(tracker.is_sub_session("ses_sub"));
        assert!(tracker.handle(idle("ses_sub")).is_empty());
        assert_eq!(tracker.buffered("ses_sub"), None);

        tracker.handle(part("ses_main", "result", None));
        assert_eq!(
            tracker.handle(idle("ses_main")),
            vec![
                TrackerEffect::Send("_opencode session [1000]_\nresult".into()),
                TrackerEffect::MainIdle,
            ]
        );
    }

    #[test]
    fn sub_session_never_becomes_main() {
        let mut tracker = ActivityTracker::new(1000);
        tracker.handle(AgentEvent::SessionCreated {
            session_id: "ses_sub".into(),
            parent_id: Some("ses_main".into()),
        });
        tracker.handle(part("ses_sub", "x", None));
        assert_eq!(tracker.main_session(), None);
    }

    #[test]
    fn non_main_idle_flushes_without_main_idle() {
        let mut tracker = ActivityTracker::new(1000);
        tracker.handle(part("ses_1", "first", None));
        tracker.handle(part("ses_2", "other", None));
        assert_eq!(
            tracker.handle(idle("ses_2")),
            vec![TrackerEffect::Send("_opencode session [1000]_\nother".into())]
        );
        assert_eq!(tracker.main_session(), Some("ses_1"));
    }

    #[test]
    fn idle_without_output_still_reports_main_idle() {
        let mut tracker = ActivityTracker::new(1000);
        tracker.handle(part("ses_1", "", None));
        assert_eq!(tracker.handle(idle("ses_1")), vec![TrackerEffect::MainIdle]);
    }

    #[test]
    fn long_output_is_truncated() {
        let mut tracker = ActivityTracker::new(1000);
        tracker.handle(part("ses_1", &"y".repeat(format::MAX_MESSAGE_CHARS * 2), None));
        let effects = tracker.handle(idle("ses_1"));
        let TrackerEffect::Send(text) = &effects[0] else {
            panic!("expected send");
        };
        assert!(text.ends_with(format::TRUNCATION_MARKER));
    }

    #[test]
    fn interactions_install_before_prompt() {
        let mut tracker = ActivityTracker::new(1000);
        let effects = tracker.handle(AgentEvent::PermissionAsked(PermissionRequest {
            id: "per_1".into(),
            session_id: "ses_1".into(),
            title: "Edit file".into(),
        }));
        assert!(matches!(effects[0], TrackerEffect::Install(PendingInteraction::Permission(_))));
        assert!(matches!(&effects[1], TrackerEffect::Send(t) if t.contains("Edit file")));

        let effects = tracker.handle(AgentEvent::QuestionAsked(QuestionRequest {
            id: "que_1".into(),
            session_id: "ses_1".into(),
            header: None,
            question: "Proceed?".into(),
            options: vec![],
            custom: true,
        }));
        assert!(matches!(effects[0], TrackerEffect::Install(PendingInteraction::Question(_))));
    }
}
