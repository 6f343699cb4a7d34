//! The single outstanding question or permission request.
//!
//! At most one interaction is pending. Installing a new one replaces the
//! previous one; a chat reply is always read against the latest.

use chatlink_agent::{PermissionRequest, QuestionOption, QuestionRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuestion {
    pub request_id: String,
    pub session_id: String,
    pub header: Option<String>,
    pub question: String,
    pub options: Vec<QuestionOption>,
    pub allow_custom: bool,
    /// Set once the user picked the "type your own answer" entry.
    pub awaiting_custom: bool,
}

impl PendingQuestion {
    /// Number the custom-answer entry is listed under, if offered.
    pub fn custom_choice(&self) -> Option<usize> {
        self.allow_custom.then_some(self.options.len() + 1)
    }
}

impl From<QuestionRequest> for PendingQuestion {
    fn from(q: QuestionRequest) -> Self {
        Self {
            request_id: q.id,
            session_id: q.session_id,
            header: q.header,
            question: q.question,
            options: q.options,
            allow_custom: q.custom,
            awaiting_custom: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPermission {
    pub request_id: String,
    pub session_id: String,
    pub title: String,
}

impl From<PermissionRequest> for PendingPermission {
    fn from(p: PermissionRequest) -> Self {
        Self {
            request_id: p.id,
            session_id: p.session_id,
            title: p.title,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingInteraction {
    Question(PendingQuestion),
    Permission(PendingPermission),
}

impl PendingInteraction {
    pub fn request_id(&self) -> &str {
        match self {
            PendingInteraction::Question(q) => &q.request_id,
            PendingInteraction::Permission(p) => &p.request_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_choice_follows_options() {
        let mut q = PendingQuestion::from(QuestionRequest {
            id: "que_1".into(),
            session_id: "ses_1".into(),
            header: None,
            question: "Pick".into(),
            options: vec![
                QuestionOption {
                    label: "a".into(),
                    description: String::new(),
                },
                QuestionOption {
                    label: "b".into(),
                    description: String::new(),
                },
            ],
            custom: true,
        });
        assert_eq!(q.custom_choice(), Some(3));
        assert!(!q.awaiting_custom);

        q.allow_custom = false;
        assert_eq!(q.custom_choice(), None);
    }
}
