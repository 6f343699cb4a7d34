//! Message formatting and command parsing.
//!
//! Builds the chat text for transcripts, prompts, shell output and model
//! listings, and parses inbound `/` control commands into [`ControlCommand`]s.

use chatlink_agent::{ModelRef, ProviderCatalog};

use crate::interaction::{PendingPermission, PendingQuestion};

/// Longest transcript or shell body posted before truncation.
pub const MAX_MESSAGE_CHARS: usize = 3000;

pub const TRUNCATION_MARKER: &str = "...(truncated)";

pub const COMMAND_MARKER: char = '/';

pub const SHELL_MARKER: char = '!';

/// Escape the three characters Slack mrkdwn treats as control syntax.
pub fn escape_mrkdwn(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Cut `text` to `max` characters, appending the truncation marker if cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}{TRUNCATION_MARKER}", &text[..idx]),
        None => text.to_string(),
    }
}

pub fn startup_banner(instance_id: u16, host: &str, directory: &str) -> String {
    format!(
        "*###opencode instance ({instance_id}) from {}:{} started.###*",
        escape_mrkdwn(host),
        escape_mrkdwn(directory)
    )
}

/// A flushed session transcript.
pub fn transcript(instance_id: u16, text: &str) -> String {
    format!(
        "_opencode session [{instance_id}]_\n{}",
        escape_mrkdwn(&truncate_chars(text, MAX_MESSAGE_CHARS))
    )
}

pub fn question_prompt(q: &PendingQuestion) -> String {
    let mut out = String::from("*Question*");
    if let Some(header) = &q.header {
        out.push_str(": ");
        out.push_str(&escape_mrkdwn(header));
    }
    out.push('\n');
    out.push_str(&escape_mrkdwn(&q.question));
    out.push('\n');
    for (i, option) in q.options.iter().enumerate() {
        out.push_str(&format!("{}. {}", i + 1, escape_mrkdwn(&option.label)));
        if !option.description.is_empty() {
            out.push_str(&format!(" - {}", escape_mrkdwn(&option.description)));
        }
        out.push('\n');
    }
    if let Some(n) = q.custom_choice() {
        out.push_str(&format!("{n}. Other (type your own answer)\n"));
    }
    out.push_str("Reply with a number");
    if q.allow_custom {
        out.push_str(" or type an answer");
    }
    out.push('.');
    out
}

pub fn custom_answer_prompt() -> String {
    "Type your answer:".to_string()
}

pub fn question_range_hint(q: &PendingQuestion) -> String {
    let max = q.custom_choice().unwrap_or(q.options.len());
    if max == 0 {
        return "This question has no numbered options. Type your answer.".to_string();
    }
    format!("Please reply with a number between 1 and {max}.")
}

pub fn question_answered(answer: &str) -> String {
    format!("Answered: {}", escape_mrkdwn(answer))
}

pub fn permission_prompt(p: &PendingPermission) -> String {
    format!(
        "*Permission requested*: {}\n\
         1. Allow once\n\
         2. Always allow\n\
         3. Reject\n\
         Reply with a number or yes/always/no.",
        escape_mrkdwn(&p.title)
    )
}

pub fn permission_hint() -> String {
    "Reply with 1/yes (allow once), 2/always (always allow) or 3/no (reject).".to_string()
}

/// Wrap command output in a code fence.
pub fn fenced(body: &str) -> String {
    format!(
        "```\n{}\n```",
        escape_mrkdwn(&truncate_chars(body, MAX_MESSAGE_CHARS))
    )
}

/// Catalog listing with the current model marked.
pub fn model_list(catalog: &ProviderCatalog, current: Option<&ModelRef>) -> String {
    let mut out = String::from("*Available models*");
    if let Some(current) = current {
        out.push_str(&format!(" (current: `{current}`)"));
    }
    out.push('\n');
    if catalog.providers.is_empty() {
        out.push_str("No providers configured.\n");
    }
    for provider in &catalog.providers {
        out.push_str(&format!("*{}*\n", escape_mrkdwn(&provider.name)));
        for model in &provider.models {
            let id = ModelRef::new(provider.id.clone(), model.id.clone());
            out.push_str(&format!("  • `{id}`"));
            if let Some(name) = model.name.as_deref().filter(|n| *n != model.id) {
                out.push_str(&format!(" - {}", escape_mrkdwn(name)));
            }
            if current == Some(&id) {
                out.push_str(" *");
            }
            out.push('\n');
        }
    }
    out.push_str("Switch with `/model provider/model`.");
    out
}

pub fn help_text() -> String {
    "*Commands*\n\
     `/models` - list available models\n\
     `/model [provider/model]` - show or switch the current model\n\
     `/help` - show this message\n\
     `!<command>` - run a shell command (when enabled)\n\
     Anything else is sent to the agent."
        .to_string()
}

/// An inbound `/` control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Models,
    /// Switch to the given `provider/model`, or show the current model.
    Model(Option<String>),
    Help,
    Unknown(String),
}

/// Parse a control command. Returns `None` if `text` is not one.
pub fn parse_command(text: &str) -> Option<ControlCommand> {
    let body = text.trim().strip_prefix(COMMAND_MARKER)?;
    let mut parts = body.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts
        .next()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string);

    Some(match name.to_ascii_lowercase().as_str() {
        "models" => ControlCommand::Models,
        "model" => ControlCommand::Model(arg),
        "help" => ControlCommand::Help,
        _ => ControlCommand::Unknown(name.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatlink_agent::{ModelInfo, ProviderInfo, QuestionOption};

    fn question(custom: bool) -> PendingQuestion {
        PendingQuestion {
            request_id: "que_1".into(),
            session_id: "ses_1".into(),
            header: Some("DB".into()),
            question: "Which database?".into(),
            options: vec![
                QuestionOption {
                    label: "Postgres".into(),
                    description: "relational".into(),
                },
                QuestionOption {
                    label: "Redis".into(),
                    description: String::new(),
                },
            ],
            allow_custom: custom,
            awaiting_custom: false,
        }
    }

    #[test]
    fn escape_mrkdwn_control_chars() {
        assert_eq!(escape_mrkdwn("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
        assert_eq!(escape_mrkdwn("*bold* _it_"), "*bold* _it_");
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("héllo", 2), "hé...(truncated)");
        assert_eq!(truncate_chars("abc", 3), "abc");
    }

    #[test]
    fn transcript_prefix_and_cap() {
        assert_eq!(transcript(4242, "done"), "_opencode session [4242]_\ndone");

        let long = "x".repeat(MAX_MESSAGE_CHARS + 50);
        let msg = transcript(1000, &long);
        assert!(msg.ends_with(TRUNCATION_MARKER));
        let body = msg.strip_prefix("_opencode session [1000]_\n").unwrap();
        assert_eq!(body.len(), MAX_MESSAGE_CHARS + TRUNCATION_MARKER.len());
    }

    #[test]
    fn startup_banner_shape() {
        assert_eq!(
            startup_banner(1234, "devbox", "/home/me/proj"),
            "*###opencode instance (1234) from devbox:/home/me/proj started.###*"
        );
    }

    #[test]
    fn question_prompt_lists_custom_entry() {
        let text = question_prompt(&question(true));
        assert!(text.starts_with("*Question*: DB\nWhich database?\n"));
        assert!(text.contains("1. Postgres - relational\n"));
        assert!(text.contains("2. Redis\n"));
        assert!(text.contains("3. Other (type your own answer)\n"));

        let closed = question_prompt(&question(false));
        assert!(!closed.contains("3. Other"));
        assert!(closed.ends_with("Reply with a number."));
    }

    #[test]
    fn range_hint_includes_custom_entry() {
        assert_eq!(
            question_range_hint(&question(true)),
            "Please reply with a number between 1 and 3."
        );
        assert_eq!(
            question_range_hint(&question(false)),
            "Please reply with a number between 1 and 2."
        );
    }

    #[test]
    fn fenced_wraps_body() {
        assert_eq!(fenced("ok"), "```\nok\n```");
    }

    #[test]
    fn model_list_marks_current() {
        let catalog = ProviderCatalog {
            providers: vec![ProviderInfo {
                id: "anthropic".into(),
                name: "Anthropic".into(),
                models: vec![
                    ModelInfo {
                        id: "claude-a".into(),
                        name: Some("Claude A".into()),
                    },
                    ModelInfo {
                        id: "claude-b".into(),
                        name: None,
                    },
                ],
            }],
            defaults: Default::default(),
        };
        let current = ModelRef::new("anthropic", "claude-b");
        let text = model_list(&catalog, Some(&current));
        assert!(text.starts_with("*Available models* (current: `anthropic/claude-b`)\n*Anthropic*\n"));
        assert!(text.contains("  • `anthropic/claude-a` - Claude A\n"));
        assert!(text.contains("  • `anthropic/claude-b` *\n"));
    }

    #[test]
    fn parse_command_variants() {
        assert_eq!(parse_command("/models"), Some(ControlCommand::Models));
        assert_eq!(parse_command("  /HELP "), Some(ControlCommand::Help));
        assert_eq!(
            parse_command("/model anthropic/claude-a"),
            Some(ControlCommand::Model(Some("anthropic/claude-a".into())))
        );
        assert_eq!(parse_command("/model"), Some(ControlCommand::Model(None)));
        assert_eq!(
            parse_command("/deploy now"),
            Some(ControlCommand::Unknown("deploy".into()))
        );
        assert_eq!(parse_command("models"), None);
        assert_eq!(parse_command("!ls"), None);
    }
}
