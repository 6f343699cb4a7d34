//! Dispatch of inbound chat text.
//!
//! For each text, first match wins:
//!
//! 1. `/` control commands.
//! 2. A reply to the pending permission request.
//! 3. A numeric reply to the pending question.
//! 4. A free-text reply to the pending question, when custom answers are allowed.
//! 5. A `!` shell command, when the shell is enabled.
//! 6. Anything else is forwarded to the agent as input.
//!
//! Resolving a question or permission clears it before the runtime reply is
//! sent; a failed reply is reported in chat and not retried.

use chatlink_agent::{AgentRuntime, ModelRef, PermissionReply, ProviderCatalog};
use tracing::{debug, info, warn};

use crate::channel::ChannelError;
use crate::format::{self, ControlCommand, SHELL_MARKER};
use crate::interaction::{PendingInteraction, PendingPermission, PendingQuestion};
use crate::notifier::Outbound;
use crate::shell::ShellGate;

/// What the router did with a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Command,
    PermissionResolved(PermissionReply),
    /// The reply was not a permission token; the request stays pending.
    PermissionInvalid,
    QuestionAnswered(String),
    /// The user chose the custom entry; the next text is the answer.
    AwaitingCustom,
    /// Number outside the listed range; the question stays pending.
    QuestionOutOfRange,
    Shell,
    Forwarded,
}

/// Map a permission reply to its decision, case-insensitively.
pub fn parse_permission_reply(text: &str) -> Option<PermissionReply> {
    match text.trim().to_lowercase().as_str() {
        "1" | "y" | "yes" | "once" | "allow" | "ok" => Some(PermissionReply::Once),
        "2" | "a" | "always" => Some(PermissionReply::Always),
        "3" | "n" | "no" | "reject" | "deny" => Some(PermissionReply::Reject),
        _ => None,
    }
}

enum Choice {
    Option(usize),
    Custom,
    OutOfRange,
}

fn numeric_choice(q: &PendingQuestion, digits: &str) -> Choice {
    let Ok(n) = digits.parse::<usize>() else {
        return Choice::OutOfRange;
    };
    if (1..=q.options.len()).contains(&n) {
        Choice::Option(n - 1)
    } else if q.custom_choice() == Some(n) {
        Choice::Custom
    } else {
        Choice::OutOfRange
    }
}

pub struct InteractiveRouter {
    pending: Option<PendingInteraction>,
    shell: ShellGate,
}

impl InteractiveRouter {
    pub fn new(shell: ShellGate) -> Self {
        Self {
            pending: None,
            shell,
        }
    }

    pub fn pending(&self) -> Option<&PendingInteraction> {
        self.pending.as_ref()
    }

    /// Make `interaction` the one replies are read against.
    pub fn install(&mut self, interaction: PendingInteraction) {
        if let Some(previous) = self.pending.replace(interaction) {
            info!(request = previous.request_id(), "pending interaction superseded");
        }
    }

    pub async fn route<R, O>(
        &mut self,
        text: &str,
        runtime: &R,
        out: &O,
    ) -> Result<RouteOutcome, ChannelError>
    where
        R: AgentRuntime + ?Sized,
        O: Outbound + ?Sized,
    {
        let trimmed = text.trim();

        if let Some(command) = format::parse_command(trimmed) {
            self.run_command(command, runtime, out).await;
            return Ok(RouteOutcome::Command);
        }

        match self.pending.take() {
            Some(PendingInteraction::Permission(p)) => {
                return Ok(self.answer_permission(p, trimmed, runtime, out).await);
            }
            Some(PendingInteraction::Question(q)) => {
                if let Some(outcome) = self.answer_question(q, trimmed, runtime, out).await {
                    return Ok(outcome);
                }
            }
            None => {}
        }

        if let Some(body) = trimmed.strip_prefix(SHELL_MARKER) {
            let body = body.trim();
            if self.shell.enabled() && !body.is_empty() {
                let outcome = self.shell.run(body).await;
                out.send(&outcome.render()).await;
                return Ok(RouteOutcome::Shell);
            }
        }

        debug!(len = text.len(), "forwarding chat text to agent");
        runtime.send_input(text).await?;
        Ok(RouteOutcome::Forwarded)
    }

    async fn answer_permission<R, O>(
        &mut self,
        p: PendingPermission,
        reply: &str,
        runtime: &R,
        out: &O,
    ) -> RouteOutcome
    where
        R: AgentRuntime + ?Sized,
        O: Outbound + ?Sized,
    {
        let Some(decision) = parse_permission_reply(reply) else {
            self.pending = Some(PendingInteraction::Permission(p));
            out.send(&format::permission_hint()).await;
            return RouteOutcome::PermissionInvalid;
        };

        match runtime
            .reply_permission(&p.session_id, &p.request_id, decision)
            .await
        {
            Ok(()) => {
                let verdict = match decision {
                    PermissionReply::Once => "allowed once",
                    PermissionReply::Always => "always allowed",
                    PermissionReply::Reject => "rejected",
                };
                out.send(&format!(
                    "Permission {}: {verdict}",
                    format::escape_mrkdwn(&p.title)
                ))
                .await;
            }
            Err(e) => {
                warn!(request = %p.request_id, error = %e, "permission reply failed");
                out.send(&format!("Failed to send permission reply: {e}")).await;
            }
        }
        RouteOutcome::PermissionResolved(decision)
    }

    /// Returns `None` when the text is not an answer and should fall through.
    async fn answer_question<R, O>(
        &mut self,
        mut q: PendingQuestion,
        reply: &str,
        runtime: &R,
        out: &O,
    ) -> Option<RouteOutcome>
    where
        R: AgentRuntime + ?Sized,
        O: Outbound + ?Sized,
    {
        if reply.is_empty() {
            self.pending = Some(PendingInteraction::Question(q));
            return None;
        }

        let answer = if q.awaiting_custom {
            reply.to_string()
        } else if reply.chars().all(|c| c.is_ascii_digit()) {
            match numeric_choice(&q, reply) {
                Choice::Option(idx) => q.options[idx].label.clone(),
                Choice::Custom => {
                    q.awaiting_custom = true;
                    self.pending = Some(PendingInteraction::Question(q));
                    out.send(&format::custom_answer_prompt()).await;
                    return Some(RouteOutcome::AwaitingCustom);
                }
                Choice::OutOfRange => {
                    out.send(&format::question_range_hint(&q)).await;
                    self.pending = Some(PendingInteraction::Question(q));
                    return Some(RouteOutcome::QuestionOutOfRange);
                }
            }
        } else if q.allow_custom {
            reply.to_string()
        } else {
            self.pending = Some(PendingInteraction::Question(q));
            return None;
        };

        match runtime.reply_question(&q.request_id, &answer).await {
            Ok(()) => out.send(&format::question_answered(&answer)).await,
            Err(e) => {
                warn!(request = %q.request_id, error = %e, "question reply failed");
                out.send(&format!("Failed to send answer: {e}")).await;
            }
        }
        Some(RouteOutcome::QuestionAnswered(answer))
    }

    async fn run_command<R, O>(&self, command: ControlCommand, runtime: &R, out: &O)
    where
        R: AgentRuntime + ?Sized,
        O: Outbound + ?Sized,
    {
        match command {
            ControlCommand::Help => out.send(&format::help_text()).await,
            ControlCommand::Models => match runtime.providers().await {
                Ok(catalog) => {
                    let current = current_model(runtime, &catalog).await;
                    out.send(&format::model_list(&catalog, current.as_ref()))
                        .await;
                }
                Err(e) => out.send(&format!("Failed to list models: {e}")).await,
            },
            ControlCommand::Model(None) => {
                let current = match runtime.providers().await {
                    Ok(catalog) => current_model(runtime, &catalog).await,
                    Err(e) => {
                        out.send(&format!("Failed to read models: {e}")).await;
                        return;
                    }
                };
                match current {
                    Some(model) => out.send(&format!("Current model: `{model}`")).await,
                    None => out.send("No model selected.").await,
                }
            }
            ControlCommand::Model(Some(spec)) => {
                let Some(model) = ModelRef::parse(&spec) else {
                    out.send("Usage: `/model provider/model`").await;
                    return;
                };
                if let Ok(catalog) = runtime.providers().await {
                    if !catalog.contains(&model) {
                        out.send(&format!(
                            "Unknown model `{model}`. Use `/models` to list available models."
                        ))
                        .await;
                        return;
                    }
                }
                match runtime.set_model(&model).await {
                    Ok(()) => {
                        info!(model = %model, "switched model");
                        out.send(&format!("Switched model to `{model}`")).await;
                    }
                    Err(e) => out.send(&format!("Failed to switch model: {e}")).await,
                }
            }
            ControlCommand::Unknown(name) => {
                out.send(&format!(
                    "Command `/{}` is not supported. Try `/help`.",
                    format::escape_mrkdwn(&name)
                ))
                .await;
            }
        }
    }
}

/// Model of the most recently updated top-level session, else the catalog
/// default.
async fn current_model<R: AgentRuntime + ?Sized>(
    runtime: &R,
    catalog: &ProviderCatalog,
) -> Option<ModelRef> {
    let from_session = match runtime.list_sessions().await {
        Ok(sessions) => sessions
            .into_iter()
            .filter(|s| s.parent_id.is_none())
            .max_by_key(|s| s.updated)
            .and_then(|s| s.model),
        Err(e) => {
            warn!(error = %e, "failed to list sessions");
            None
        }
    };
    from_session.or_else(|| catalog.default_model())
}
