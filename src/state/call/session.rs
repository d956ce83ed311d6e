use super::clock::CallClock;
use super::reducer::{apply_event, begin_exchange, ReplyChange, ReplyEvent};
use crate::api::logging::emit_reply_failure;
use crate::api::CompletionService;
use crate::config::Config;
use crate::prompt::{reply_request, CallContext, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use crate::records::{CallRecord, CallStatus};
use crate::state::transcript::{Message, Transcript, Turn};
use crate::types::CompletionRequest;
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Whether the assistant is currently producing a reply. Only one reply is
/// ever in flight per session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplyStatus {
    #[default]
    Idle,
    AwaitingReply,
}

/// Incremental transcript change published while a call runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptUpdate {
    TurnAppended { index: usize, message: Message },
    ReplyStarted { index: usize, time: String },
    ReplyDelta { index: usize, delta: String },
    ReplySettled { index: usize, message: Message },
    StatusChanged(ReplyStatus),
}

pub struct CallSession {
    context: CallContext,
    transcript: Transcript,
    status: ReplyStatus,
    clock: CallClock,
    model: String,
    max_tokens: u32,
    reply_timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
    template_id: Option<String>,
}

impl CallSession {
    pub fn new(context: CallContext, seed: Vec<Turn>) -> Self {
        Self {
            context,
            transcript: Transcript::seeded(seed),
            status: ReplyStatus::Idle,
            clock: CallClock::start(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            reply_timeout: None,
            cancel: None,
            template_id: None,
        }
    }

    pub fn from_config(config: &Config, context: CallContext, seed: Vec<Turn>) -> Self {
        Self::new(context, seed)
            .with_model(config.model.clone(), config.max_tokens)
            .with_reply_timeout(config.reply_timeout)
    }

    pub fn with_model(mut self, model: impl Into<String>, max_tokens: u32) -> Self {
        self.model = model.into();
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Cancelling the token settles an in-flight reply with the fallback and
    /// ends the call: later exchanges are refused.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_clock(mut self, clock: CallClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = Some(template_id.into());
        self
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn status(&self) -> ReplyStatus {
        self.status
    }

    pub fn clock(&self) -> &CallClock {
        &self.clock
    }

    /// Mirrors the send button: enabled only for non-blank input while no
    /// reply is streaming.
    pub fn can_send(&self, input: &str) -> bool {
        !input.trim().is_empty() && self.status == ReplyStatus::Idle && !self.is_cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Records the counterparty's `utterance` and streams the assistant's
    /// answer into the transcript.
    ///
    /// Blank input is ignored and returns `Ok(None)` without contacting the
    /// service. Service failures never surface here: the reply is settled
    /// with [`FALLBACK_REPLY`](super::FALLBACK_REPLY) instead. Starting
    /// while another reply is still open, or after the call was cancelled,
    /// is an error.
    pub async fn respond_to<S: CompletionService>(
        &mut self,
        utterance: &str,
        service: &S,
        updates: Option<&mpsc::UnboundedSender<TranscriptUpdate>>,
    ) -> Result<Option<String>> {
        if utterance.trim().is_empty() {
            return Ok(None);
        }
        if self.status == ReplyStatus::AwaitingReply {
            bail!("the assistant is still responding; wait for the reply to settle");
        }
        if self.is_cancelled() {
            bail!("the call was cancelled; no further replies will be produced");
        }

        let time = self.clock.timestamp();
        let exchange = begin_exchange(&mut self.transcript, utterance, &time)?;
        if let Some(message) = self.transcript.message(exchange.utterance_index) {
            emit_update(
                updates,
                TranscriptUpdate::TurnAppended {
                    index: exchange.utterance_index,
                    message,
                },
            );
        }
        emit_update(
            updates,
            TranscriptUpdate::ReplyStarted {
                index: exchange.reply_index,
                time,
            },
        );
        self.set_status(ReplyStatus::AwaitingReply, updates);

        let request = reply_request(utterance, &self.context, &self.model, self.max_tokens);
        let streaming = stream_reply(&mut self.transcript, service, &request, updates);
        let outcome = settle_within(streaming, self.reply_timeout, self.cancel.as_ref()).await;

        let event = match outcome {
            Ok(()) => ReplyEvent::Completed,
            Err(error) => {
                emit_reply_failure(utterance, &error);
                ReplyEvent::Failed
            }
        };
        let reply_text = match apply_event(&mut self.transcript, event) {
            Some(ReplyChange::Settled { index, turn }) => {
                let text = turn.text.clone();
                emit_update(
                    updates,
                    TranscriptUpdate::ReplySettled {
                        index,
                        message: Message::from(&turn),
                    },
                );
                text
            }
            _ => String::new(),
        };
        self.set_status(ReplyStatus::Idle, updates);

        Ok(Some(reply_text))
    }

    /// Summarizes the call for the call history.
    pub fn end_call(&self, user_id: &str) -> CallRecord {
        let now = Utc::now();
        let status = if self.transcript.is_streaming() {
            CallStatus::InProgress
        } else {
            CallStatus::Completed
        };
        CallRecord {
            id: uuid::Uuid::new_v4().to_string(),
            template_id: self.template_id.clone(),
            contact_name: self.context.business_name.clone(),
            contact_number: self.context.business_phone.clone(),
            status,
            outcome: self.transcript.last_ai_text().unwrap_or_default().to_string(),
            transcript: self.transcript.render_text(&self.context.counterparty_label),
            duration: self.clock.elapsed_secs(),
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn set_status(
        &mut self,
        status: ReplyStatus,
        updates: Option<&mpsc::UnboundedSender<TranscriptUpdate>>,
    ) {
        if self.status != status {
            self.status = status;
            emit_update(updates, TranscriptUpdate::StatusChanged(status));
        }
    }
}

async fn stream_reply<S: CompletionService>(
    transcript: &mut Transcript,
    service: &S,
    request: &CompletionRequest,
    updates: Option<&mpsc::UnboundedSender<TranscriptUpdate>>,
) -> Result<()> {
    let mut fragments = service.stream_text(request).await?;
    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        if let Some(ReplyChange::Appended { index, delta }) =
            apply_event(transcript, ReplyEvent::Fragment(fragment))
        {
            emit_update(updates, TranscriptUpdate::ReplyDelta { index, delta });
        }
    }
    Ok(())
}

/// Runs `reply` to completion unless the timeout elapses or the token is
/// cancelled first; either counts as a failed reply.
async fn settle_within<F>(
    reply: F,
    timeout: Option<Duration>,
    cancel: Option<&CancellationToken>,
) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(anyhow!("reply cancelled")),
                result = with_timeout(reply, timeout) => result,
            }
        }
        None => with_timeout(reply, timeout).await,
    }
}

async fn with_timeout<F>(reply: F, timeout: Option<Duration>) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, reply).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "no reply settled within {}s",
                limit.as_secs_f32()
            )),
        },
        None => reply.await,
    }
}

fn emit_update(
    updates: Option<&mpsc::UnboundedSender<TranscriptUpdate>>,
    update: TranscriptUpdate,
) {
    if let Some(tx) = updates {
        let _ = tx.send(update);
    }
}
