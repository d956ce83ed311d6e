use crate::state::transcript::{Speaker, Transcript, Turn};
use anyhow::{bail, Result};

/// Spoken in place of a reply the completion service failed to produce.
pub const FALLBACK_REPLY: &str =
    "I understand. Could you please confirm the total and delivery time?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    Fragment(String),
    Completed,
    Failed,
}

/// Rows added by [`begin_exchange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
    pub utterance_index: usize,
    pub reply_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyChange {
    Appended { index: usize, delta: String },
    Settled { index: usize, turn: Turn },
}

/// Appends the counterparty's literal utterance and opens an empty AI reply
/// after it. Both rows share `time`.
pub fn begin_exchange(
    transcript: &mut Transcript,
    utterance: &str,
    time: &str,
) -> Result<Exchange> {
    if transcript.is_streaming() {
        bail!("cannot start an exchange while a reply is still streaming");
    }
    let utterance_index = transcript.push_turn(Turn::new(Speaker::Counterparty, utterance, time))?;
    let reply_index = transcript.open_reply(time)?;
    Ok(Exchange {
        utterance_index,
        reply_index,
    })
}

/// Folds one event into the open reply. Returns `None` when there is no open
/// reply or the event changed nothing.
pub fn apply_event(transcript: &mut Transcript, event: ReplyEvent) -> Option<ReplyChange> {
    match event {
        ReplyEvent::Fragment(delta) => {
            if delta.is_empty() {
                return None;
            }
            let index = transcript.append_to_reply(&delta)?;
            Some(ReplyChange::Appended { index, delta })
        }
        ReplyEvent::Completed => settle(transcript, None),
        ReplyEvent::Failed => settle(transcript, Some(FALLBACK_REPLY)),
    }
}

/// Value-in, value-out form of [`apply_event`].
pub fn reduce(mut transcript: Transcript, event: ReplyEvent) -> Transcript {
    apply_event(&mut transcript, event);
    transcript
}

fn settle(transcript: &mut Transcript, replacement: Option<&str>) -> Option<ReplyChange> {
    transcript
        .settle_reply(replacement)
        .map(|(index, turn)| ReplyChange::Settled {
            index,
            turn: turn.clone(),
        })
}
