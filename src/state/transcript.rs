use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The assistant placing the call.
    Ai,
    /// The business on the other end of the line.
    Counterparty,
    /// A person typing in place of the counterparty (test mode).
    User,
}

impl Speaker {
    pub fn label<'a>(&self, counterparty_label: &'a str) -> &'a str {
        match self {
            Speaker::Ai => "AI",
            Speaker::Counterparty => counterparty_label,
            Speaker::User => "User",
        }
    }
}

/// A finalized utterance. Never mutated once it is part of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub time: String,
}

impl Turn {
    pub fn new(speaker: Speaker, text: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            time: time.into(),
        }
    }
}

/// The AI turn whose text is still arriving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReply {
    text: String,
    time: String,
}

impl PendingReply {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn time(&self) -> &str {
        &self.time
    }
}

/// Flat view of one transcript row, as a frontend draws it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub speaker: Speaker,
    pub text: String,
    pub time: String,
    pub streaming: bool,
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        Self {
            speaker: turn.speaker,
            text: turn.text.clone(),
            time: turn.time.clone(),
            streaming: false,
        }
    }
}

impl From<&PendingReply> for Message {
    fn from(reply: &PendingReply) -> Self {
        Self {
            speaker: Speaker::Ai,
            text: reply.text.clone(),
            time: reply.time.clone(),
            streaming: true,
        }
    }
}

/// Append-only call transcript.
///
/// Settled turns live in `turns`. The open reply, if any, is held apart and
/// is always the logical last row, so at most one row streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<Turn>,
    pending: Option<PendingReply>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(turns: Vec<Turn>) -> Self {
        Self {
            turns,
            pending: None,
        }
    }

    /// Opening of the sample pizza order shown when a call starts.
    pub fn default_call_seed() -> Vec<Turn> {
        vec![
            Turn::new(
                Speaker::Ai,
                "Hello, I'd like to place an order for delivery please.",
                "00:05",
            ),
            Turn::new(
                Speaker::Counterparty,
                "Sure! What would you like to order today?",
                "00:08",
            ),
            Turn::new(
                Speaker::Ai,
                "I'd like one large pepperoni pizza and a Caesar salad.",
                "00:12",
            ),
        ]
    }

    pub fn len(&self) -> usize {
        self.turns.len() + usize::from(self.pending.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_streaming(&self) -> bool {
        self.pending.is_some()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn pending(&self) -> Option<&PendingReply> {
        self.pending.as_ref()
    }

    pub fn message(&self, index: usize) -> Option<Message> {
        if let Some(turn) = self.turns.get(index) {
            return Some(turn.into());
        }
        if index == self.turns.len() {
            return self.pending.as_ref().map(Message::from);
        }
        None
    }

    pub fn last_message(&self) -> Option<Message> {
        self.len().checked_sub(1).and_then(|index| self.message(index))
    }

    pub fn messages(&self) -> Vec<Message> {
        self.turns
            .iter()
            .map(Message::from)
            .chain(self.pending.iter().map(Message::from))
            .collect()
    }

    /// Text of the most recent settled AI turn.
    pub fn last_ai_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.speaker == Speaker::Ai)
            .map(|turn| turn.text.as_str())
    }

    /// Appends a settled turn. Refused while a reply is streaming so the open
    /// reply stays last.
    pub fn push_turn(&mut self, turn: Turn) -> Result<usize> {
        if self.pending.is_some() {
            bail!("cannot append a turn while a reply is still streaming");
        }
        self.turns.push(turn);
        Ok(self.turns.len() - 1)
    }

    pub(crate) fn open_reply(&mut self, time: &str) -> Result<usize> {
        if self.pending.is_some() {
            bail!("a reply is already streaming");
        }
        self.pending = Some(PendingReply {
            text: String::new(),
            time: time.to_string(),
        });
        Ok(self.turns.len())
    }

    pub(crate) fn append_to_reply(&mut self, fragment: &str) -> Option<usize> {
        let reply = self.pending.as_mut()?;
        reply.text.push_str(fragment);
        Some(self.turns.len())
    }

    /// Closes the open reply, keeping its text or replacing it wholesale.
    pub(crate) fn settle_reply(&mut self, replacement: Option<&str>) -> Option<(usize, &Turn)> {
        let reply = self.pending.take()?;
        let text = match replacement {
            Some(text) => text.to_string(),
            None => reply.text,
        };
        self.turns.push(Turn::new(Speaker::Ai, text, reply.time));
        let index = self.turns.len() - 1;
        self.turns.last().map(|turn| (index, turn))
    }

    /// One `Speaker [time]: text` line per row, used for call records.
    pub fn render_text(&self, counterparty_label: &str) -> String {
        self.messages()
            .iter()
            .map(|message| {
                format!(
                    "{} [{}]: {}",
                    message.speaker.label(counterparty_label),
                    message.time,
                    message.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
