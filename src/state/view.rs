use super::call::{ReplyStatus, TranscriptUpdate};
use super::transcript::{Message, Speaker, Transcript};

/// Frontend-side replica of a call transcript, rebuilt from the updates a
/// `CallSession` publishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptView {
    messages: Vec<Message>,
    status: ReplyStatus,
}

impl TranscriptView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_transcript(transcript: &Transcript) -> Self {
        Self {
            messages: transcript.messages(),
            status: if transcript.is_streaming() {
                ReplyStatus::AwaitingReply
            } else {
                ReplyStatus::Idle
            },
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn status(&self) -> ReplyStatus {
        self.status
    }

    /// "AI is thinking..." indicator.
    pub fn typing_indicator(&self) -> bool {
        self.status == ReplyStatus::AwaitingReply
    }

    pub fn streaming_count(&self) -> usize {
        self.messages.iter().filter(|m| m.streaming).count()
    }

    pub fn apply(&mut self, update: TranscriptUpdate) {
        match update {
            TranscriptUpdate::TurnAppended { index, message }
            | TranscriptUpdate::ReplySettled { index, message } => self.put(index, message),
            TranscriptUpdate::ReplyStarted { index, time } => self.put(
                index,
                Message {
                    speaker: Speaker::Ai,
                    text: String::new(),
                    time,
                    streaming: true,
                },
            ),
            TranscriptUpdate::ReplyDelta { index, delta } => {
                if let Some(message) = self.messages.get_mut(index) {
                    message.text.push_str(&delta);
                }
            }
            TranscriptUpdate::StatusChanged(status) => self.status = status,
        }
    }

    fn put(&mut self, index: usize, message: Message) {
        if let Some(slot) = self.messages.get_mut(index) {
            *slot = message;
        } else if index == self.messages.len() {
            self.messages.push(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_follows_reply_lifecycle() {
        let mut view = TranscriptView::from_transcript(&Transcript::seeded(
            Transcript::default_call_seed(),
        ));
        assert_eq!(view.messages().len(), 3);

        view.apply(TranscriptUpdate::TurnAppended {
            index: 3,
            message: Message {
                speaker: Speaker::Counterparty,
                text: "Anything else?".to_string(),
                time: "00:40".to_string(),
                streaming: false,
            },
        });
        view.apply(TranscriptUpdate::ReplyStarted {
            index: 4,
            time: "00:40".to_string(),
        });
        view.apply(TranscriptUpdate::StatusChanged(ReplyStatus::AwaitingReply));
        view.apply(TranscriptUpdate::ReplyDelta {
            index: 4,
            delta: "No, ".to_string(),
        });
        view.apply(TranscriptUpdate::ReplyDelta {
            index: 4,
            delta: "thanks".to_string(),
        });

        assert!(view.typing_indicator());
        assert_eq!(view.streaming_count(), 1);
        assert_eq!(view.messages()[4].text, "No, thanks");

        view.apply(TranscriptUpdate::ReplySettled {
            index: 4,
            message: Message {
                speaker: Speaker::Ai,
                text: "No, thanks".to_string(),
                time: "00:40".to_string(),
                streaming: false,
            },
        });
        view.apply(TranscriptUpdate::StatusChanged(ReplyStatus::Idle));

        assert!(!view.typing_indicator());
        assert_eq!(view.streaming_count(), 0);
        assert_eq!(view.messages().len(), 5);
    }

    #[test]
    fn test_out_of_range_updates_are_dropped() {
        let mut view = TranscriptView::new();
        view.apply(TranscriptUpdate::ReplyDelta {
            index: 7,
            delta: "lost".to_string(),
        });
        view.apply(TranscriptUpdate::ReplyStarted {
            index: 2,
            time: "00:01".to_string(),
        });
        assert!(view.messages().is_empty());
    }
}
