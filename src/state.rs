mod call;
mod transcript;
mod view;

pub use call::{
    apply_event, begin_exchange, reduce, CallClock, CallSession, Exchange, ReplyChange,
    ReplyEvent, ReplyStatus, TranscriptUpdate, FALLBACK_REPLY,
};
pub use transcript::{Message, PendingReply, Speaker, Transcript, Turn};
pub use view::TranscriptView;
