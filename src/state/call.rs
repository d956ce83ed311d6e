mod clock;
mod reducer;
mod session;

#[cfg(test)]
mod tests;

pub use clock::CallClock;
pub use reducer::{
    apply_event, begin_exchange, reduce, Exchange, ReplyChange, ReplyEvent, FALLBACK_REPLY,
};
pub use session::{CallSession, ReplyStatus, TranscriptUpdate};
