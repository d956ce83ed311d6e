use super::*;
use crate::api::{MockCompletionService, MockReply};
use crate::prompt::CallContext;
use crate::state::transcript::{Message, Speaker, Transcript, Turn};
use crate::state::TranscriptView;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn seeded_session() -> CallSession {
    CallSession::new(CallContext::pizza_order(), Transcript::default_call_seed())
}

fn drain(rx: &mut mpsc::UnboundedReceiver<TranscriptUpdate>) -> Vec<TranscriptUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}

#[tokio::test]
async fn test_exchange_appends_counterparty_then_ai_turn() -> Result<()> {
    let mock = MockCompletionService::new(vec![MockReply::fragments(["Yes, ", "that's right."])]);
    let mut session = seeded_session();

    let reply = session.respond_to("Is that for delivery?", &mock, None).await?;

    assert_eq!(reply.as_deref(), Some("Yes, that's right."));
    let messages = session.transcript().messages();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[3].speaker, Speaker::Counterparty);
    assert_eq!(messages[3].text, "Is that for delivery?");
    assert_eq!(messages[4].speaker, Speaker::Ai);
    assert_eq!(messages[4].text, "Yes, that's right.");
    assert!(!messages[4].streaming);
    assert_eq!(session.status(), ReplyStatus::Idle);
    Ok(())
}

#[tokio::test]
async fn test_blank_utterance_is_a_no_op() -> Result<()> {
    let mock = MockCompletionService::new(vec![MockReply::fragments(["unused"])]);
    let mut session = seeded_session();
    let before = session.transcript().clone();
    let (tx, mut rx) = mpsc::unbounded_channel();

    for blank in ["", "   ", "\n\t "] {
        assert!(!session.can_send(blank));
        assert_eq!(session.respond_to(blank, &mock, Some(&tx)).await?, None);
    }

    assert_eq!(session.transcript(), &before);
    assert_eq!(mock.call_count(), 0);
    assert!(drain(&mut rx).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_fragments_accumulate_and_streaming_clears_only_on_completion() -> Result<()> {
    let mock = MockCompletionService::new(vec![MockReply::fragments([
        "Sure",
        ", one moment",
        ", confirming now.",
    ])]);
    let mut session = seeded_session();
    let (tx, mut rx) = mpsc::unbounded_channel();

    session.respond_to("Can you confirm?", &mock, Some(&tx)).await?;

    let updates = drain(&mut rx);
    let mut view = TranscriptView::from_transcript(&Transcript::seeded(
        Transcript::default_call_seed(),
    ));
    let mut settled_seen = false;
    for update in updates {
        let is_settle = matches!(update, TranscriptUpdate::ReplySettled { .. });
        view.apply(update);
        if !settled_seen && !is_settle && view.messages().len() == 5 {
            assert!(view.messages()[4].streaming, "reply settled before completion");
        }
        settled_seen |= is_settle;
    }

    assert!(settled_seen);
    assert_eq!(view.messages()[4].text, "Sure, one moment, confirming now.");
    assert!(!view.messages()[4].streaming);
    assert_eq!(view.messages(), session.transcript().messages().as_slice());
    Ok(())
}

#[tokio::test]
async fn test_failure_after_partial_fragment_uses_exact_fallback() -> Result<()> {
    let mock = MockCompletionService::new(vec![MockReply::FailAfter(
        vec!["Sur".to_string()],
        "stream reset".to_string(),
    )]);
    let mut session = seeded_session();

    let reply = session.respond_to("Hello?", &mock, None).await?;

    assert_eq!(reply.as_deref(), Some(FALLBACK_REPLY));
    let last = session.transcript().last_message().expect("reply row");
    assert_eq!(last.text, FALLBACK_REPLY);
    assert!(!last.streaming);
    assert_eq!(session.status(), ReplyStatus::Idle);
    Ok(())
}

#[tokio::test]
async fn test_failure_before_stream_uses_fallback_without_retry() -> Result<()> {
    let mock = MockCompletionService::new(vec![
        MockReply::FailBeforeStream("503 Service Unavailable".to_string()),
        MockReply::fragments(["should not be used"]),
    ]);
    let mut session = seeded_session();

    let reply = session.respond_to("Hello?", &mock, None).await?;

    assert_eq!(reply.as_deref(), Some(FALLBACK_REPLY));
    assert_eq!(mock.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_empty_stream_settles_with_empty_text() -> Result<()> {
    let mock = MockCompletionService::new(vec![MockReply::fragments(Vec::<String>::new())]);
    let mut session = seeded_session();

    let reply = session.respond_to("Hi", &mock, None).await?;

    assert_eq!(reply.as_deref(), Some(""));
    let last = session.transcript().last_message().expect("reply row");
    assert_eq!(last.speaker, Speaker::Ai);
    assert!(!last.streaming);
    Ok(())
}

#[tokio::test]
async fn test_every_intermediate_state_has_at_most_one_trailing_streaming_turn() -> Result<()> {
    let mock = MockCompletionService::new(vec![
        MockReply::fragments(["One", " two", " three"]),
        MockReply::FailAfter(vec!["Fo".to_string()], "boom".to_string()),
    ]);
    let mut session = seeded_session();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut view = TranscriptView::from_transcript(session.transcript());

    session.respond_to("First", &mock, Some(&tx)).await?;
    session.respond_to("Second", &mock, Some(&tx)).await?;

    for update in drain(&mut rx) {
        view.apply(update);
        let streaming: Vec<usize> = view
            .messages()
            .iter()
            .enumerate()
            .filter(|(_, m)| m.streaming)
            .map(|(i, _)| i)
            .collect();
        assert!(streaming.len() <= 1);
        if let Some(index) = streaming.first() {
            assert_eq!(*index, view.messages().len() - 1);
            assert!(view.typing_indicator());
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_sequential_exchanges_append_in_order_without_interleaving() -> Result<()> {
    let mock = MockCompletionService::new(vec![
        MockReply::fragments(["Large ", "please."]),
        MockReply::fragments(["Cash ", "on delivery."]),
    ]);
    let seed = vec![
        Turn::new(Speaker::Ai, "A", "00:01"),
        Turn::new(Speaker::Counterparty, "B", "00:02"),
    ];
    let mut session = CallSession::new(CallContext::pizza_order(), seed);

    session.respond_to("What size?", &mock, None).await?;
    session.respond_to("How will you pay?", &mock, None).await?;

    let texts: Vec<String> = session
        .transcript()
        .messages()
        .into_iter()
        .map(|m: Message| m.text)
        .collect();
    assert_eq!(
        texts,
        vec![
            "A",
            "B",
            "What size?",
            "Large please.",
            "How will you pay?",
            "Cash on delivery.",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_prompt_carries_utterance_and_configured_model() -> Result<()> {
    let mock = MockCompletionService::new(vec![MockReply::fragments(["ok"])]);
    let mut session = seeded_session().with_model("gpt-4o", 64);

    session.respond_to("  Your total is $31.  ", &mock, None).await?;

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "gpt-4o");
    assert_eq!(requests[0].max_tokens, 64);
    assert!(requests[0]
        .prompt
        .contains("Restaurant just said: \"  Your total is $31.  \""));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_both_new_turns_share_one_timestamp() -> Result<()> {
    let mock = MockCompletionService::new(vec![MockReply::fragments(["Thanks!"])]);
    let mut session = seeded_session().with_clock(CallClock::resume_from(Duration::from_secs(42)));

    session.respond_to("Ready in 30 minutes.", &mock, None).await?;

    let messages = session.transcript().messages();
    assert_eq!(messages[3].time, "00:42");
    assert_eq!(messages[4].time, "00:42");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_hung_reply_blocks_further_input_without_timeout() -> Result<()> {
    let mock = MockCompletionService::new(vec![
        MockReply::Hang(vec!["Let me".to_string()]),
        MockReply::fragments(["unused"]),
    ]);
    let mut session = seeded_session();

    let abandoned =
        tokio::time::timeout(Duration::from_secs(600), session.respond_to("Hello?", &mock, None))
            .await;
    assert!(abandoned.is_err(), "a hung service never settles the reply");

    assert_eq!(session.status(), ReplyStatus::AwaitingReply);
    assert!(session.transcript().is_streaming());
    assert!(!session.can_send("Still there?"));
    assert!(session.respond_to("Still there?", &mock, None).await.is_err());
    assert_eq!(mock.call_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reply_timeout_settles_with_fallback() -> Result<()> {
    let mock = MockCompletionService::new(vec![MockReply::Hang(vec!["Let me".to_string()])]);
    let mut session = seeded_session().with_reply_timeout(Some(Duration::from_secs(20)));

    let reply = session.respond_to("Hello?", &mock, None).await?;

    assert_eq!(reply.as_deref(), Some(FALLBACK_REPLY));
    assert_eq!(session.status(), ReplyStatus::Idle);
    assert!(session.can_send("Next"));
    Ok(())
}

#[tokio::test]
async fn test_cancellation_settles_with_fallback() -> Result<()> {
    let token = CancellationToken::new();
    let mock = MockCompletionService::new(vec![MockReply::Hang(Vec::new())]);
    let mut session = seeded_session().with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });
    let reply = session.respond_to("Hello?", &mock, None).await?;
    canceller.await?;

    assert_eq!(reply.as_deref(), Some(FALLBACK_REPLY));
    assert!(!session.transcript().is_streaming());
    Ok(())
}

#[tokio::test]
async fn test_cancelled_call_refuses_later_exchanges() -> Result<()> {
    let token = CancellationToken::new();
    let mock = MockCompletionService::new(vec![
        MockReply::Hang(Vec::new()),
        MockReply::fragments(["never requested"]),
    ]);
    let mut session = seeded_session().with_cancellation(token.clone());
    assert!(session.can_send("Hello?"));

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });
    session.respond_to("Hello?", &mock, None).await?;
    canceller.await?;
    let after_cancel = session.transcript().clone();

    assert!(session.is_cancelled());
    assert!(!session.can_send("Are you there?"));
    assert!(session.respond_to("Are you there?", &mock, None).await.is_err());
    assert_eq!(session.transcript(), &after_cancel);
    assert_eq!(session.status(), ReplyStatus::Idle);
    assert_eq!(mock.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_status_updates_bracket_each_exchange() -> Result<()> {
    let mock = MockCompletionService::new(vec![MockReply::fragments(["Okay."])]);
    let mut session = seeded_session();
    let (tx, mut rx) = mpsc::unbounded_channel();

    session.respond_to("We close at nine.", &mock, Some(&tx)).await?;

    let updates = drain(&mut rx);
    assert!(matches!(updates[0], TranscriptUpdate::TurnAppended { index: 3, .. }));
    assert!(matches!(updates[1], TranscriptUpdate::ReplyStarted { index: 4, .. }));
    assert_eq!(
        updates[2],
        TranscriptUpdate::StatusChanged(ReplyStatus::AwaitingReply)
    );
    assert_eq!(
        updates.last(),
        Some(&TranscriptUpdate::StatusChanged(ReplyStatus::Idle))
    );
    Ok(())
}

#[tokio::test]
async fn test_sse_reply_streams_through_parser() -> Result<()> {
    let mock = MockCompletionService::new(vec![MockReply::Sse(vec![
        r#"event: message_start
data: {"type":"message_start","message":{"id":"msg_1","type":"message","role":"assistant","content":[]}}"#
            .to_string(),
        r#"event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Great, "}}"#
            .to_string(),
        r#"event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"thank you!"}}"#
            .to_string(),
        r#"event: message_stop
data: {"type":"message_stop"}"#
            .to_string(),
    ])]);
    let mut session = seeded_session();

    let reply = session.respond_to("See you soon.", &mock, None).await?;
    assert_eq!(reply.as_deref(), Some("Great, thank you!"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_end_call_summarizes_transcript() -> Result<()> {
    let mock = MockCompletionService::new(vec![MockReply::fragments(["Perfect, thanks!"])]);
    let mut session = seeded_session().with_template("1");

    tokio::time::advance(Duration::from_secs(65)).await;
    session.respond_to("Order confirmed.", &mock, None).await?;
    let record = session.end_call("user_1");

    assert_eq!(record.status, crate::records::CallStatus::Completed);
    assert_eq!(record.contact_name, "Tony's Pizza");
    assert_eq!(record.template_id.as_deref(), Some("1"));
    assert_eq!(record.outcome, "Perfect, thanks!");
    assert_eq!(record.duration, 65);
    assert!(record
        .transcript
        .ends_with("Restaurant [01:05]: Order confirmed.\nAI [01:05]: Perfect, thanks!"));
    Ok(())
}
