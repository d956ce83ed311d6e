use anyhow::Result;
use callagent::api::ApiClient;
use callagent::config::Config;
use callagent::prompt::CallContext;
use callagent::state::{CallSession, Speaker, Transcript, TranscriptUpdate};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const END_COMMAND: &str = "/end";
const CONSOLE_USER_ID: &str = "console";

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let client = ApiClient::new(&config)?;
    let context = CallContext::default();
    let mut session =
        CallSession::from_config(&config, context, Transcript::default_call_seed());

    println!("{}", session.context().status_line(true));
    println!(
        "{}",
        session
            .transcript()
            .render_text(&session.context().counterparty_label)
    );
    println!(
        "Type what the {} says. {END_COMMAND} hangs up.",
        session.context().counterparty_label
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_updates(rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim() == END_COMMAND {
            break;
        }
        if !session.can_send(&line) {
            continue;
        }
        session.respond_to(&line, &client, Some(&tx)).await?;
    }

    drop(tx);
    let _ = printer.await;

    let record = session.end_call(CONSOLE_USER_ID);
    println!("Call ended: {}", record.summary());
    Ok(())
}

async fn print_updates(mut rx: mpsc::UnboundedReceiver<TranscriptUpdate>) {
    let mut stdout = std::io::stdout();
    let mut console = ConsoleTranscript::default();
    while let Some(update) = rx.recv().await {
        let _ = write!(stdout, "{}", console.render(update));
        let _ = stdout.flush();
    }
}

/// Turns transcript updates into console output. Streamed text is printed as
/// it arrives; a settled reply that differs from it is printed again on its
/// own line.
#[derive(Default)]
struct ConsoleTranscript {
    streaming: Option<(usize, String)>,
}

impl ConsoleTranscript {
    fn render(&mut self, update: TranscriptUpdate) -> String {
        match update {
            TranscriptUpdate::TurnAppended { message, .. } if message.speaker == Speaker::Ai => {
                format!("AI [{}]: {}\n", message.time, message.text)
            }
            TranscriptUpdate::TurnAppended { .. } | TranscriptUpdate::StatusChanged(_) => {
                String::new()
            }
            TranscriptUpdate::ReplyStarted { index, time } => {
                self.streaming = Some((index, String::new()));
                format!("AI [{time}]: ")
            }
            TranscriptUpdate::ReplyDelta { index, delta } => match &mut self.streaming {
                Some((open, streamed)) if *open == index => {
                    streamed.push_str(&delta);
                    delta
                }
                _ => String::new(),
            },
            TranscriptUpdate::ReplySettled { index, message } => match self.streaming.take() {
                Some((open, streamed)) if open == index && streamed == message.text => {
                    "\n".to_string()
                }
                _ => format!("\nAI [{}]: {}\n", message.time, message.text),
            },
        }
    }
}
