//! report-chat - ask questions about a report from the terminal
//!
//! Usage: `report-chat <insight_id>`. Each input line is sent as a question;
//! `/switch <insight_id>` moves to another report, `/retry` reconnects after
//! the connection was given up and `/quit` exits.

use report_chat::api::ReportApi;
use report_chat::config::ChatConfig;
use report_chat::conversation::Sender;
use report_chat::runtime::{self, ChatHandle, ChatView};
use report_chat::session_store::{SessionStore, StoreError};
use report_chat::transport::WsConnector;
use std::collections::HashSet;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they never mix with the transcript
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "report_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let Some(mut insight_id) = std::env::args().nth(1) else {
        eprintln!("usage: report-chat <insight_id>");
        std::process::exit(2);
    };

    let config = ChatConfig::from_env();
    tracing::info!(
        api_url = %config.api_url,
        ws_url = %config.ws_url,
        state_dir = %config.state_dir.display(),
        "Starting report chat"
    );

    let api = ReportApi::new(&config.api_url, config.user_id.clone())?;
    let connector = WsConnector::new(&config.ws_url)?;
    let mut store = SessionStore::open(&config.state_dir)?;

    let session_id = resolve_session(&mut store, &api, &insight_id).await?;
    let chat = runtime::start(&config, connector, api.clone());
    chat.activate(session_id).await?;

    let renderer = tokio::spawn(render(chat.clone(), chat.subscribe()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut views = chat.subscribe();
    // Expired sessions already dealt with, and sessions created to replace them
    let mut handled = HashSet::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Input::parse(&line) {
                    Input::Empty => {}
                    Input::Quit => break,
                    Input::Switch(next) => {
                        match resolve_session(&mut store, &api, &next).await {
                            Ok(session_id) => {
                                insight_id = next;
                                chat.activate(session_id).await?;
                            }
                            Err(e) => println!("! {e}"),
                        }
                    }
                    Input::Retry => {
                        if !chat.reconnect().await? {
                            println!("! The connection is not down, nothing to retry");
                        }
                    }
                    Input::Message(text) => {
                        if let Err(e) = chat.submit(text).await {
                            println!("! {e}");
                        }
                    }
                }
            }
            Ok(()) = views.changed() => {
                let expired = {
                    let view = views.borrow_and_update();
                    needs_renewal(&view, &handled).map(str::to_string)
                };
                if let Some(expired) = expired {
                    tracing::warn!(
                        insight_id = %insight_id,
                        session_id = %expired,
                        "Chat session expired, starting a new one"
                    );
                    handled.insert(expired);
                    match renew_session(&mut store, &api, &insight_id).await {
                        Ok(session_id) => {
                            handled.insert(session_id.clone());
                            chat.activate(session_id).await?;
                        }
                        Err(e) => println!("! {e}"),
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    chat.shutdown().await;
    renderer.abort();
    Ok(())
}

async fn resolve_session(
    store: &mut SessionStore,
    api: &ReportApi,
    insight_id: &str,
) -> Result<String, StoreError> {
    store
        .session_for(insight_id, |insight_id| async move {
            api.create_session(&insight_id)
                .await
                .map(|session| session.session_id)
        })
        .await
}

async fn renew_session(
    store: &mut SessionStore,
    api: &ReportApi,
    insight_id: &str,
) -> Result<String, StoreError> {
    store
        .renew(insight_id, |insight_id| async move {
            api.create_session(&insight_id)
                .await
                .map(|session| session.session_id)
        })
        .await
}

/// The active session, when the backend rejected it and it has not been
/// replaced yet. A session created as a replacement is never replaced again.
fn needs_renewal<'a>(view: &'a ChatView, handled: &HashSet<String>) -> Option<&'a str> {
    if !view.session_expired {
        return None;
    }
    view.session_id
        .as_deref()
        .filter(|session_id| !handled.contains(*session_id))
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Empty,
    Quit,
    Retry,
    Switch(String),
    Message(String),
}

impl Input {
    fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Input::Empty;
        }
        if matches!(trimmed, "/quit" | "/exit") {
            return Input::Quit;
        }
        if trimmed == "/retry" {
            return Input::Retry;
        }
        if let Some(rest) = trimmed.strip_prefix("/switch ") {
            let insight_id = rest.trim();
            if !insight_id.is_empty() {
                return Input::Switch(insight_id.to_string());
            }
        }
        Input::Message(line.to_string())
    }
}

async fn render(chat: ChatHandle, mut views: watch::Receiver<ChatView>) {
    let mut transcript = Transcript::default();
    let mut stdout = std::io::stdout();

    loop {
        let view = views.borrow_and_update().clone();
        let shown_banner = match transcript.update(&view, &mut stdout) {
            Ok(shown) => shown,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to write transcript");
                return;
            }
        };
        if shown_banner {
            chat.dismiss_banner().await;
        }
        if views.changed().await.is_err() {
            return;
        }
    }
}

/// Incremental terminal rendering of successive views
#[derive(Default)]
struct Transcript {
    session_id: Option<String>,
    printed: HashSet<String>,
    /// Bytes of the in-progress agent message already written
    streamed: Option<usize>,
    latency_warning: bool,
    error: Option<String>,
    load_error: Option<String>,
}

impl Transcript {
    /// Write whatever changed since the last view. Returns true when a
    /// banner was shown.
    fn update(&mut self, view: &ChatView, out: &mut impl Write) -> std::io::Result<bool> {
        if view.session_id != self.session_id {
            if self.streamed.is_some() {
                writeln!(out)?;
            }
            *self = Transcript {
                session_id: view.session_id.clone(),
                ..Transcript::default()
            };
            if let Some(session_id) = &view.session_id {
                writeln!(out, "-- session {session_id} --")?;
            }
        }

        for message in &view.messages {
            if message.is_streaming() {
                let start = match self.streamed {
                    Some(start) => start,
                    None => {
                        write!(out, "agent: ")?;
                        0
                    }
                };
                write!(out, "{}", message.content.get(start..).unwrap_or_default())?;
                self.streamed = Some(message.content.len());
                continue;
            }
            if self.printed.contains(&message.id) {
                continue;
            }
            self.printed.insert(message.id.clone());

            match (message.sender, self.streamed.take()) {
                (Sender::Agent, Some(start)) => {
                    writeln!(out, "{}", message.content.get(start..).unwrap_or_default())?;
                }
                // Typed by the user, already on screen
                (Sender::User, None) if message.id.starts_with("temp-") => {}
                (sender, streamed) => {
                    if streamed.is_some() {
                        writeln!(out)?;
                    }
                    writeln!(out, "{}: {}", sender_label(sender), message.content)?;
                }
            }
        }

        if view.latency_warning && !self.latency_warning {
            writeln!(out, "(still working on it...)")?;
        }
        self.latency_warning = view.latency_warning;

        if view.load_error.is_some() && view.load_error != self.load_error {
            writeln!(out, "! {}", view.load_error.as_deref().unwrap_or_default())?;
        }
        self.load_error.clone_from(&view.load_error);

        let shown_banner = match &view.banner {
            Some(banner) => {
                writeln!(out, "! {banner}")?;
                true
            }
            None => false,
        };
        if !shown_banner && view.error.is_some() && view.error != self.error {
            writeln!(out, "! {}", view.error.as_deref().unwrap_or_default())?;
        }
        self.error.clone_from(&view.error);

        out.flush()?;
        Ok(shown_banner)
    }
}

fn sender_label(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "you",
        Sender::Agent => "agent",
        Sender::System => "system",
    }
}
