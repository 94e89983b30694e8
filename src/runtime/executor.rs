//! Session runtime executor

use super::traits::{HistoryError, HistorySource};
use crate::conversation::{
    transition, ConvContext, ConvState, ConvStatus, Effect, Event, Message, TransitionError,
};
use crate::transport::{
    NoticeKind, TransportError, TransportHandle, TransportNotice, TransportSnapshot,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Everything a front end needs to render the chat
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatView {
    pub session_id: Option<String>,
    pub status: ConvStatus,
    pub messages: Vec<Message>,
    pub typing: bool,
    pub latency_warning: bool,
    pub error: Option<String>,
    pub banner: Option<String>,
    pub load_error: Option<String>,
    /// The backend rejected the session; the front end should start a new one
    pub session_expired: bool,
    pub connection: TransportSnapshot,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Chat runtime has stopped")]
    Stopped,
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error("Message could not be sent: {0}")]
    Transport(#[from] TransportError),
}

enum Command {
    Activate {
        session_id: String,
        reply: oneshot::Sender<()>,
    },
    Submit {
        text: String,
        reply: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Reconnect {
        reply: oneshot::Sender<bool>,
    },
    DismissBanner,
    Shutdown,
}

/// Continuations of work the runtime started, tagged so stale ones can be
/// recognised
enum Internal {
    History {
        generation: u64,
        result: Result<Vec<Message>, HistoryError>,
    },
    LatencyTimeout {
        seq: u64,
    },
}

/// Cloneable handle to a running [`ChatRuntime`]
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<ChatView>,
}

impl ChatHandle {
    /// Switch to `session_id`: reset the conversation, reopen the channel
    /// and fetch history. Resolves once the switch has been applied.
    ///
    /// Activating the session that is already active only reconnects it,
    /// and only when the transport has given up.
    pub async fn activate(&self, session_id: impl Into<String>) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Activate {
                session_id: session_id.into(),
                reply,
            })
            .await
            .map_err(|_| RuntimeError::Stopped)?;
        rx.await.map_err(|_| RuntimeError::Stopped)
    }

    pub async fn submit(&self, text: impl Into<String>) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Submit {
                text: text.into(),
                reply,
            })
            .await
            .map_err(|_| RuntimeError::Stopped)?;
        rx.await.map_err(|_| RuntimeError::Stopped)?
    }

    /// Start a fresh round of connection attempts for the active session
    /// after the transport gave up. Returns whether one was started.
    pub async fn reconnect(&self) -> Result<bool, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Reconnect { reply })
            .await
            .map_err(|_| RuntimeError::Stopped)?;
        rx.await.map_err(|_| RuntimeError::Stopped)
    }

    pub async fn dismiss_banner(&self) {
        let _ = self.commands.send(Command::DismissBanner).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    pub fn view(&self) -> ChatView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatView> {
        self.view.clone()
    }
}

pub struct ChatRuntime<H: HistorySource> {
    context: ConvContext,
    state: ConvState,
    history: Arc<H>,
    transport: TransportHandle,
    notices: mpsc::UnboundedReceiver<TransportNotice>,
    commands: mpsc::Receiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    view_tx: watch::Sender<ChatView>,
    session_id: Option<String>,
    /// Bumped on every activation; tags history fetches
    generation: u64,
    /// Transport epoch of the active session; notices from other epochs are dropped
    epoch: Option<u64>,
    latency_cancel: Option<CancellationToken>,
}

impl<H: HistorySource + 'static> ChatRuntime<H> {
    pub fn spawn(
        context: ConvContext,
        transport: TransportHandle,
        notices: mpsc::UnboundedReceiver<TransportNotice>,
        history: H,
    ) -> ChatHandle {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ChatView::default());

        let runtime = Self {
            context,
            state: ConvState::default(),
            history: Arc::new(history),
            transport,
            notices,
            commands: command_rx,
            internal_tx,
            internal_rx,
            view_tx,
            session_id: None,
            generation: 0,
            epoch: None,
            latency_cancel: None,
        };
        tokio::spawn(runtime.run());

        ChatHandle {
            commands: command_tx,
            view: view_rx,
        }
    }

    async fn run(mut self) {
        tracing::info!("Starting chat runtime");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(notice) = self.notices.recv() => self.handle_notice(notice).await,
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal).await,
            }
            self.publish();
        }

        if let Some(token) = self.latency_cancel.take() {
            token.cancel();
        }
        self.transport.close().await;
        tracing::info!("Chat runtime stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Activate { session_id, reply } => {
                self.activate(session_id).await;
                self.publish();
                let _ = reply.send(());
            }
            Command::Submit { text, reply } => {
                let result = self.dispatch(Event::Submit { text }).await;
                if let Err(e) = &result {
                    tracing::debug!(error = %e, "Submission not delivered");
                }
                self.publish();
                let _ = reply.send(result);
            }
            Command::Reconnect { reply } => {
                let started = self.reconnect().await;
                self.publish();
                let _ = reply.send(started);
            }
            Command::DismissBanner => {
                let _ = self.dispatch(Event::DismissBanner).await;
            }
            // Handled by the run loop
            Command::Shutdown => {}
        }
    }

    async fn activate(&mut self, session_id: String) {
        if session_id.trim().is_empty() {
            tracing::warn!("Ignoring activation with an empty session id");
            return;
        }
        if self.session_id.as_deref() == Some(session_id.as_str()) {
            if !self.reconnect().await {
                tracing::debug!(session_id = %session_id, "Session already active");
            }
            return;
        }

        tracing::info!(
            session_id = %session_id,
            previous = ?self.session_id,
            "Activating chat session"
        );
        let _ = self.dispatch(Event::Reset).await;
        self.generation += 1;
        self.session_id = Some(session_id.clone());
        self.epoch = self.transport.open(session_id.clone()).await;

        let generation = self.generation;
        let history = self.history.clone();
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = history.fetch_history(&session_id).await;
            let _ = internal_tx.send(Internal::History { generation, result });
        });
    }

    /// Reopen the active session's channel once the transport has given up
    async fn reconnect(&mut self) -> bool {
        let Some(session_id) = self.session_id.clone() else {
            return false;
        };
        if !self.transport.snapshot().gave_up {
            return false;
        }
        tracing::info!(session_id = %session_id, "Reconnecting chat session");
        self.epoch = self.transport.open(session_id).await;
        true
    }

    async fn handle_notice(&mut self, notice: TransportNotice) {
        if self.epoch != Some(notice.epoch) {
            tracing::trace!(epoch = notice.epoch, "Dropping notice from a previous session");
            return;
        }
        let event = match notice.kind {
            NoticeKind::Opened => Event::ChannelOpened,
            NoticeKind::Event(server_event) => server_event.into(),
            NoticeKind::Closed { expected: false } => Event::ChannelLost,
            NoticeKind::ReconnectFailed => Event::ReconnectFailed,
            NoticeKind::Error(message) => {
                tracing::warn!(error = %message, "Chat channel error");
                return;
            }
            NoticeKind::Closed { expected: true } | NoticeKind::ReconnectScheduled { .. } => {
                return;
            }
        };
        let _ = self.dispatch(event).await;
    }

    async fn handle_internal(&mut self, internal: Internal) {
        let event = match internal {
            Internal::History { generation, result } => {
                if generation != self.generation {
                    tracing::debug!(generation, "Dropping history for a previous session");
                    return;
                }
                match result {
                    Ok(messages) => Event::HistoryLoaded { messages },
                    Err(HistoryError::SessionNotFound) => {
                        tracing::warn!("Chat session no longer exists");
                        Event::ServerError {
                            code: Some("session_not_found".to_string()),
                            detail: None,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to load chat history");
                        Event::HistoryFailed {
                            message: format!("Failed to load messages: {e}"),
                        }
                    }
                }
            }
            Internal::LatencyTimeout { seq } => Event::LatencyTimeout { seq },
        };
        let _ = self.dispatch(event).await;
    }

    /// Run an event through the state machine and execute what it asks for.
    /// A failed send feeds `SendFailed` back in and is reported to the caller.
    async fn dispatch(&mut self, event: Event) -> Result<(), RuntimeError> {
        let mut queue = VecDeque::from([event]);
        let mut outcome = Ok(());

        while let Some(event) = queue.pop_front() {
            let result = transition(&self.state, &self.context, event)?;
            self.state = result.new_state;

            for effect in result.effects {
                if let Err(e) = self.execute_effect(effect).await {
                    queue.push_back(Event::SendFailed {
                        reason: e.to_string(),
                    });
                    outcome = Err(RuntimeError::Transport(e));
                }
            }
        }

        outcome
    }

    async fn execute_effect(&mut self, effect: Effect) -> Result<(), TransportError> {
        match effect {
            Effect::SendFrame { text } => self.transport.send(&text).await,
            Effect::ArmLatencyTimer { delay, seq } => {
                self.disarm_latency_timer();
                let token = CancellationToken::new();
                self.latency_cancel = Some(token.clone());
                let internal_tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        () = token.cancelled() => {}
                        () = tokio::time::sleep(delay) => {
                            let _ = internal_tx.send(Internal::LatencyTimeout { seq });
                        }
                    }
                });
                Ok(())
            }
            Effect::DisarmLatencyTimer => {
                self.disarm_latency_timer();
                Ok(())
            }
        }
    }

    fn disarm_latency_timer(&mut self) {
        if let Some(token) = self.latency_cancel.take() {
            token.cancel();
        }
    }

    fn publish(&self) {
        let view = ChatView {
            session_id: self.session_id.clone(),
            status: self.state.status,
            messages: self.state.log.entries().to_vec(),
            typing: self.state.is_typing(),
            latency_warning: self.state.latency_warning,
            error: self.state.error.clone(),
            banner: self.state.banner.clone(),
            load_error: self.state.load_error.clone(),
            session_expired: self.state.session_expired,
            connection: self.transport.snapshot(),
        };
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}
