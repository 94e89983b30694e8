//! Transport actor
//!
//! One task per manager owns the [`Link`] and the live socket. Commands from
//! [`TransportHandle`]s, connect results, inbound frames and reconnect timers
//! are all funnelled into that task and applied one at a time.

use super::frame::ClientFrame;
use super::link::{Link, LinkEffect, LinkInput, LinkState, NoticeKind, TransportSnapshot};
use super::{Connection, Connector, FrameSink, FrameSource, ReconnectPolicy, TransportError};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// A notice tagged with the epoch of the `open` call it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportNotice {
    pub epoch: u64,
    pub kind: NoticeKind,
}

enum Command {
    Open {
        session_id: String,
        reply: oneshot::Sender<Option<u64>>,
    },
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    Close,
}

enum IoEvent {
    Connected {
        generation: u64,
        connection: Connection,
    },
    Link(LinkInput),
}

/// Cloneable handle to a running [`TransportManager`]
#[derive(Clone)]
pub struct TransportHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<TransportSnapshot>,
}

impl TransportHandle {
    /// Attach to `session_id`, closing any previous channel first.
    ///
    /// Returns the epoch that notices for this session will carry, or `None`
    /// when the session id is empty or the transport has shut down.
    pub async fn open(&self, session_id: impl Into<String>) -> Option<u64> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Open {
                session_id: session_id.into(),
                reply,
            })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    /// Send `{"type":"message","content":raw_text}` over the open channel
    pub async fn send(&self, raw_text: &str) -> Result<(), TransportError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Send {
                text: raw_text.to_string(),
                reply,
            })
            .await
            .map_err(|_| TransportError::Shutdown)?;
        rx.await.map_err(|_| TransportError::Shutdown)?
    }

    /// Close the channel. Idempotent.
    pub async fn close(&self) {
        let _ = self.commands.send(Command::Close).await;
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransportSnapshot> {
        self.snapshot.clone()
    }
}

pub struct TransportManager<C: Connector> {
    connector: Arc<C>,
    link: Link,
    commands: mpsc::Receiver<Command>,
    io_tx: mpsc::UnboundedSender<IoEvent>,
    io_rx: mpsc::UnboundedReceiver<IoEvent>,
    notices: mpsc::UnboundedSender<TransportNotice>,
    snapshot: watch::Sender<TransportSnapshot>,
    sink: Option<Box<dyn FrameSink>>,
    /// Cancels the connect attempt in flight or the reader of the live socket
    channel_token: Option<CancellationToken>,
    reconnect_token: Option<CancellationToken>,
}

impl<C: Connector> TransportManager<C> {
    /// Start a manager task. It stops (closing its channel) once every
    /// handle has been dropped.
    pub fn spawn(
        connector: C,
        policy: ReconnectPolicy,
    ) -> (TransportHandle, mpsc::UnboundedReceiver<TransportNotice>) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (io_tx, io_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(TransportSnapshot::default());

        let manager = Self {
            connector: Arc::new(connector),
            link: Link::new(policy),
            commands: command_rx,
            io_tx,
            io_rx,
            notices: notice_tx,
            snapshot: snapshot_tx,
            sink: None,
            channel_token: None,
            reconnect_token: None,
        };
        tokio::spawn(manager.run());

        (
            TransportHandle {
                commands: command_tx,
                snapshot: snapshot_rx,
            },
            notice_rx,
        )
    }

    async fn run(mut self) {
        tracing::debug!("Transport manager started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = self.io_rx.recv() => self.handle_io(event),
            }
            self.snapshot.send_replace(self.link.snapshot());
        }

        let effects = self.link.step(LinkInput::Close);
        self.execute(effects);
        tracing::debug!("Transport manager stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open { session_id, reply } => {
                let accepted = !session_id.trim().is_empty();
                tracing::info!(session_id = %session_id, "Opening chat channel");
                let effects = self.link.step(LinkInput::Open { session_id });
                self.execute(effects);
                let _ = reply.send(accepted.then(|| self.link.epoch()));
            }
            Command::Send { text, reply } => {
                let result = self.send(text).await;
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "Outbound message rejected");
                }
                let _ = reply.send(result);
            }
            Command::Close => {
                let effects = self.link.step(LinkInput::Close);
                self.execute(effects);
            }
        }
    }

    async fn send(&mut self, content: String) -> Result<(), TransportError> {
        if self.link.state() != LinkState::Open {
            return Err(TransportError::NotOpen);
        }
        let sink = self.sink.as_mut().ok_or(TransportError::NotOpen)?;
        let frame = serde_json::to_string(&ClientFrame::Message { content })
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        sink.send_text(frame).await
    }

    fn handle_io(&mut self, event: IoEvent) {
        match event {
            IoEvent::Connected {
                generation,
                connection,
            } => {
                let effects = self.link.step(LinkInput::Connected { generation });
                if self.link.state() == LinkState::Open && self.link.generation() == generation {
                    self.attach(generation, connection);
                } else {
                    tracing::debug!(generation, "Discarding connection that is no longer wanted");
                    let Connection { mut sink, .. } = connection;
                    tokio::spawn(async move { sink.close().await });
                }
                self.execute(effects);
            }
            IoEvent::Link(input) => {
                let effects = self.link.step(input);
                self.execute(effects);
            }
        }
    }

    fn attach(&mut self, generation: u64, connection: Connection) {
        let Connection { sink, source } = connection;
        self.sink = Some(sink);
        let token = self.channel_token.get_or_insert_with(CancellationToken::new).clone();
        tokio::spawn(read_frames(source, generation, token, self.io_tx.clone()));
    }

    fn execute(&mut self, effects: Vec<LinkEffect>) {
        for effect in effects {
            match effect {
                LinkEffect::Connect {
                    session_id,
                    generation,
                } => self.connect(session_id, generation),

                LinkEffect::Disconnect => {
                    if let Some(token) = self.channel_token.take() {
                        token.cancel();
                    }
                    let sink = self.sink.take();
                    let io_tx = self.io_tx.clone();
                    tokio::spawn(async move {
                        if let Some(mut sink) = sink {
                            sink.close().await;
                        }
                        let _ = io_tx.send(IoEvent::Link(LinkInput::Released));
                    });
                }

                LinkEffect::ScheduleReconnect {
                    generation,
                    attempt,
                    delay,
                } => {
                    tracing::info!(attempt, delay_ms = %delay.as_millis(), "Scheduling reconnect");
                    let token = CancellationToken::new();
                    if let Some(previous) = self.reconnect_token.replace(token.clone()) {
                        previous.cancel();
                    }
                    let io_tx = self.io_tx.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            () = token.cancelled() => {}
                            () = tokio::time::sleep(delay) => {
                                let _ = io_tx.send(IoEvent::Link(LinkInput::ReconnectDue { generation }));
                            }
                        }
                    });
                }

                LinkEffect::CancelReconnect => {
                    if let Some(token) = self.reconnect_token.take() {
                        token.cancel();
                    }
                }

                LinkEffect::Notify(kind) => {
                    match &kind {
                        NoticeKind::Opened => tracing::info!("Chat channel open"),
                        NoticeKind::Error(message) => tracing::warn!(error = %message, "Chat channel error"),
                        NoticeKind::Closed { expected } => {
                            tracing::info!(expected, "Chat channel closed");
                        }
                        NoticeKind::ReconnectFailed => {
                            tracing::error!("Chat channel reconnection failed");
                        }
                        NoticeKind::Event(_) | NoticeKind::ReconnectScheduled { .. } => {}
                    }
                    // Consumers reading the snapshot on a notice must see the state it reports
                    self.snapshot.send_replace(self.link.snapshot());
                    let _ = self.notices.send(TransportNotice {
                        epoch: self.link.epoch(),
                        kind,
                    });
                }
            }
        }
    }

    fn connect(&mut self, session_id: String, generation: u64) {
        let token = CancellationToken::new();
        if let Some(previous) = self.channel_token.replace(token.clone()) {
            previous.cancel();
        }
        let connector = Arc::clone(&self.connector);
        let io_tx = self.io_tx.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                () = token.cancelled() => return,
                result = connector.connect(&session_id) => result,
            };
            let event = match result {
                Ok(connection) => IoEvent::Connected {
                    generation,
                    connection,
                },
                Err(e) => IoEvent::Link(LinkInput::ConnectFailed {
                    generation,
                    reason: e.to_string(),
                }),
            };
            let _ = io_tx.send(event);
        });
    }
}

async fn read_frames(
    mut source: Box<dyn FrameSource>,
    generation: u64,
    token: CancellationToken,
    io_tx: mpsc::UnboundedSender<IoEvent>,
) {
    loop {
        let next = tokio::select! {
            () = token.cancelled() => return,
            next = source.next_frame() => next,
        };
        let input = match next {
            Some(Ok(text)) => LinkInput::Frame { generation, text },
            Some(Err(e)) => LinkInput::Dropped {
                generation,
                reason: Some(e.to_string()),
            },
            None => LinkInput::Dropped {
                generation,
                reason: None,
            },
        };
        let dropped = matches!(input, LinkInput::Dropped { .. });
        if io_tx.send(IoEvent::Link(input)).is_err() || dropped {
            return;
        }
    }
}
