//! Channel lifecycle state machine
//!
//! Every connect, drop and reconnect decision is made here, synchronously,
//! so the whole backoff schedule can be stepped through in tests. The
//! manager only executes the returned [`LinkEffect`]s.
//!
//! Two counters tag asynchronous work:
//! - `generation` changes on every connect attempt and on close. Socket
//!   events and reconnect timers carry it; anything older is ignored.
//! - `epoch` changes on every caller `open`. Notices carry it so consumers can
//!   drop notices that belong to a previous session.

use super::backoff::ReconnectPolicy;
use super::frame::ServerEvent;
use serde::Serialize;
use std::time::Duration;

/// Transport state of the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Read model of the link for connection indicators
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TransportSnapshot {
    pub state: LinkState,
    pub attempt: u32,
    pub session_id: Option<String>,
    /// Reconnect ceiling reached; nothing further will be attempted
    pub gave_up: bool,
}

/// What the transport reports to its consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    Opened,
    Event(ServerEvent),
    Error(String),
    Closed { expected: bool },
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Terminal: the retry ceiling was hit
    ReconnectFailed,
}

/// Inputs to the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkInput {
    Open { session_id: String },
    Close,
    /// A caller-initiated teardown finished
    Released,
    Connected { generation: u64 },
    ConnectFailed { generation: u64, reason: String },
    Frame { generation: u64, text: String },
    Dropped { generation: u64, reason: Option<String> },
    ReconnectDue { generation: u64 },
}

/// Side effects requested by a link step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEffect {
    Connect { session_id: String, generation: u64 },
    /// Tear down the live socket and abort any connect attempt in flight
    Disconnect,
    ScheduleReconnect {
        generation: u64,
        attempt: u32,
        delay: Duration,
    },
    CancelReconnect,
    Notify(NoticeKind),
}

#[derive(Debug, Clone)]
pub struct Link {
    policy: ReconnectPolicy,
    state: LinkState,
    session_id: Option<String>,
    generation: u64,
    epoch: u64,
    attempt: u32,
    gave_up: bool,
}

impl Link {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: LinkState::Disconnected,
            session_id: None,
            generation: 0,
            epoch: 0,
            attempt: 0,
            gave_up: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            state: self.state,
            attempt: self.attempt,
            session_id: self.session_id.clone(),
            gave_up: self.gave_up,
        }
    }

    /// Apply one input and return the effects to execute, in order
    pub fn step(&mut self, input: LinkInput) -> Vec<LinkEffect> {
        match input {
            LinkInput::Open { session_id } => self.open(session_id),

            LinkInput::Close => self.close(),

            LinkInput::Released if self.state == LinkState::Closing => {
                self.state = LinkState::Disconnected;
                vec![LinkEffect::Notify(NoticeKind::Closed { expected: true })]
            }

            LinkInput::Connected { generation } if self.is_current(generation, LinkState::Connecting) => {
                self.state = LinkState::Open;
                self.attempt = 0;
                self.gave_up = false;
                vec![LinkEffect::Notify(NoticeKind::Opened)]
            }

            LinkInput::ConnectFailed { generation, reason }
                if self.is_current(generation, LinkState::Connecting) =>
            {
                let mut effects = vec![LinkEffect::Notify(NoticeKind::Error(reason))];
                effects.extend(self.schedule_reconnect());
                effects
            }

            LinkInput::Frame { generation, text } if self.is_current(generation, LinkState::Open) => {
                ServerEvent::parse(&text)
                    .map(|event| vec![LinkEffect::Notify(NoticeKind::Event(event))])
                    .unwrap_or_default()
            }

            LinkInput::Dropped { generation, reason } if self.is_current(generation, LinkState::Open) => {
                let mut effects = vec![LinkEffect::Disconnect];
                if let Some(reason) = reason {
                    effects.push(LinkEffect::Notify(NoticeKind::Error(reason)));
                }
                effects.push(LinkEffect::Notify(NoticeKind::Closed { expected: false }));
                effects.extend(self.schedule_reconnect());
                effects
            }

            LinkInput::ReconnectDue { generation }
                if self.is_current(generation, LinkState::Disconnected) && !self.gave_up =>
            {
                self.connect()
            }

            other => {
                tracing::trace!(input = ?other, state = ?self.state, "Ignoring stale link input");
                vec![]
            }
        }
    }

    fn is_current(&self, generation: u64, state: LinkState) -> bool {
        self.generation == generation && self.state == state
    }

    fn open(&mut self, session_id: String) -> Vec<LinkEffect> {
        if session_id.trim().is_empty() {
            tracing::warn!("Refusing to open a channel without a session id");
            return vec![];
        }

        // Already attached (or attaching) to this session
        if self.session_id.as_deref() == Some(session_id.as_str())
            && matches!(self.state, LinkState::Connecting | LinkState::Open)
        {
            return vec![];
        }

        let mut effects = Vec::new();
        if self.state != LinkState::Disconnected {
            effects.push(LinkEffect::Disconnect);
        }
        effects.push(LinkEffect::CancelReconnect);

        self.epoch += 1;
        self.session_id = Some(session_id);
        self.attempt = 0;
        self.gave_up = false;
        effects.extend(self.connect());
        effects
    }

    fn close(&mut self) -> Vec<LinkEffect> {
        self.session_id = None;
        match self.state {
            LinkState::Closing => vec![],
            LinkState::Disconnected => {
                // Invalidate any pending reconnect timer
                self.generation += 1;
                vec![LinkEffect::CancelReconnect]
            }
            LinkState::Connecting | LinkState::Open => {
                self.generation += 1;
                self.state = LinkState::Closing;
                vec![LinkEffect::CancelReconnect, LinkEffect::Disconnect]
            }
        }
    }

    fn connect(&mut self) -> Vec<LinkEffect> {
        let Some(session_id) = self.session_id.clone() else {
            return vec![];
        };
        self.generation += 1;
        self.state = LinkState::Connecting;
        vec![LinkEffect::Connect {
            session_id,
            generation: self.generation,
        }]
    }

    fn schedule_reconnect(&mut self) -> Vec<LinkEffect> {
        self.state = LinkState::Disconnected;
        let delay = self.policy.delay_for(self.attempt);
        self.attempt += 1;

        if self.attempt <= self.policy.max_attempts {
            vec![
                LinkEffect::ScheduleReconnect {
                    generation: self.generation,
                    attempt: self.attempt,
                    delay,
                },
                LinkEffect::Notify(NoticeKind::ReconnectScheduled {
                    attempt: self.attempt,
                    delay,
                }),
            ]
        } else {
            tracing::warn!(
                attempts = self.attempt - 1,
                "Reconnect ceiling reached, giving up"
            );
            self.gave_up = true;
            vec![LinkEffect::Notify(NoticeKind::ReconnectFailed)]
        }
    }
}
