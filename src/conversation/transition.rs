//! Pure state transition function
//!
//! Given the same state, context and event this always produces the same
//! outcome, apart from the ids synthesized for new messages. No I/O happens
//! here; the runtime executes the returned effects.

use super::message::{synthesize_message_id, Message};
use super::notice::{describe_server_error, ErrorCode, CONNECTION_LOST, RECONNECT_FAILED};
use super::{ConvContext, ConvState, ConvStatus, Effect, Event};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Reasons a submission is refused
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error("A reply is still in progress, wait for it to finish")]
    Busy,
}

pub fn transition(
    state: &ConvState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    let mut next = state.clone();

    match event {
        // ============================================================
        // User input
        // ============================================================
        Event::Submit { text } => {
            if text.trim().is_empty() {
                return Err(TransitionError::EmptyMessage);
            }
            if state.status.is_busy() {
                return Err(TransitionError::Busy);
            }

            next.log.push(Message::local_user(text.clone()));
            next.status = ConvStatus::Sending;
            next.latency_warning = false;
            next.error = None;
            next.banner = None;
            next.submit_seq += 1;
            next.armed_timer = Some(next.submit_seq);

            Ok(TransitionResult::new(next)
                .with_effect(Effect::SendFrame { text })
                .with_effect(Effect::ArmLatencyTimer {
                    delay: context.latency_grace,
                    seq: state.submit_seq + 1,
                }))
        }

        Event::DismissBanner => {
            next.banner = None;
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Session lifecycle
        // ============================================================
        Event::Reset => {
            let had_timer = state.armed_timer.is_some();
            let next = ConvState {
                submit_seq: state.submit_seq,
                ..ConvState::default()
            };
            let result = TransitionResult::new(next);
            Ok(if had_timer {
                result.with_effect(Effect::DisarmLatencyTimer)
            } else {
                result
            })
        }

        Event::HistoryLoaded { messages } => {
            next.log.load_history(messages);
            next.load_error = None;
            Ok(TransitionResult::new(next))
        }

        Event::HistoryFailed { message } => {
            next.load_error = Some(message);
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Streamed reply
        // ============================================================
        Event::Chunk { content } => {
            if !state.status.is_busy() {
                tracing::debug!("Ignoring chunk while idle");
                return Ok(TransitionResult::new(next));
            }
            next.log.append_chunk(&content);
            next.status = ConvStatus::Streaming;
            next.latency_warning = false;
            Ok(disarm(next))
        }

        Event::Done { message_id } => {
            if !state.status.is_busy() {
                tracing::debug!("Ignoring done while idle");
                return Ok(TransitionResult::new(next));
            }
            let id = message_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(synthesize_message_id);
            next.log.finalize_streaming(id);
            next.status = ConvStatus::Idle;
            next.latency_warning = false;
            Ok(disarm(next))
        }

        Event::ServerError { code, detail } => {
            if code.as_deref().and_then(ErrorCode::parse) == Some(ErrorCode::SessionNotFound) {
                next.session_expired = true;
            }
            let text = describe_server_error(code.as_deref(), detail.as_deref());
            next.error = Some(text.clone());
            next.banner = Some(text);
            if !state.status.is_busy() {
                return Ok(TransitionResult::new(next));
            }
            Ok(abandon_reply(next))
        }

        // ============================================================
        // Transport
        // ============================================================
        Event::SendFailed { reason } => {
            if state.status != ConvStatus::Sending {
                return Ok(TransitionResult::new(next));
            }
            next.error = Some(reason.clone());
            next.banner = Some(reason);
            Ok(abandon_reply(next))
        }

        Event::ChannelLost => {
            if !state.status.is_busy() {
                return Ok(TransitionResult::new(next));
            }
            next.banner = Some(CONNECTION_LOST.to_string());
            Ok(abandon_reply(next))
        }

        Event::ReconnectFailed => {
            next.error = Some(RECONNECT_FAILED.to_string());
            next.banner = Some(RECONNECT_FAILED.to_string());
            if !state.status.is_busy() {
                return Ok(TransitionResult::new(next));
            }
            Ok(abandon_reply(next))
        }

        Event::ChannelOpened => {
            if is_connection_notice(next.banner.as_deref()) {
                next.banner = None;
            }
            if is_connection_notice(next.error.as_deref()) {
                next.error = None;
            }
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Timers
        // ============================================================
        Event::LatencyTimeout { seq } => {
            if state.armed_timer == Some(seq) && state.status == ConvStatus::Sending {
                next.latency_warning = true;
            } else {
                tracing::trace!(seq, "Ignoring stale latency timer");
            }
            Ok(TransitionResult::new(next))
        }
    }
}

/// Give up on the in-flight reply: keep whatever text arrived as a closed
/// message and go back to idle
fn abandon_reply(mut next: ConvState) -> TransitionResult {
    next.log.finalize_streaming(synthesize_message_id());
    next.status = ConvStatus::Idle;
    next.latency_warning = false;
    disarm(next)
}

fn disarm(mut next: ConvState) -> TransitionResult {
    if next.armed_timer.take().is_some() {
        TransitionResult::new(next).with_effect(Effect::DisarmLatencyTimer)
    } else {
        TransitionResult::new(next)
    }
}

fn is_connection_notice(text: Option<&str>) -> bool {
    matches!(text, Some(t) if t == CONNECTION_LOST || t == RECONNECT_FAILED)
}
