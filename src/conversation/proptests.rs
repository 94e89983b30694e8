//! Property-based tests for the conversation state machine
//!
//! Random event sequences must never break the log bound, the single-flight
//! rule or the streaming handle.

use super::message::{Message, Sender, MAX_LOG_ENTRIES};
use super::*;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> ConvContext {
    ConvContext::default()
}

/// Feed an event, keeping the old state when a submission is refused
fn step(state: &ConvState, event: Event) -> ConvState {
    match transition(state, &test_context(), event) {
        Ok(result) => result.new_state,
        Err(_) => state.clone(),
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_history() -> impl Strategy<Value = Vec<Message>> {
    proptest::collection::vec("[a-z ]{0,12}", 0..30).prop_map(|texts| {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, content)| Message {
                id: format!("h{i}"),
                sender: Sender::Agent,
                content,
                created_at: chrono::Utc::now(),
            })
            .collect()
    })
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        3 => "[a-z ]{0,10}".prop_map(|text| Event::Submit { text }),
        5 => "[a-z]{0,6}".prop_map(|content| Event::Chunk { content }),
        2 => proptest::option::of("[a-z0-9]{1,6}").prop_map(|message_id| Event::Done { message_id }),
        1 => (
            proptest::option::of(prop_oneof![
                Just("cost_limit".to_string()),
                Just("llm_unavailable".to_string()),
                "[a-z_]{1,8}",
            ]),
            proptest::option::of("[a-zA-Z ]{0,12}")
        )
            .prop_map(|(code, detail)| Event::ServerError { code, detail }),
        1 => "[a-z ]{1,10}".prop_map(|reason| Event::SendFailed { reason }),
        1 => (0u64..6).prop_map(|seq| Event::LatencyTimeout { seq }),
        1 => Just(Event::ChannelLost),
        1 => Just(Event::ChannelOpened),
        1 => Just(Event::ReconnectFailed),
        1 => Just(Event::DismissBanner),
        1 => Just(Event::Reset),
        1 => arb_history().prop_map(|messages| Event::HistoryLoaded { messages }),
    ]
}

fn arb_events() -> impl Strategy<Value = Vec<Event>> {
    proptest::collection::vec(arb_event(), 0..60)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// The log never exceeds its bound
    #[test]
    fn prop_log_bounded(events in arb_events()) {
        let mut state = ConvState::default();
        for event in events {
            state = step(&state, event);
            prop_assert!(state.log.len() <= MAX_LOG_ENTRIES);
        }
    }

    /// Only the newest entry may be streaming, and only while a reply is in flight
    #[test]
    fn prop_streaming_handle_consistent(events in arb_events()) {
        let mut state = ConvState::default();
        for event in events {
            state = step(&state, event);
            let streaming: Vec<_> = state
                .log
                .entries()
                .iter()
                .filter(|m| m.is_streaming())
                .collect();
            prop_assert!(streaming.len() <= 1);
            if let Some(handle) = state.log.streaming() {
                prop_assert_eq!(Some(handle), state.log.last());
                prop_assert_eq!(state.status, ConvStatus::Streaming);
            }
            if state.status == ConvStatus::Streaming {
                prop_assert!(state.log.streaming().is_some());
            }
        }
    }

    /// A timer is armed exactly while waiting for the first chunk
    #[test]
    fn prop_timer_armed_iff_sending(events in arb_events()) {
        let mut state = ConvState::default();
        for event in events {
            state = step(&state, event);
            prop_assert_eq!(state.armed_timer.is_some(), state.status == ConvStatus::Sending);
            if state.latency_warning {
                prop_assert_eq!(state.status, ConvStatus::Sending);
            }
        }
    }

    /// Busy conversations refuse new submissions without changing anything
    #[test]
    fn prop_busy_rejects_submit(events in arb_events(), text in "[a-z]{1,10}") {
        let mut state = ConvState::default();
        for event in events {
            state = step(&state, event);
        }
        let result = transition(&state, &test_context(), Event::Submit { text });
        if state.status.is_busy() {
            prop_assert_eq!(result.unwrap_err(), TransitionError::Busy);
        } else {
            prop_assert!(result.is_ok());
        }
    }

    /// Submit sequence numbers only grow
    #[test]
    fn prop_submit_seq_monotonic(events in arb_events()) {
        let mut state = ConvState::default();
        for event in events {
            let before = state.submit_seq;
            state = step(&state, event);
            prop_assert!(state.submit_seq >= before);
        }
    }

    /// A streamed reply becomes exactly one agent message holding every chunk
    /// in arrival order, with a usable id
    #[test]
    fn prop_chunks_then_done_yield_one_message(
        history in proptest::collection::vec("[a-z ]{0,12}", 0..10),
        chunks in proptest::collection::vec(".{0,8}", 1..12),
        message_id in proptest::option::of(prop_oneof![Just(String::new()), "[a-z0-9]{1,6}"]),
    ) {
        let history: Vec<Message> = history
            .into_iter()
            .enumerate()
            .map(|(i, content)| Message {
                id: format!("h{i}"),
                sender: Sender::User,
                content,
                created_at: chrono::Utc::now(),
            })
            .collect();
        let mut state = step(&ConvState::default(), Event::HistoryLoaded { messages: history });
        state = step(&state, Event::Submit { text: "question".to_string() });
        let before = state.log.len();

        for content in &chunks {
            state = step(&state, Event::Chunk { content: content.clone() });
        }
        state = step(&state, Event::Done { message_id: message_id.clone() });

        prop_assert_eq!(state.log.len(), before + 1);
        prop_assert_eq!(state.status, ConvStatus::Idle);
        let reply = state.log.last().unwrap();
        prop_assert_eq!(reply.sender, Sender::Agent);
        prop_assert_eq!(&reply.content, &chunks.concat());
        prop_assert!(!reply.id.is_empty());
        if let Some(id) = message_id.filter(|id| !id.is_empty()) {
            prop_assert_eq!(&reply.id, &id);
        }
    }

    /// Finished messages keep their content no matter what arrives later
    #[test]
    fn prop_finalized_messages_frozen(events in arb_events()) {
        let mut state = ConvState::default();
        for event in events {
            let frozen: Vec<Message> = state
                .log
                .entries()
                .iter()
                .filter(|m| !m.is_streaming())
                .cloned()
                .collect();
            let was_reset = matches!(event, Event::Reset | Event::HistoryLoaded { .. });
            state = step(&state, event);
            if was_reset {
                continue;
            }
            // Server ids may repeat, so any earlier message with the id counts
            for message in state.log.entries().iter().filter(|m| !m.id.is_empty()) {
                let mut same_id = frozen.iter().filter(|m| m.id == message.id).peekable();
                if same_id.peek().is_some() {
                    prop_assert!(same_id.any(|old| old.content == message.content));
                }
            }
        }
    }
}
