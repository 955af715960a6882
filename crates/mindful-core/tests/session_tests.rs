//! End-to-end session behaviour on a virtual clock

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mindful_core::{
    ChatClient, ChatConfig, ChatError, ChatView, ConnectionPolicy, EventKind, Identity,
    ManualScheduler, NoTriage, ResponderConfig, Role, SessionEvent, SessionStateKind,
    TriageLevel, UserId, MAX_AUDIT_ENTRIES,
};

mod test_utils;
use test_utils::{bodies, doctor, patient, RealLinkTransport, TestEnv};

fn quiet_config() -> ChatConfig {
    ChatConfig {
        responder: ResponderConfig::disabled(),
        ..ChatConfig::testing()
    }
}

// ----------------------------------------------------------------------------
// Sending
// ----------------------------------------------------------------------------

#[test]
fn test_send_then_drain_stores_exactly_one_unread_message() {
    let env = TestEnv::with_config(quiet_config());
    let session = env.connected(patient("p1"));

    let sent = session.send_message("d1", "hello doctor").unwrap();
    assert!(env.client.store().is_empty(), "delivery takes send latency");

    env.drain();
    let conversation = env.conversation("p1", "d1");
    assert_eq!(conversation.len(), 1);
    let stored = &conversation[0];
    assert_eq!(stored.id, sent.id);
    assert_eq!(stored.sender_id, UserId::new("p1"));
    assert_eq!(stored.receiver_id, UserId::new("d1"));
    assert_eq!(stored.body, "hello doctor");
    assert!(!stored.read);
    assert!(stored.id.to_string().starts_with("msg_"));
}

#[test]
fn test_conversation_is_symmetric() {
    let env = TestEnv::with_catalog(&["Go on."]);
    let session = env.connected(patient("p1"));
    session.send_message("d1", "first").unwrap();
    env.drain();
    session.send_message("d1", "second").unwrap();
    env.drain();

    let forward = env.conversation("p1", "d1");
    let backward = env.conversation("d1", "p1");
    assert_eq!(forward, backward);
    assert_eq!(bodies(&forward), vec!["first", "Go on.", "second", "Go on."]);
}

#[test]
fn test_empty_body_is_rejected_without_side_effects() {
    let env = TestEnv::with_config(quiet_config());
    let session = env.connected(patient("p1"));

    for body in ["", "   "] {
        let err = session.send_message("d1", body).unwrap_err();
        assert!(matches!(err, ChatError::InvalidMessage { .. }));
    }
    assert_eq!(session.pending_tasks(), 0);
    env.drain();
    assert!(env.client.store().is_empty());
}

#[test]
fn test_invalid_receivers_are_rejected() {
    let env = TestEnv::with_config(quiet_config());
    let session = env.connected(patient("p1"));

    assert!(matches!(
        session.send_message("", "hi"),
        Err(ChatError::InvalidMessage { .. })
    ));
    assert!(matches!(
        session.send_message("p1", "talking to myself"),
        Err(ChatError::InvalidMessage { .. })
    ));
}

#[test]
fn test_oversized_body_is_rejected() {
    let config = ChatConfig {
        max_body_chars: 5,
        ..quiet_config()
    };
    let env = TestEnv::with_config(config);
    let session = env.connected(patient("p1"));

    assert!(session.send_message("d1", "héllo").is_ok());
    assert!(matches!(
        session.send_message("d1", "hello!"),
        Err(ChatError::InvalidMessage { .. })
    ));
}

#[test]
fn test_send_requires_connected_session() {
    let env = TestEnv::with_config(quiet_config());
    let session = env.client.connect(Some(patient("p1"))).unwrap();

    match session.send_message("d1", "too early").unwrap_err() {
        ChatError::NotConnected { user_id, state } => {
            assert_eq!(user_id, UserId::new("p1"));
            assert_eq!(state, SessionStateKind::Connecting);
        }
        other => panic!("expected NotConnected, got {:?}", other),
    }

    env.advance_ms(500);
    session.disconnect();
    assert!(matches!(
        session.send_message("d1", "too late"),
        Err(ChatError::NotConnected {
            state: SessionStateKind::Disconnected,
            ..
        })
    ));
}

#[test]
fn test_message_timestamps_follow_the_clock() {
    let env = TestEnv::with_catalog(&["Tell me more."]);
    let session = env.connected(patient("p1"));

    let sent = session.send_message("d1", "hi").unwrap();
    assert_eq!(sent.timestamp.timestamp_millis(), 500);
    env.drain();

    let conversation = env.conversation("p1", "d1");
    assert_eq!(conversation[0].id, sent.id);
    // stamped on delivery at 1000, reply 5000ms later
    assert_eq!(conversation[0].timestamp.timestamp_millis(), 1_000);
    assert_eq!(conversation[1].timestamp.timestamp_millis(), 6_000);
    assert!(conversation[1].sequence > conversation[0].sequence);
}

#[test]
fn test_log_stays_chronological_when_send_overlaps_reply() {
    let env = TestEnv::with_catalog(&["Tell me more."]);
    let session = env.connected(patient("P1"));

    session.send_message("D1", "first").unwrap();
    // the reply to "first" is due at 6000, "second" arrives after it
    env.advance_ms(5_300);
    session.send_message("D1", "second").unwrap();
    env.drain();

    let conversation = env.conversation("P1", "D1");
    assert_eq!(
        bodies(&conversation),
        vec!["first", "Tell me more.", "second", "Tell me more."]
    );
    let stamps: Vec<i64> = conversation
        .iter()
        .map(|m| m.timestamp.timestamp_millis())
        .collect();
    assert_eq!(stamps, vec![1_000, 6_000, 6_300, 11_300]);
    assert!(conversation.windows(2).all(|w| w[0].sequence < w[1].sequence));
}

// ----------------------------------------------------------------------------
// Synthetic Replies
// ----------------------------------------------------------------------------

#[test]
fn test_scenario_patient_doctor_exchange() {
    let env = TestEnv::with_catalog(&["Tell me more."]);
    let session = env.connected(patient("P1"));

    session.send_message("D1", "I feel anxious").unwrap();
    env.advance_ms(500);
    assert_eq!(bodies(&env.conversation("P1", "D1")), vec!["I feel anxious"]);

    env.advance_ms(4_999);
    assert_eq!(env.conversation("P1", "D1").len(), 1);
    env.advance_ms(1);

    let conversation = env.conversation("P1", "D1");
    assert_eq!(bodies(&conversation), vec!["I feel anxious", "Tell me more."]);
    assert_eq!(conversation[1].sender_id, UserId::new("D1"));
    assert_eq!(conversation[1].receiver_id, UserId::new("P1"));
    assert_eq!(session.pending_tasks(), 0);
}

#[test]
fn test_no_synthetic_reply_when_counterpart_is_attached() {
    let env = TestEnv::with_catalog(&["Tell me more."]);
    let p1 = env.connected(patient("p1"));
    let d1 = env.connected(doctor("d1"));

    p1.send_message("d1", "are you there?").unwrap();
    env.drain();

    assert_eq!(env.client.store().len(), 1, "stored once for both sessions");
    assert_eq!(env.client.store().stats().duplicates_ignored, 1);
    let d1_view = ChatView::new(d1.clone());
    assert_eq!(bodies(&d1_view.conversation(&UserId::new("p1"))), vec!["are you there?"]);

    d1.send_message("p1", "yes").unwrap();
    env.drain();
    assert_eq!(
        bodies(&env.conversation("p1", "d1")),
        vec!["are you there?", "yes"]
    );
}

#[test]
fn test_no_synthetic_reply_over_real_transport() {
    let scheduler = ManualScheduler::new();
    let config = ChatConfig::testing();
    let client = ChatClient::builder()
        .with_transport(Rc::new(RealLinkTransport::new(&scheduler, &config)))
        .with_config(config)
        .with_scheduler(Rc::new(scheduler.clone()))
        .build()
        .unwrap();

    let session = client.connect(Some(patient("p1"))).unwrap();
    scheduler.run_until_idle();
    session.send_message("d1", "hello").unwrap();
    scheduler.run_until_idle();

    assert_eq!(client.store().len(), 1);
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn test_disconnect_cancels_pending_reply() {
    let env = TestEnv::with_catalog(&["Tell me more."]);
    let session = env.connected(patient("p1"));

    session.send_message("d1", "hello").unwrap();
    env.advance_ms(500);
    assert_eq!(session.pending_tasks(), 1, "reply is scheduled");

    assert!(session.disconnect());
    assert_eq!(session.pending_tasks(), 0);
    env.drain();
    assert_eq!(bodies(&env.conversation("p1", "d1")), vec!["hello"]);
}

// ----------------------------------------------------------------------------
// Lifecycle
// ----------------------------------------------------------------------------

#[test]
fn test_disconnect_right_after_send_drops_the_message() {
    let env = TestEnv::with_catalog(&["Tell me more."]);
    let session = env.connected(patient("p1"));

    session.send_message("d1", "never mind").unwrap();
    session.disconnect();

    assert_eq!(env.scheduler.pending(), 0);
    assert_eq!(env.drain(), 0);
    assert!(env.client.store().is_empty());
}

#[test]
fn test_disconnect_during_handshake_never_connects() {
    let env = TestEnv::with_config(quiet_config());
    let session = env.client.connect(Some(patient("p1"))).unwrap();
    assert_eq!(session.state_kind(), SessionStateKind::Connecting);

    session.disconnect();
    env.drain();
    assert_eq!(session.state_kind(), SessionStateKind::Disconnected);
    assert!(!session.is_connected());
}

#[test]
fn test_double_connect_reuses_the_session() {
    let env = TestEnv::with_config(quiet_config());
    let first = env.connected(patient("p1"));
    let second = env.client.connect(Some(patient("p1"))).unwrap();
    second.connect().unwrap();

    assert_eq!(first.listener_count(), 3);
    assert_eq!(env.client.bus().total_listeners(), 3);
    assert_eq!(env.client.live_sessions(), vec![UserId::new("p1")]);

    second.send_message("d1", "once").unwrap();
    env.drain();
    assert_eq!(env.client.store().len(), 1);
}

#[test]
fn test_reject_policy_refuses_second_live_session() {
    let config = ChatConfig {
        connection_policy: ConnectionPolicy::Reject,
        ..quiet_config()
    };
    let env = TestEnv::with_config(config);
    let session = env.connected(patient("p1"));

    match env.client.connect(Some(patient("p1"))) {
        Err(ChatError::DuplicateConnection { user_id }) => assert_eq!(user_id, UserId::new("p1")),
        other => panic!("expected DuplicateConnection, got {:?}", other),
    }

    // Once the first session is gone the identity may connect again
    session.disconnect();
    let again = env.client.connect(Some(patient("p1"))).unwrap();
    assert_eq!(again.state_kind(), SessionStateKind::Connecting);
}

#[test]
fn test_audit_trail_is_capped() {
    let env = TestEnv::with_config(quiet_config());
    let session = env.connected(patient("p1"));

    for i in 0..(MAX_AUDIT_ENTRIES + 200) {
        session.send_message("d1", format!("note {}", i)).unwrap();
    }
    env.drain();

    let trail = session.transitions();
    assert_eq!(trail.len(), MAX_AUDIT_ENTRIES);
    // the handshake entries are the oldest and went first
    assert!(trail.iter().all(|entry| entry.event == "MessageSent"));

    session.disconnect();
    let trail = session.transitions();
    assert_eq!(trail.len(), MAX_AUDIT_ENTRIES);
    assert_eq!(
        trail.last().map(|entry| entry.to_state),
        Some(SessionStateKind::Disconnected)
    );
}

#[test]
fn test_double_disconnect_is_quiet() {
    let env = TestEnv::with_config(quiet_config());
    let session = env.connected(patient("p1"));

    let announced = Rc::new(Cell::new(0));
    let counter = Rc::clone(&announced);
    env.client
        .bus()
        .on(EventKind::Disconnected, move |_| counter.set(counter.get() + 1));

    assert!(session.disconnect());
    assert!(!session.disconnect());
    assert_eq!(announced.get(), 1);

    let kinds: Vec<_> = session
        .transitions()
        .iter()
        .map(|entry| (entry.from_state, entry.to_state))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (SessionStateKind::Disconnected, SessionStateKind::Connecting),
            (SessionStateKind::Connecting, SessionStateKind::Connected),
            (SessionStateKind::Connected, SessionStateKind::Disconnected),
            (SessionStateKind::Disconnected, SessionStateKind::Disconnected),
        ]
    );
}

#[test]
fn test_listeners_released_on_disconnect() {
    let env = TestEnv::with_config(quiet_config());
    let session = env.connected(patient("p1"));
    let view = ChatView::new(session.clone());
    view.subscribe(|_| {}).unwrap();
    assert_eq!(env.client.bus().total_listeners(), 6);

    session.disconnect();
    assert_eq!(env.client.bus().total_listeners(), 0);
    assert_eq!(session.listener_count(), 0);
    assert!(matches!(
        view.subscribe(|_| {}),
        Err(ChatError::NotConnected { .. })
    ));
}

#[test]
fn test_dropping_every_handle_tears_down() {
    let env = TestEnv::with_catalog(&["Tell me more."]);
    let session = env.connected(patient("p1"));
    session.send_message("d1", "hello").unwrap();
    drop(session);

    assert_eq!(env.client.bus().total_listeners(), 0);
    assert_eq!(env.scheduler.pending(), 0);
    assert!(env.client.session(&UserId::new("p1")).is_none());
}

#[test]
fn test_reconnect_after_disconnect() {
    let env = TestEnv::with_config(quiet_config());
    let session = env.connected(patient("p1"));
    session.disconnect();

    let again = env.connected(patient("p1"));
    assert!(again.is_connected());
    assert!(session.is_connected(), "both handles share one session");
    again.send_message("d1", "back again").unwrap();
    env.drain();
    assert_eq!(env.client.store().len(), 1);
}

#[test]
fn test_transport_initiated_disconnect() {
    let env = TestEnv::with_config(quiet_config());
    let session = env.connected(patient("p1"));

    env.client.bus().emit(&SessionEvent::Disconnected {
        user_id: UserId::new("p1"),
    });

    assert_eq!(session.state_kind(), SessionStateKind::Disconnected);
    assert_eq!(env.client.bus().total_listeners(), 0);
}

#[test]
fn test_connect_requires_identity() {
    let env = TestEnv::with_config(quiet_config());
    assert!(matches!(env.client.connect(None), Err(ChatError::Unauthenticated)));
    assert!(matches!(
        env.client.connect(Some(Identity::patient("  ", "Nobody"))),
        Err(ChatError::Unauthenticated)
    ));
}

#[test]
fn test_builder_requires_scheduler() {
    let result = ChatClient::builder().with_config(ChatConfig::testing()).build();
    assert!(matches!(result, Err(ChatError::Configuration { .. })));
}

// ----------------------------------------------------------------------------
// Directory and Read Model
// ----------------------------------------------------------------------------

#[test]
fn test_patient_counterparts_are_available_doctors() {
    let config = ChatConfig {
        directory: vec![
            doctor("d1"),
            doctor("d2").with_availability(false),
        ],
        ..quiet_config()
    };
    let env = TestEnv::with_config(config);

    let ids: Vec<UserId> = env
        .client
        .list_counterparts(Role::Patient)
        .into_iter()
        .map(|identity| identity.id)
        .collect();
    assert_eq!(ids, vec![UserId::new("d1")]);

    let view = ChatView::new(env.connected(patient("p1")));
    assert_eq!(view.counterparts().len(), 1);
}

#[test]
fn test_seed_directory_hides_off_duty_doctor() {
    let env = TestEnv::with_config(quiet_config());
    let ids: Vec<String> = env
        .client
        .list_counterparts(Role::Patient)
        .into_iter()
        .map(|identity| identity.id.to_string())
        .collect();
    assert_eq!(ids, vec!["doctor_1", "doctor_2", "doctor_4"]);
}

#[test]
fn test_doctor_counterparts_include_store_senders() {
    let config = ChatConfig {
        directory: vec![patient("known")],
        ..quiet_config()
    };
    let env = TestEnv::with_config(config);
    let stranger = env.connected(patient("stranger_42"));
    let known = env.connected(patient("known"));
    let dr = env.connected(doctor("dr"));

    stranger.send_message("dr", "hello").unwrap();
    known.send_message("dr", "hi").unwrap();
    env.drain();

    let view = ChatView::new(dr);
    let counterparts = view.counterparts();
    let names: Vec<&str> = counterparts
        .iter()
        .map(|identity| identity.display_name.as_str())
        .collect();
    assert_eq!(names, vec!["Patient known", "Patient stran"]);
    assert!(counterparts.iter().all(|identity| identity.role == Role::Patient));

    let triaged = view.triage(&NoTriage);
    assert!(triaged.iter().all(|(_, level)| *level == TriageLevel::Routine));
}

#[test]
fn test_unread_tracking() {
    let env = TestEnv::with_catalog(&["Tell me more."]);
    let view = ChatView::new(env.connected(patient("p1")));
    let d1 = UserId::new("d1");

    view.session().send_message("d1", "one").unwrap();
    env.drain();
    view.session().send_message("d1", "two").unwrap();
    env.drain();

    assert_eq!(view.unread_from(&d1), 2);
    assert_eq!(view.mark_read(&d1), 2);
    assert_eq!(view.unread_from(&d1), 0);
}

#[test]
fn test_view_subscription_sees_own_events_only() {
    let env = TestEnv::with_config(quiet_config());
    let p1 = env.connected(patient("p1"));
    let p2 = env.connected(patient("p2"));
    let view = ChatView::new(p1.clone());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let watch = view
        .subscribe(move |event| sink.borrow_mut().push(event.clone()))
        .unwrap();
    let before = view.revision();

    p2.send_message("d1", "not for p1").unwrap();
    p1.send_message("d1", "for p1").unwrap();
    env.drain();

    let seen_bodies: Vec<String> = seen
        .borrow()
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Message(message) => Some(message.body.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(seen_bodies, vec!["for p1"]);
    assert!(view.revision() > before);

    assert!(view.unsubscribe(watch.clone()));
    assert!(!view.unsubscribe(watch));
    assert_eq!(p1.listener_count(), 3);
}

#[test]
fn test_revision_moves_on_connect_and_message() {
    let env = TestEnv::with_config(quiet_config());
    let session = env.client.connect(Some(patient("p1"))).unwrap();
    let view = ChatView::new(session.clone());
    let initial = view.revision();

    env.advance_ms(500);
    let connected = view.revision();
    assert!(connected > initial);
    assert!(view.is_connected());

    session.send_message("d1", "ping").unwrap();
    env.drain();
    assert!(view.revision() > connected);
}
