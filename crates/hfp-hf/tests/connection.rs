//! Connection lifecycle through the public service API.

mod common;

use common::{FakeAg, Harness, AG_ALL_FEATURES, PHONE};
use hfp_hf::at::AG_FEATURE_VOICE_RECOGNITION;
use hfp_hf::{ConnectionState, HfError, Intent, Message, Notification, Role, Timestamp};
use proptest::prelude::*;

fn connection_states(notifications: &[Notification]) -> Vec<ConnectionState> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::ConnectionStateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

fn position(written: &[String], line: &str) -> usize {
    written
        .iter()
        .position(|l| l == line)
        .unwrap_or_else(|| panic!("{} not written: {:?}", line, written))
}

#[test]
fn test_outgoing_connection_establishes_slc() {
    let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES));
    h.connect();

    assert_eq!(h.service.connection_state(PHONE), ConnectionState::Connected);
    assert_eq!(h.actions(), vec!["discovery Initiator", "transport connect"]);

    let written = h.written();
    assert_eq!(
        &written[..9],
        &[
            "AT+BRSF=1023",
            "AT+BAC=1,2",
            "AT+CIND=?",
            "AT+CIND?",
            "AT+CMER=3,0,0,1",
            "AT+CHLD=?",
            "AT+BIND=1,2",
            "AT+BIND=?",
            "AT+BIND?",
        ]
    );
    assert_eq!(written[9], "AT+COPS=3,0");
    assert!(written[10].starts_with("AT+BIA="));
    assert_eq!(&written[11..], &["AT+CLIP=1", "AT+CCWA=1", "AT+CMEE=1", "AT+CLCC"]);

    let ctx = h.service.context(PHONE).unwrap();
    assert!(ctx.slc_established);
    assert_eq!(ctx.remote_features, AG_ALL_FEATURES);
    assert_eq!(ctx.role, Role::Initiator);
    assert_eq!(ctx.ag_indicators.len(), 7);

    let notifications = h.drain();
    assert_eq!(
        connection_states(&notifications),
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
    // Every command was answered, so no timer is left.
    assert_eq!(h.service.next_deadline(), None);
}

#[test]
fn test_connection_times_out_without_discovery() {
    let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES));
    h.deliver(Message::Connect(PHONE));
    assert_eq!(h.service.connection_state(PHONE), ConnectionState::Connecting);
    assert_eq!(h.service.next_deadline(), Some(Timestamp::from_secs(10)));

    h.service.advance_to(Timestamp::from_secs(9));
    assert_eq!(h.service.connection_state(PHONE), ConnectionState::Connecting);

    h.service.advance_to(Timestamp::from_secs(10));
    assert_eq!(h.service.connection_state(PHONE), ConnectionState::Disconnected);
    assert!(h.service.devices().is_empty());
    assert_eq!(h.actions().last().map(String::as_str), Some("transport disconnect"));
    assert_eq!(
        connection_states(&h.drain()),
        vec![ConnectionState::Connecting, ConnectionState::Disconnected]
    );
}

#[test]
fn test_transport_failure_returns_to_disconnected() {
    let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES));
    h.deliver(Message::Connect(PHONE));
    h.deliver(Message::DiscoveryComplete {
        address: PHONE,
        features: Some(0x3F),
    });
    h.deliver(Message::TransportConnectFailed(PHONE));

    assert!(h.service.devices().is_empty());
    assert_eq!(h.service.next_deadline(), None);
}

#[test]
fn test_inbound_connection() {
    let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES));
    h.deliver(Message::InboundConnect(PHONE));
    assert_eq!(h.actions(), vec!["transport accept", "discovery Acceptor"]);

    h.deliver(Message::DiscoveryComplete {
        address: PHONE,
        features: Some(0x3F),
    });
    h.deliver(Message::TransportConnected(PHONE));
    h.pump();

    assert_eq!(h.service.connection_state(PHONE), ConnectionState::Connected);
    let ctx = h.service.context(PHONE).unwrap();
    assert_eq!(ctx.role, Role::Acceptor);
    assert_eq!(ctx.sdp_features, Some(0x3F));
    assert!(!h.actions().iter().any(|a| a == "transport connect"));
}

#[test]
fn test_sdp_features_stand_in_when_brsf_fails() {
    let mut ag = FakeAg::new(AG_ALL_FEATURES);
    ag.rejected.push("AT+BRSF=".into());
    let mut h = Harness::new(ag);
    h.deliver(Message::Connect(PHONE));
    h.deliver(Message::DiscoveryComplete {
        address: PHONE,
        features: Some(0x01),
    });
    h.deliver(Message::TransportConnected(PHONE));
    h.pump();

    assert_eq!(h.service.connection_state(PHONE), ConnectionState::Connected);
    assert_eq!(h.service.context(PHONE).unwrap().remote_features, 0x01);
    let written = h.written();
    assert_eq!(
        &written[..5],
        &["AT+BRSF=1023", "AT+CIND=?", "AT+CIND?", "AT+CMER=3,0,0,1", "AT+CHLD=?"]
    );
    assert!(!written.iter().any(|l| l.starts_with("AT+BAC=") || l.starts_with("AT+BIND")));
}

#[test]
fn test_inbound_discovery_failure_closes_transport() {
    let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES));
    h.deliver(Message::InboundConnect(PHONE));
    h.deliver(Message::DiscoveryFailed(PHONE));

    assert_eq!(h.actions().last().map(String::as_str), Some("transport disconnect"));
    assert!(h.service.devices().is_empty());
}

#[test]
fn test_second_inbound_connection_is_refused() {
    let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES));
    h.deliver(Message::Connect(PHONE));
    h.deliver(Message::InboundConnect(PHONE));

    assert_eq!(h.actions().last().map(String::as_str), Some("transport reject"));
    assert_eq!(h.service.connection_state(PHONE), ConnectionState::Connecting);
}

#[test]
fn test_local_disconnect() {
    let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES));
    h.connect();
    h.drain();

    h.service.disconnect(PHONE).unwrap();
    assert_eq!(h.service.connection_state(PHONE), ConnectionState::Disconnecting);
    assert_eq!(h.actions().last().map(String::as_str), Some("transport disconnect"));

    h.deliver(Message::TransportDisconnected(PHONE));
    assert!(h.service.devices().is_empty());
    assert_eq!(
        connection_states(&h.drain()),
        vec![ConnectionState::Disconnecting, ConnectionState::Disconnected]
    );
}

#[test]
fn test_disconnect_timeout_returns_to_connected() {
    let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES));
    h.connect();
    h.drain();

    h.service.disconnect(PHONE).unwrap();
    assert_eq!(h.service.next_deadline(), Some(Timestamp::from_secs(10)));

    // The transport never reports the link as gone.
    h.service.advance_to(Timestamp::from_secs(10));
    assert_eq!(h.service.connection_state(PHONE), ConnectionState::Connected);
    assert_eq!(h.service.next_deadline(), None);
    assert_eq!(
        connection_states(&h.drain()),
        vec![ConnectionState::Disconnecting, ConnectionState::Connected]
    );
}

#[test]
fn test_intent_while_connecting_is_deferred_until_connected() {
    let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES));
    h.deliver(Message::Connect(PHONE));
    h.deliver(Message::DiscoveryComplete {
        address: PHONE,
        features: None,
    });
    h.deliver(Message::TransportConnected(PHONE));

    h.service.execute(PHONE, Intent::Dial("5551234".into())).unwrap();
    assert_eq!(h.service.session(PHONE).unwrap().deferred_len(), 1);
    assert!(!h.written().iter().any(|l| l.starts_with("ATD")));

    h.pump();
    let written = h.written();
    assert_eq!(written.iter().filter(|l| l.starts_with("ATD")).count(), 1);
    assert!(position(&written, "ATD5551234;") > position(&written, "AT+CMEE=1"));
    assert_eq!(h.service.session(PHONE).unwrap().deferred_len(), 0);
}

#[test]
fn test_disconnect_while_connecting_runs_after_slc() {
    let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES));
    h.deliver(Message::Connect(PHONE));
    h.deliver(Message::DiscoveryComplete {
        address: PHONE,
        features: None,
    });
    h.deliver(Message::TransportConnected(PHONE));
    h.service.disconnect(PHONE).unwrap();
    h.pump();

    assert_eq!(h.service.connection_state(PHONE), ConnectionState::Disconnecting);
    assert_eq!(
        connection_states(&h.drain()),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnecting
        ]
    );
}

#[test]
fn test_response_timeout_drops_connection() {
    let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES));
    h.connect();
    h.drain();

    h.ag.silent.push("AT+CLCC".into());
    h.service.execute(PHONE, Intent::QueryCurrentCalls).unwrap();
    h.pump();
    assert_eq!(h.service.next_deadline(), Some(Timestamp::from_secs(30)));

    h.service.advance_to(Timestamp::from_secs(30));
    assert_eq!(h.service.connection_state(PHONE), ConnectionState::Disconnecting);
    assert_eq!(h.actions().last().map(String::as_str), Some("transport disconnect"));
    // A timed out command is not reported as a failed command.
    assert!(!h
        .drain()
        .iter()
        .any(|n| matches!(n, Notification::CommandResult { .. })));

    h.deliver(Message::TransportDisconnected(PHONE));
    assert!(h.service.devices().is_empty());
}

#[test]
fn test_intent_for_unknown_device() {
    let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES));
    assert!(matches!(
        h.service.execute(PHONE, Intent::Answer),
        Err(HfError::UnknownDevice(addr)) if addr == PHONE
    ));

    h.deliver(Message::Intent {
        address: PHONE,
        intent: Intent::Answer,
    });
    assert!(matches!(
        h.drain().as_slice(),
        [Notification::IntentRejected { address, .. }] if *address == PHONE
    ));
    assert!(h.service.devices().is_empty());
}

#[test]
fn test_intent_needs_negotiated_feature() {
    let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES & !AG_FEATURE_VOICE_RECOGNITION));
    h.connect();
    let before = h.written().len();

    assert!(matches!(
        h.service.execute(PHONE, Intent::SetVoiceRecognition(true)),
        Err(HfError::Unsupported(_))
    ));
    assert_eq!(h.written().len(), before);
}

#[test]
fn test_invalid_intent_is_refused_up_front() {
    let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES));
    h.connect();
    assert!(matches!(
        h.service.execute(PHONE, Intent::Dial("555;ATH".into())),
        Err(HfError::InvalidArgument(_))
    ));
}

#[test]
fn test_remove_device_disconnects() {
    let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES));
    h.connect();
    h.deliver(Message::RemoveDevice(PHONE));

    assert!(h.service.devices().is_empty());
    assert_eq!(h.actions().last().map(String::as_str), Some("transport disconnect"));
    assert_eq!(h.service.next_deadline(), None);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Intents posted while the SLC is coming up all run, once each, in
    /// the order they were posted.
    #[test]
    fn prop_deferred_intents_replay_in_order(numbers in prop::collection::vec(1u32..100_000, 1..8)) {
        let mut h = Harness::new(FakeAg::new(AG_ALL_FEATURES));
        h.deliver(Message::Connect(PHONE));
        h.deliver(Message::DiscoveryComplete { address: PHONE, features: None });
        h.deliver(Message::TransportConnected(PHONE));

        for n in &numbers {
            h.deliver(Message::Intent { address: PHONE, intent: Intent::Dial(n.to_string()) });
        }
        prop_assert_eq!(h.service.session(PHONE).unwrap().deferred_len(), numbers.len());

        h.pump();
        let dialed: Vec<String> = h.written().into_iter().filter(|l| l.starts_with("ATD")).collect();
        let expected: Vec<String> = numbers.iter().map(|n| format!("ATD{};", n)).collect();
        prop_assert_eq!(dialed, expected);
        prop_assert_eq!(h.service.session(PHONE).unwrap().deferred_len(), 0);
    }
}
