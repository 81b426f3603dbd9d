//! Tests for Router module

use super::*;
use crate::events::{self, EventReceiver};
use crate::input::{MemoryBackend, MidiInputBackend};
use crate::serial::mock::{MockConnector, MockWire};
use crate::session::SessionConfig;
use std::time::Duration;

async fn connected_router() -> (Arc<Router>, MockWire, EventReceiver) {
    let connector = MockConnector::with_port("COM3");
    let wire = connector.wire();
    let (tx, rx) = events::channel();
    let session = SessionHandle::spawn(connector, SessionConfig::default(), tx.clone());
    session.connect("COM3").await.unwrap();
    wire.clear_written();

    (Arc::new(Router::new(session, tx)), wire, rx)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

fn midi_events(rx: &mut EventReceiver) -> Vec<MidiEvent> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|e| match e {
            AppEvent::Midi(event) => Some(event),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_forwards_raw_bytes_when_connected() {
    let (router, wire, mut rx) = connected_router().await;

    router.on_midi_input(&[0x90, 60, 100]);
    router.on_midi_input(&[0xE0, 0x00, 0x40]);
    settle().await;

    assert_eq!(wire.written(), vec![0x90, 60, 100, 0xE0, 0x00, 0x40]);
    assert_eq!(
        midi_events(&mut rx),
        vec![
            MidiEvent::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100
            },
            MidiEvent::PitchBend {
                channel: 0,
                value: 8192
            },
        ]
    );
    assert_eq!(
        router.stats(),
        RouterStats {
            received: 2,
            forwarded: 2
        }
    );
}

#[tokio::test]
async fn test_forwarding_disabled_writes_nothing() {
    let (router, wire, mut rx) = connected_router().await;

    router.set_forwarding_enabled(false);
    assert!(!router.is_forwarding_enabled());
    router.on_midi_input(&[0xB0, 7, 127]);
    settle().await;

    assert!(wire.written().is_empty());
    // Listeners still see the event
    assert_eq!(
        midi_events(&mut rx),
        vec![MidiEvent::ControlChange {
            channel: 0,
            cc: 7,
            value: 127
        }]
    );
}

#[tokio::test]
async fn test_nothing_forwarded_while_disconnected() {
    let (router, wire, _rx) = connected_router().await;

    router.session.disconnect().await;
    router.on_midi_input(&[0x90, 60, 100]);
    settle().await;

    assert!(wire.written().is_empty());
    assert_eq!(router.stats().forwarded, 0);
}

#[tokio::test]
async fn test_undecodable_messages_are_still_forwarded() {
    let (router, wire, mut rx) = connected_router().await;

    // Channel aftertouch: not modelled, forwarded raw
    router.on_midi_input(&[0xD0, 0x40]);
    // Truncated note-on: no event, bytes go out unchanged
    router.on_midi_input(&[0x90, 60]);
    settle().await;

    assert!(midi_events(&mut rx).is_empty());
    assert_eq!(wire.written(), vec![0xD0, 0x40, 0x90, 60]);
}

#[tokio::test]
async fn test_input_backend_feeds_router() {
    let (router, wire, mut rx) = connected_router().await;

    let mut backend = MemoryBackend::new(vec!["Keys".to_string()], router.input_handler());
    let injector = backend.injector();
    backend.open_name("keys").unwrap();

    injector.send("Keys", &[0x91, 64, 0]);
    settle().await;

    assert_eq!(wire.written(), vec![0x91, 64, 0]);
    assert_eq!(
        midi_events(&mut rx),
        vec![MidiEvent::NoteOff {
            channel: 1,
            note: 64,
            velocity: 0
        }]
    );
}
