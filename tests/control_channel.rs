use std::{
    cell::RefCell,
    collections::VecDeque,
    io::Cursor,
    net::TcpListener,
    rc::Rc,
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use serde_json::json;

use fuzzymix::channel::{
    decoder::LastMessage,
    handle::PlayableHandle,
    transport::{Connector, Socket, TransportEvent},
};
use fuzzymix::common::box_error::BoxError;
use fuzzymix::{ChannelSettings, ConnectionStatus, ControlChannel, ControlSnapshot};

const DELAY: u128 = 3_000_000;

/// 100 frames of stereo silence at 48k.
static SILENCE_WAV: Lazy<Vec<u8>> = Lazy::new(|| {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 48_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buf = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec).unwrap();
        for _ in 0..200 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    buf
});

/// Shared view of every socket a [`FakeConnector`] handed out.
#[derive(Default)]
struct FakeNet {
    opened: usize,
    open_sockets: usize,
    sent: Vec<String>,
    // events for the socket opened most recently
    pending: VecDeque<TransportEvent>,
}

struct FakeSocket {
    net: Rc<RefCell<FakeNet>>,
    open: bool,
    released: bool,
}

impl Socket for FakeSocket {
    fn is_open(&self) -> bool {
        self.open
    }
    fn send_text(&mut self, text: String) -> Result<(), BoxError> {
        if !self.open {
            return Err("not open".into());
        }
        self.net.borrow_mut().sent.push(text);
        Ok(())
    }
    fn poll_event(&mut self) -> Option<TransportEvent> {
        if self.released {
            return None;
        }
        let ev = self.net.borrow_mut().pending.pop_front()?;
        match ev {
            TransportEvent::Opened => self.open = true,
            // an error alone leaves the socket held and open until it closes
            TransportEvent::Closed => self.open = false,
            TransportEvent::Error(_) | TransportEvent::Message(_) => {}
        }
        Some(ev)
    }
    fn close(&mut self) {
        self.open = false;
        if !self.released {
            self.released = true;
            self.net.borrow_mut().open_sockets -= 1;
        }
    }
}

struct FakeConnector(Rc<RefCell<FakeNet>>);

impl Connector for FakeConnector {
    fn open(&mut self, _url: &str) -> Box<dyn Socket> {
        {
            let mut net = self.0.borrow_mut();
            net.opened += 1;
            net.open_sockets += 1;
        }
        Box::new(FakeSocket {
            net: self.0.clone(),
            open: false,
            released: false,
        })
    }
}

fn channel() -> (ControlChannel, Rc<RefCell<FakeNet>>) {
    let net = Rc::new(RefCell::new(FakeNet::default()));
    let channel = ControlChannel::new(&ChannelSettings::default(), Box::new(FakeConnector(net.clone())));
    (channel, net)
}

fn feed(net: &Rc<RefCell<FakeNet>>, ev: TransportEvent) {
    net.borrow_mut().pending.push_back(ev);
}

fn frame(value: serde_json::Value) -> TransportEvent {
    TransportEvent::Message(value.to_string())
}

fn connected() -> (ControlChannel, Rc<RefCell<FakeNet>>) {
    let (mut channel, net) = channel();
    channel.start();
    feed(&net, TransportEvent::Opened);
    channel.pump(0);
    assert_eq!(channel.status(), ConnectionStatus::Connected);
    (channel, net)
}

fn scenario() -> ControlSnapshot {
    ControlSnapshot::new()
        .with_input("energy", 65)
        .with_crossfader(50)
        .with_left_playing(true)
        .with_right_playing(false)
        .with_knob("warmth", 50)
        .with_pad(0)
        .with_pad(4)
}

#[test]
fn status_follows_the_latest_transport_event() {
    let (mut channel, net) = channel();
    let watch = channel.subscribe();
    assert_eq!(channel.status(), ConnectionStatus::Disconnected);

    channel.start();
    let mut now = 0;
    let script = [
        (TransportEvent::Opened, ConnectionStatus::Connected),
        (TransportEvent::Error("reset".to_string()), ConnectionStatus::Error),
        (TransportEvent::Closed, ConnectionStatus::Disconnected),
    ];
    for cycle in 0..3 {
        for (event, expected) in script.iter() {
            feed(&net, event.clone());
            now += 1;
            channel.pump(now);
            assert_eq!(channel.status(), *expected, "cycle {} after {:?}", cycle, event);
        }
        now += DELAY;
        channel.pump(now);
        assert_eq!(channel.status(), ConnectionStatus::Connecting);
    }

    let seen: Vec<ConnectionStatus> = watch.try_iter().collect();
    for pair in seen.windows(2) {
        assert!(
            !(pair[0] == ConnectionStatus::Connected && pair[1] == ConnectionStatus::Connecting),
            "jumped from connected to connecting: {:?}",
            seen
        );
    }
    assert_eq!(seen.first(), Some(&ConnectionStatus::Connecting));
    assert_eq!(net.borrow().opened, 4);
    assert_eq!(net.borrow().open_sockets, 1);
}

#[test]
fn double_connect_keeps_one_socket() {
    let (mut channel, net) = connected();
    channel.start();
    channel.start();
    assert_eq!(net.borrow().opened, 1);
    assert_eq!(net.borrow().open_sockets, 1);
}

#[test]
fn teardown_after_reconnect_cycles_leaves_nothing_behind() {
    let (mut channel, net) = channel();
    channel.start();
    let mut now = 0;
    for _ in 0..5 {
        feed(&net, TransportEvent::Opened);
        feed(&net, TransportEvent::Closed);
        channel.pump(now);
        now += DELAY;
        channel.pump(now);
    }
    // one more failure so a reconnect is pending at teardown
    feed(&net, TransportEvent::Closed);
    channel.pump(now);
    assert!(channel.supervisor().has_pending_reconnect());

    channel.dispose();
    assert!(!channel.supervisor().has_pending_reconnect());
    assert!(!channel.supervisor().has_socket());
    assert_eq!(net.borrow().open_sockets, 0);

    let status = channel.status();
    channel.pump(now + DELAY * 10);
    assert_eq!(channel.status(), status);
    assert_eq!(net.borrow().opened, 6);
}

#[test]
fn dropping_the_channel_closes_the_socket() {
    let (channel, net) = connected();
    drop(channel);
    assert_eq!(net.borrow().open_sockets, 0);
}

#[test]
fn send_only_while_connected() {
    let (mut channel, net) = channel();
    assert!(!channel.send(&scenario()));
    channel.start();
    assert!(!channel.send(&scenario()));
    feed(&net, TransportEvent::Opened);
    channel.pump(0);
    assert!(channel.send(&scenario()));
    feed(&net, TransportEvent::Closed);
    channel.pump(1);
    assert!(!channel.send(&scenario()));
    assert_eq!(net.borrow().sent.len(), 1);
    assert_eq!(channel.sent_count(), 1);
}

#[test]
fn nothing_is_sent_after_an_error_while_the_socket_is_held() {
    let (mut channel, net) = connected();
    feed(&net, TransportEvent::Error("reset".to_string()));
    channel.pump(1);
    assert_eq!(channel.status(), ConnectionStatus::Error);
    assert!(channel.supervisor().has_socket());
    assert!(!channel.send(&scenario()));
    assert!(net.borrow().sent.is_empty());
    assert_eq!(channel.sent_count(), 0);

    // no close ever arrives, the timer still swaps the socket out
    channel.pump(1 + DELAY);
    assert_eq!(channel.status(), ConnectionStatus::Connecting);
    assert_eq!(net.borrow().opened, 2);
    assert_eq!(net.borrow().open_sockets, 1);
    assert!(!channel.send(&scenario()));
    assert!(net.borrow().sent.is_empty());
}

#[test]
fn sends_the_scenario_wire_message() {
    let (mut channel, net) = connected();
    assert!(channel.send(&scenario()));
    assert_eq!(
        net.borrow().sent[0],
        r#"{"type":"fuzzy_update","inputs":{"energy":65},"crossfader":50,"leftPlaying":true,"rightPlaying":false,"knobs":{"warmth":50},"activePads":[0,4]}"#
    );
}

#[test]
fn sent_fields_match_the_snapshot() {
    let (mut channel, net) = connected();
    let snap = ControlSnapshot::initial_mix().toggle_pad(9).with_right_playing(true);
    channel.send(&snap);
    let wire: serde_json::Value = serde_json::from_str(&net.borrow().sent[0]).unwrap();
    assert_eq!(wire["type"], "fuzzy_update");
    let back = ControlSnapshot::from_wire(&net.borrow().sent[0]).unwrap();
    assert_eq!(back, snap);
}

#[test]
fn audio_url_becomes_a_remote_handle() {
    let (mut channel, net) = connected();
    feed(&net, frame(json!({"audioUrl": "https://x/y.wav"})));
    channel.pump(1);
    match channel.playable() {
        Some(PlayableHandle::Remote(url)) => assert_eq!(url, "https://x/y.wav"),
        other => panic!("expected remote handle, got {:?}", other),
    }
    assert_eq!(channel.decoder().store().live_count(), 0);
}

#[test]
fn embedded_audio_becomes_a_local_handle_and_revokes_the_last() {
    let (mut channel, net) = connected();
    feed(&net, frame(json!({"audio_b64": BASE64.encode(&*SILENCE_WAV)})));
    channel.pump(1);
    let first = channel.playable().unwrap().as_local().unwrap().clone();
    assert_eq!(first.len(), SILENCE_WAV.len());
    assert_eq!(&first.bytes().unwrap()[..], &SILENCE_WAV[..]);
    assert_eq!(first.media_type(), "audio/wav");
    let spec = first.wav_spec().unwrap();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 48_000);

    feed(&net, frame(json!({"audio_b64": BASE64.encode([1u8, 2, 3, 4, 5])})));
    channel.pump(2);
    let second = channel.playable().unwrap().as_local().unwrap().clone();
    assert_eq!(second.len(), 5);
    assert!(first.is_revoked());
    assert_ne!(first.locator(), second.locator());
    assert_eq!(channel.decoder().store().live_count(), 1);
}

#[test]
fn both_fields_prefers_the_url() {
    let (mut channel, net) = connected();
    feed(
        &net,
        frame(json!({"audioUrl": "https://x/y.wav", "audio_b64": BASE64.encode([0u8; 8])})),
    );
    channel.pump(1);
    assert!(!channel.playable().unwrap().is_local());
    assert_eq!(channel.decoder().store().live_count(), 0);
}

#[test]
fn malformed_text_is_kept_and_ignored() {
    let (mut channel, net) = connected();
    feed(&net, frame(json!({"audioUrl": "https://x/y.wav"})));
    channel.pump(1);
    feed(&net, TransportEvent::Message("<<garbage>>".to_string()));
    channel.pump(2);
    assert_eq!(channel.status(), ConnectionStatus::Connected);
    assert_eq!(channel.last_message(), Some(&LastMessage::Text("<<garbage>>".to_string())));
    // the earlier handle is untouched
    assert_eq!(channel.playable().unwrap().locator(), "https://x/y.wav");

    let (mut fresh, net) = connected();
    feed(&net, TransportEvent::Message("not json".to_string()));
    fresh.pump(1);
    assert!(fresh.playable().is_none());
}

#[test]
fn unrecognized_json_is_retained() {
    let (mut channel, net) = connected();
    feed(&net, frame(json!({"status": "rendering", "progress": 0.5})));
    channel.pump(1);
    assert!(channel.playable().is_none());
    assert_eq!(
        channel.last_message(),
        Some(&LastMessage::Json(json!({"status": "rendering", "progress": 0.5})))
    );
}

#[test]
fn frames_are_handled_in_arrival_order() {
    let (mut channel, net) = connected();
    feed(&net, frame(json!({"audioUrl": "https://x/1.wav"})));
    feed(&net, frame(json!({"audioUrl": "https://x/2.wav"})));
    feed(&net, frame(json!({"note": "last"})));
    assert_eq!(channel.pump(1), 3);
    assert_eq!(channel.playable().unwrap().locator(), "https://x/2.wav");
    assert_eq!(channel.last_message(), Some(&LastMessage::Json(json!({"note": "last"}))));
}

#[test]
fn dispose_releases_local_audio() {
    let (mut channel, net) = connected();
    feed(&net, frame(json!({"audio_b64": BASE64.encode([9u8; 3])})));
    channel.pump(1);
    let local = channel.playable().unwrap().as_local().unwrap().clone();
    channel.dispose();
    assert!(local.is_revoked());
}

#[test]
fn end_to_end_over_a_real_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let reply = json!({"audio_b64": BASE64.encode(&*SILENCE_WAV)}).to_string();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut ws = tungstenite::accept(stream).unwrap();
        let update = ws.read_message().unwrap().into_text().unwrap();
        ws.write_message(tungstenite::Message::Text(reply)).unwrap();
        // wait for the client to hang up
        while ws.read_message().is_ok() {}
        update
    });

    let settings = ChannelSettings {
        ws_url: format!("ws://127.0.0.1:{}/ws", port),
        read_timeout_ms: 20,
        ..ChannelSettings::default()
    };
    let mut channel = ControlChannel::with_websocket(&settings);
    channel.start();
    for _ in 0..100 {
        channel.pump(0);
        if channel.status() == ConnectionStatus::Connected {
            break;
        }
    }
    assert_eq!(channel.status(), ConnectionStatus::Connected);
    assert!(channel.send(&scenario()));
    for _ in 0..200 {
        channel.pump(0);
        if channel.playable().is_some() {
            break;
        }
    }
    let local = channel.playable().unwrap().as_local().unwrap().clone();
    assert_eq!(local.len(), SILENCE_WAV.len());
    channel.dispose();
    assert!(local.is_revoked());

    let update: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
    assert_eq!(update["type"], "fuzzy_update");
    assert_eq!(update["activePads"], json!([0, 4]));
}

#[test]
fn send_returns_promptly_when_the_service_stops_reading() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let ws = tungstenite::accept(stream).unwrap();
        // keep the connection up but never read a frame
        let _ = done_rx.recv();
        drop(ws);
    });

    let settings = ChannelSettings {
        ws_url: format!("ws://127.0.0.1:{}/ws", port),
        read_timeout_ms: 20,
        write_timeout_ms: 10,
        ..ChannelSettings::default()
    };
    let mut channel = ControlChannel::with_websocket(&settings);
    channel.start();
    for _ in 0..100 {
        channel.pump(0);
        if channel.status() == ConnectionStatus::Connected {
            break;
        }
    }
    assert_eq!(channel.status(), ConnectionStatus::Connected);

    // a wide snapshot fills the socket buffers in a few hundred sends
    let snap = (0..2_000).fold(ControlSnapshot::initial_mix(), |snap, i| {
        snap.with_input(&format!("sensor_{:04}_with_a_long_descriptive_name", i), 50)
    });
    let mut dropped = 0;
    for _ in 0..5_000 {
        let started = Instant::now();
        if !channel.send(&snap) {
            dropped += 1;
        }
        assert!(started.elapsed() < Duration::from_secs(1), "send stalled");
        if dropped >= 3 {
            break;
        }
    }
    assert!(dropped >= 3, "socket buffers never filled");
    assert_eq!(channel.status(), ConnectionStatus::Connected);

    channel.dispose();
    done_tx.send(()).unwrap();
    server.join().unwrap();
}
