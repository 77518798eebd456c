//! Turns frames from the render service into playable handles.
//!
//! The service answers with either `{"audioUrl": ...}` or
//! `{"audio_b64": ...}` (a base64 WAV).  Anything else is kept as the last
//! message for diagnostics and otherwise ignored.  Nothing in here returns an
//! error to the caller: a bad frame simply produces no handle.
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use log::{debug, trace, warn};
use serde_json::Value;

use crate::channel::handle::{AudioStore, PlayableHandle};

pub const AUDIO_URL_FIELD: &str = "audioUrl";
pub const AUDIO_B64_FIELD: &str = "audio_b64";

/// Standard alphabet, padding optional, stray trailing bits tolerated.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode an embedded payload the way a browser's `atob` would: ASCII
/// whitespace anywhere is skipped (line-wrapped output) and padding may be left off.
pub fn decode_payload(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    PAYLOAD_ENGINE.decode(compact)
}

/// Result of the structural parse of a raw frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedFrame {
    Structured(Value),
    Opaque(String),
}

pub fn parse_frame(raw: &str) -> ParsedFrame {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => ParsedFrame::Structured(value),
        Err(e) => {
            trace!("decoder::parse_frame - not json ({}): {}", e, raw);
            ParsedFrame::Opaque(raw.to_string())
        }
    }
}

/// The shape of a structured frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    ResourceUrl(String),
    EncodedAudio(String),
    Unrecognized,
}

fn non_empty_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value[field].as_str().filter(|s| !s.is_empty())
}

/// Classify a structured frame.  `audioUrl` wins when both fields are present.
pub fn classify(value: &Value) -> InboundFrame {
    if let Some(url) = non_empty_str(value, AUDIO_URL_FIELD) {
        return InboundFrame::ResourceUrl(url.to_string());
    }
    if let Some(encoded) = non_empty_str(value, AUDIO_B64_FIELD) {
        return InboundFrame::EncodedAudio(encoded.to_string());
    }
    InboundFrame::Unrecognized
}

/// Diagnostic copy of the most recent inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum LastMessage {
    Json(Value),
    Text(String),
}

impl From<ParsedFrame> for LastMessage {
    fn from(frame: ParsedFrame) -> Self {
        match frame {
            ParsedFrame::Structured(value) => LastMessage::Json(value),
            ParsedFrame::Opaque(raw) => LastMessage::Text(raw),
        }
    }
}

/// What one frame did.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub last_message: LastMessage,
    pub handle: Option<PlayableHandle>,
}

pub struct InboundDecoder {
    store: AudioStore,
}

impl Default for InboundDecoder {
    fn default() -> Self {
        InboundDecoder::new()
    }
}

impl InboundDecoder {
    pub fn new() -> InboundDecoder {
        InboundDecoder {
            store: AudioStore::new(),
        }
    }

    pub fn decode(&mut self, raw: &str) -> Decoded {
        let value = match parse_frame(raw) {
            ParsedFrame::Structured(value) => value,
            opaque => {
                return Decoded {
                    last_message: opaque.into(),
                    handle: None,
                }
            }
        };
        let handle = match classify(&value) {
            InboundFrame::ResourceUrl(url) => {
                debug!("decoder::decode - remote audio {}", url);
                // a remote handle supersedes any local buffer too
                self.store.revoke();
                Some(PlayableHandle::Remote(url))
            }
            InboundFrame::EncodedAudio(encoded) => match decode_payload(&encoded) {
                Ok(bytes) => Some(PlayableHandle::Local(self.store.publish(bytes))),
                Err(e) => {
                    warn!("decoder::decode - bad {} payload: {}", AUDIO_B64_FIELD, e);
                    None
                }
            },
            InboundFrame::Unrecognized => None,
        };
        Decoded {
            last_message: LastMessage::Json(value),
            handle,
        }
    }

    /// Release any locally held audio.
    pub fn release(&mut self) {
        self.store.revoke();
    }

    pub fn store(&self) -> &AudioStore {
        &self.store
    }
}
