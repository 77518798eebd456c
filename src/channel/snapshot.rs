//! Point-in-time copy of every control on the mix surface.
//!
//! A [`ControlSnapshot`] is plain data: the surface builds a fresh one on
//! every change and hands it to the channel.  All levels share the
//! 0..=100 range of the faders and knobs that produce them.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};

use crate::common::box_error::BoxError;

/// A fader, knob or crossfader position.
pub type Level = u8;

pub const LEVEL_MAX: Level = 100;
/// Pads per deck.  Left deck pads are 0..8, right deck pads 8..16.
pub const PADS_PER_DECK: u8 = 8;
pub const PAD_COUNT: u8 = PADS_PER_DECK * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deck {
    Left,
    Right,
}

impl Deck {
    /// Index of the `slot`th pad of this deck, or None past the end of the bank.
    pub fn pad(&self, slot: u8) -> Option<u8> {
        if slot >= PADS_PER_DECK {
            return None;
        }
        match self {
            Deck::Left => Some(slot),
            Deck::Right => Some(slot + PADS_PER_DECK),
        }
    }
}

fn clamp(level: Level) -> Level {
    level.min(LEVEL_MAX)
}

// Producers send plain JSON numbers, so any number lands in 0..=100 rather
// than failing the whole snapshot.
fn level_from_number(raw: f64) -> Level {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, LEVEL_MAX as f64) as Level
}

fn wire_level<'de, D: Deserializer<'de>>(de: D) -> Result<Level, D::Error> {
    Ok(level_from_number(f64::deserialize(de)?))
}

fn wire_levels<'de, D: Deserializer<'de>>(de: D) -> Result<BTreeMap<String, Level>, D::Error> {
    let raw = BTreeMap::<String, f64>::deserialize(de)?;
    Ok(raw
        .into_iter()
        .map(|(name, level)| (name, level_from_number(level)))
        .collect())
}

fn wire_pads<'de, D: Deserializer<'de>>(de: D) -> Result<BTreeSet<u8>, D::Error> {
    let raw = Vec::<i64>::deserialize(de)?;
    Ok(raw
        .into_iter()
        .filter(|p| (0..PAD_COUNT as i64).contains(p))
        .map(|p| p as u8)
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlSnapshot {
    #[serde(deserialize_with = "wire_levels")]
    inputs: BTreeMap<String, Level>,
    #[serde(deserialize_with = "wire_level")]
    crossfader: Level,
    left_playing: bool,
    right_playing: bool,
    #[serde(deserialize_with = "wire_levels")]
    knobs: BTreeMap<String, Level>,
    #[serde(default, deserialize_with = "wire_pads")]
    active_pads: BTreeSet<u8>,
}

impl Default for ControlSnapshot {
    fn default() -> Self {
        ControlSnapshot {
            inputs: BTreeMap::new(),
            crossfader: LEVEL_MAX / 2,
            left_playing: false,
            right_playing: false,
            knobs: BTreeMap::new(),
            active_pads: BTreeSet::new(),
        }
    }
}

impl ControlSnapshot {
    pub fn new() -> ControlSnapshot {
        Self::default()
    }

    /// The surface as it looks when first powered on.
    pub fn initial_mix() -> ControlSnapshot {
        let inputs = [
            ("heartRate", 65),
            ("weather", 40),
            ("light", 70),
            ("timeOfDay", 50),
            ("mood", 60),
            ("taskFocus", 30),
            ("caffeine", 80),
            ("social", 20),
        ];
        let knobs = [
            ("eq1Hi", 60),
            ("eq1Mid", 50),
            ("eq1Low", 70),
            ("eq2Hi", 55),
            ("eq2Mid", 65),
            ("eq2Low", 45),
            ("filter1", 50),
            ("filter2", 50),
        ];
        let mut snap = ControlSnapshot::new()
            .with_crossfader(50)
            .with_left_playing(true)
            .with_right_playing(false)
            .with_pad(0)
            .with_pad(4);
        for (name, level) in inputs {
            snap = snap.with_input(name, level);
        }
        for (name, level) in knobs {
            snap = snap.with_knob(name, level);
        }
        snap
    }

    /// Parse a snapshot from its wire form.  Levels are rounded and clamped
    /// into 0..=100 and pads outside the two banks are dropped.
    pub fn from_wire(data: &str) -> Result<ControlSnapshot, BoxError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn with_input(mut self, name: &str, level: Level) -> Self {
        self.inputs.insert(name.to_string(), clamp(level));
        self
    }
    pub fn with_knob(mut self, name: &str, level: Level) -> Self {
        self.knobs.insert(name.to_string(), clamp(level));
        self
    }
    pub fn with_crossfader(mut self, level: Level) -> Self {
        self.crossfader = clamp(level);
        self
    }
    pub fn with_left_playing(mut self, playing: bool) -> Self {
        self.left_playing = playing;
        self
    }
    pub fn with_right_playing(mut self, playing: bool) -> Self {
        self.right_playing = playing;
        self
    }
    pub fn with_playing(self, deck: Deck, playing: bool) -> Self {
        match deck {
            Deck::Left => self.with_left_playing(playing),
            Deck::Right => self.with_right_playing(playing),
        }
    }
    /// Activate pad `index`.  Indices outside the two pad banks are ignored.
    pub fn with_pad(mut self, index: u8) -> Self {
        if index < PAD_COUNT {
            self.active_pads.insert(index);
        }
        self
    }
    pub fn without_pad(mut self, index: u8) -> Self {
        self.active_pads.remove(&index);
        self
    }
    pub fn toggle_pad(self, index: u8) -> Self {
        if self.active_pads.contains(&index) {
            self.without_pad(index)
        } else {
            self.with_pad(index)
        }
    }

    pub fn inputs(&self) -> &BTreeMap<String, Level> {
        &self.inputs
    }
    pub fn input(&self, name: &str) -> Option<Level> {
        self.inputs.get(name).copied()
    }
    pub fn knobs(&self) -> &BTreeMap<String, Level> {
        &self.knobs
    }
    pub fn knob(&self, name: &str) -> Option<Level> {
        self.knobs.get(name).copied()
    }
    pub fn crossfader(&self) -> Level {
        self.crossfader
    }
    pub fn left_playing(&self) -> bool {
        self.left_playing
    }
    pub fn right_playing(&self) -> bool {
        self.right_playing
    }
    pub fn active_pads(&self) -> &BTreeSet<u8> {
        &self.active_pads
    }
    pub fn is_pad_active(&self, index: u8) -> bool {
        self.active_pads.contains(&index)
    }

    /// Tempo shown on the decks, driven by the `heartRate` input (70..=160 BPM).
    pub fn bpm(&self) -> u32 {
        let heart_rate = self.input("heartRate").unwrap_or(0) as f64;
        (70.0 + heart_rate / LEVEL_MAX as f64 * 90.0).round() as u32
    }
}
