// Generation settings.
//
// Every knob of a generation run lives in `GeneratorConfig`, which can be
// loaded from a JSON file and then overridden from the command line. Missing
// fields take their defaults, so a config file only needs the values it
// changes.
//
// A run is reproducible when `seed` is set: the same config, training
// material and seed give the same piece.

use crate::error::Result;
use crate::measure::TimeSignature;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Degree of the pitch chain (previous pitches considered + 1).
    pub pitch_degree: usize,
    /// Degree of the note-value chain.
    pub duration_degree: usize,
    /// Number of notes to generate.
    pub length: usize,
    pub beats: u32,
    pub beat_unit: u32,
    /// Fixed resolution. `None` picks the smallest one that represents
    /// every trained note value and the measure length.
    pub divisions_per_quarter: Option<u32>,
    /// Random seed. `None` seeds from the clock.
    pub seed: Option<u64>,
    pub tempo_bpm: u16,
    /// General MIDI program for the output track.
    pub midi_program: u8,
    pub title: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            pitch_degree: 3,
            duration_degree: 2,
            length: 64,
            beats: 4,
            beat_unit: 4,
            divisions_per_quarter: None,
            seed: None,
            tempo_bpm: 100,
            midi_program: 0,
            title: "Markov melody".into(),
        }
    }
}

impl GeneratorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn time_signature(&self) -> Result<TimeSignature> {
        TimeSignature::new(self.beats, self.beat_unit)
    }
}
