// Boundaries to the outside world: where training material comes from and
// where packed output goes.
//
// A `ScoreReader` yields, per part, a pitch sequence and a parallel
// note-value sequence of the same length. A `ScoreWriter` consumes a
// finished `Piece` (time signature, resolution and the packer's render
// events) and persists it in some notation or playback format.
//
// `JsonScore` is the reader shipped with the generator: a small serde
// document holding the two parallel arrays per part, the shape a notation
// importer would hand over after walking `<note>` elements. Pitches use
// the `Pitch` text form, durations the `NoteValue` text form:
//
//   { "parts": [ { "id": "P1", "name": "Flute",
//                  "pitches": ["E5", "D5", "C5"],
//                  "durations": ["quarter", "eighth.", "16th"] } ] }
//
// The MIDI writer lives in `midi.rs`.

use crate::duration::NoteValue;
use crate::error::{MusicError, Result};
use crate::measure::{RenderEvent, TimeSignature};
use crate::pitch::Pitch;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Paired pitch and note-value sequences of one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartSequences {
    pitches: Vec<Pitch>,
    durations: Vec<NoteValue>,
}

impl PartSequences {
    pub fn new(pitches: Vec<Pitch>, durations: Vec<NoteValue>) -> Result<Self> {
        if pitches.len() != durations.len() {
            return Err(MusicError::LengthMismatch {
                pitches: pitches.len(),
                durations: durations.len(),
            });
        }
        Ok(PartSequences { pitches, durations })
    }

    pub fn pitches(&self) -> &[Pitch] {
        &self.pitches
    }

    pub fn durations(&self) -> &[NoteValue] {
        &self.durations
    }

    pub fn len(&self) -> usize {
        self.pitches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pitches.is_empty()
    }

    /// The part as (pitch, value) notes.
    pub fn notes(&self) -> impl Iterator<Item = (Pitch, NoteValue)> + '_ {
        self.pitches.iter().copied().zip(self.durations.iter().copied())
    }
}

/// Source of training material.
pub trait ScoreReader {
    /// Identifiers of the parts this source can read, in document order.
    fn part_ids(&self) -> Vec<String>;

    fn read_part(&self, part_id: &str) -> Result<PartSequences>;
}

/// A generated, measure-packed piece ready for output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub title: String,
    pub time: TimeSignature,
    pub divisions_per_quarter: u32,
    pub tempo_bpm: u16,
    pub events: Vec<RenderEvent>,
}

impl Piece {
    /// Number of measures touched by the events.
    pub fn measures(&self) -> u32 {
        self.events.last().map_or(0, |e| e.measure)
    }
}

/// Sink for generated pieces.
pub trait ScoreWriter {
    fn write_piece(&mut self, piece: &Piece) -> Result<()>;
}

/// One part of a [`JsonScore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPart {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub pitches: Vec<Pitch>,
    pub durations: Vec<NoteValue>,
}

/// Training material stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonScore {
    pub parts: Vec<JsonPart>,
}

impl JsonScore {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

impl ScoreReader for JsonScore {
    fn part_ids(&self) -> Vec<String> {
        self.parts.iter().map(|p| p.id.clone()).collect()
    }

    fn read_part(&self, part_id: &str) -> Result<PartSequences> {
        let part = self
            .parts
            .iter()
            .find(|p| p.id == part_id)
            .ok_or_else(|| MusicError::UnknownPart(part_id.to_string()))?;
        PartSequences::new(part.pitches.clone(), part.durations.clone())
    }
}
