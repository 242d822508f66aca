// Measure packing: turning (pitch, note value) pairs into render events.
//
// Notes are laid end to end into measures of a fixed capacity (in
// divisions). A note that does not fit in what is left of the current
// measure is split at the barline: the part that fits is decomposed into
// note values that close the measure, the leftover is decomposed too, and
// those leftover pieces are pushed back onto the work queue ahead of the
// next input note. A leftover piece can itself cross the following barline
// (a whole note in 2/4, a dotted whole anywhere) and is split again the same
// way.
//
// All pieces of one input note form a tie chain. Every piece except the
// last carries `tie_start`, every piece except the first carries `tie_end`,
// so a middle piece carries both. The packer keeps a running open-tie count
// (+1 per tie start, -1 per tie end) which must be back at zero once the
// input is exhausted.
//
// The output is a flat event list for a score writer (`midi.rs`, or any
// other `ScoreWriter`). Measure boundaries are marked on the first event of
// each measure. Every measure sums to the full capacity except the first
// when packing starts mid-measure, and the last, which may be partial.

use crate::duration::{DurationCodec, NoteValue};
use crate::error::{MusicError, Result};
use crate::pitch::Pitch;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Meter: `beats` per measure of `beat_unit` notes each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats: u32,
    pub beat_unit: u32,
}

impl TimeSignature {
    /// `beat_unit` must be a power of two no finer than a thirty-second.
    pub fn new(beats: u32, beat_unit: u32) -> Result<Self> {
        if beats == 0 || !beat_unit.is_power_of_two() || beat_unit > 32 {
            return Err(MusicError::InvalidTimeSignature { beats, beat_unit });
        }
        Ok(TimeSignature { beats, beat_unit })
    }

    pub fn common() -> Self {
        TimeSignature {
            beats: 4,
            beat_unit: 4,
        }
    }

    /// Measure capacity: `4 * divisions_per_quarter * beats / beat_unit`.
    pub fn measure_divisions(&self, codec: &DurationCodec) -> Result<u32> {
        let scaled = 4 * u64::from(codec.divisions_per_quarter()) * u64::from(self.beats);
        if scaled % u64::from(self.beat_unit) != 0 {
            return Err(MusicError::UnrepresentableDuration {
                what: format!("a {self} measure"),
                divisions_per_quarter: codec.divisions_per_quarter(),
            });
        }
        u32::try_from(scaled / u64::from(self.beat_unit)).map_err(|_| MusicError::InvalidTimeSignature {
            beats: self.beats,
            beat_unit: self.beat_unit,
        })
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats, self.beat_unit)
    }
}

/// One notated note, ready for a score writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderEvent {
    /// 1-based measure number.
    pub measure: u32,
    /// First event of its measure.
    pub measure_start: bool,
    pub pitch: Pitch,
    pub divisions: u32,
    pub value: NoteValue,
    /// More tied pieces of the same note follow.
    pub tie_start: bool,
    /// Continues a tie from the previous piece.
    pub tie_end: bool,
}

/// Running position while packing.
struct PackState {
    capacity: u32,
    measure: u32,
    remaining: u32,
    started: bool,
    open_ties: i64,
}

impl PackState {
    /// Space available to the next event. A full measure means the next
    /// event opens a fresh one.
    fn room(&self) -> u32 {
        if self.started && self.remaining == 0 {
            self.capacity
        } else {
            self.remaining
        }
    }

    fn emit(
        &mut self,
        pitch: Pitch,
        divisions: u32,
        value: NoteValue,
        tie_start: bool,
        tie_end: bool,
        out: &mut Vec<RenderEvent>,
    ) {
        let measure_start = if !self.started {
            self.started = true;
            self.remaining == self.capacity
        } else if self.remaining == 0 {
            self.measure += 1;
            self.remaining = self.capacity;
            true
        } else {
            false
        };
        self.remaining -= divisions;
        if tie_start {
            self.open_ties += 1;
        }
        if tie_end {
            self.open_ties -= 1;
        }
        out.push(RenderEvent {
            measure: self.measure,
            measure_start,
            pitch,
            divisions,
            value,
            tie_start,
            tie_end,
        });
    }
}

/// Packs notes into measures of one time signature at one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurePacker {
    time: TimeSignature,
    codec: DurationCodec,
    capacity: u32,
}

impl MeasurePacker {
    pub fn new(time: TimeSignature, codec: DurationCodec) -> Result<Self> {
        let capacity = time.measure_divisions(&codec)?;
        Ok(MeasurePacker {
            time,
            codec,
            capacity,
        })
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time
    }

    pub fn codec(&self) -> DurationCodec {
        self.codec
    }

    /// Measure capacity in divisions.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Pack notes starting on a barline.
    pub fn pack(&self, notes: &[(Pitch, NoteValue)]) -> Result<Vec<RenderEvent>> {
        self.pack_from(notes, 0)
    }

    /// Pack notes into a first measure that already holds `filled`
    /// divisions (a pickup, or a continuation of earlier material).
    pub fn pack_from(&self, notes: &[(Pitch, NoteValue)], filled: u32) -> Result<Vec<RenderEvent>> {
        if filled >= self.capacity {
            return Err(MusicError::OutOfRangeDivisions {
                divisions: filled,
                max: self.capacity - 1,
            });
        }

        let mut state = PackState {
            capacity: self.capacity,
            measure: 1,
            remaining: self.capacity - filled,
            started: false,
            open_ties: 0,
        };
        let mut events = Vec::with_capacity(notes.len());

        for &(pitch, value) in notes {
            let total = self.codec.divisions(value)?;
            let mut queue: VecDeque<(u32, NoteValue)> = VecDeque::from([(total, value)]);
            let mut first = true;

            while let Some((divisions, piece)) = queue.pop_front() {
                let room = state.room();
                if divisions <= room {
                    let tie_start = !queue.is_empty();
                    state.emit(pitch, divisions, piece, tie_start, !first, &mut events);
                    first = false;
                    continue;
                }

                debug!(
                    "measure {}: {pitch} {piece} split at barline ({room} + {} divisions)",
                    state.measure,
                    divisions - room
                );
                let head = self.pieces(room)?;
                let tail = self.pieces(divisions - room)?;
                for part in head.into_iter().chain(tail).rev() {
                    queue.push_front(part);
                }
            }
        }

        if state.open_ties != 0 {
            return Err(MusicError::ProtocolViolation(format!(
                "{} tie chains left open after packing",
                state.open_ties
            )));
        }
        debug!(
            "packed {} notes into {} events over {} measures of {}",
            notes.len(),
            events.len(),
            events.last().map_or(0, |e| e.measure),
            self.time
        );
        Ok(events)
    }

    /// Decompose a span into (divisions, value) pieces, longest first.
    fn pieces(&self, divisions: u32) -> Result<Vec<(u32, NoteValue)>> {
        let values = if divisions <= self.codec.max_divisions() {
            self.codec.decompose(divisions)?
        } else {
            self.codec.decompose_span(divisions)?
        };
        values
            .into_iter()
            .map(|v| Ok((self.codec.divisions(v)?, v)))
            .collect()
    }
}
