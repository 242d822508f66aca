// Note values and their integer "divisions" encoding.
//
// Notation formats count time in divisions: a fixed number of integer units
// per quarter note. This module converts between named note values (whole
// through thirty-second, optionally dotted) and division counts at a given
// resolution, and breaks arbitrary division counts back into note values.
//
// Durations that match one note value come back as that single value. Any
// other count is decomposed greedily: take the largest representable value
// (plain or dotted) that still fits, subtract, repeat. The pieces are meant
// to be written as one tied chain, largest first, the same way LilyPond
// output decomposes held notes.
//
// Used by `measure.rs` to size notes and to split them at barlines, and by
// `compose.rs` to choose the coarsest resolution that represents every
// generated value.

use crate::error::{MusicError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Largest resolution accepted. Keeps every division count of a dotted
/// whole note well inside `u32`.
pub const MAX_DIVISIONS_PER_QUARTER: u32 = 1 << 16;

/// Named note value, longest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DurationName {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl DurationName {
    pub const ALL: [DurationName; 6] = [
        DurationName::Whole,
        DurationName::Half,
        DurationName::Quarter,
        DurationName::Eighth,
        DurationName::Sixteenth,
        DurationName::ThirtySecond,
    ];

    /// Length in quarter notes as `(numerator, denominator)`.
    pub fn quarters(self) -> (u32, u32) {
        match self {
            DurationName::Whole => (4, 1),
            DurationName::Half => (2, 1),
            DurationName::Quarter => (1, 1),
            DurationName::Eighth => (1, 2),
            DurationName::Sixteenth => (1, 4),
            DurationName::ThirtySecond => (1, 8),
        }
    }

    /// Whole-note-relative denominator (the "4" in quarter, "8" in eighth).
    pub fn denominator(self) -> u32 {
        match self {
            DurationName::Whole => 1,
            DurationName::Half => 2,
            DurationName::Quarter => 4,
            DurationName::Eighth => 8,
            DurationName::Sixteenth => 16,
            DurationName::ThirtySecond => 32,
        }
    }

    /// MusicXML `<type>` spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            DurationName::Whole => "whole",
            DurationName::Half => "half",
            DurationName::Quarter => "quarter",
            DurationName::Eighth => "eighth",
            DurationName::Sixteenth => "16th",
            DurationName::ThirtySecond => "32nd",
        }
    }
}

impl fmt::Display for DurationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DurationName {
    type Err = MusicError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whole" => Ok(DurationName::Whole),
            "half" => Ok(DurationName::Half),
            "quarter" => Ok(DurationName::Quarter),
            "eighth" => Ok(DurationName::Eighth),
            "16th" | "sixteenth" => Ok(DurationName::Sixteenth),
            "32nd" | "thirty-second" => Ok(DurationName::ThirtySecond),
            _ => Err(MusicError::UnsupportedDuration(s.to_string())),
        }
    }
}

/// A note value: name plus dot. This is the duration symbol the chain
/// learns. Text form is the name with a trailing `.` when dotted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NoteValue {
    pub name: DurationName,
    pub dotted: bool,
}

impl NoteValue {
    pub const fn plain(name: DurationName) -> Self {
        NoteValue { name, dotted: false }
    }

    pub const fn dotted(name: DurationName) -> Self {
        NoteValue { name, dotted: true }
    }
}

impl fmt::Display for NoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, if self.dotted { "." } else { "" })
    }
}

impl FromStr for NoteValue {
    type Err = MusicError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        match trimmed.strip_suffix('.') {
            Some(name) => Ok(NoteValue::dotted(name.parse()?)),
            None => Ok(NoteValue::plain(trimmed.parse()?)),
        }
    }
}

impl Serialize for NoteValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NoteValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Converts note values to and from divisions at a fixed resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationCodec {
    divisions_per_quarter: u32,
}

impl DurationCodec {
    pub fn new(divisions_per_quarter: u32) -> Result<Self> {
        if divisions_per_quarter == 0 || divisions_per_quarter > MAX_DIVISIONS_PER_QUARTER {
            return Err(MusicError::InvalidResolution(divisions_per_quarter));
        }
        Ok(DurationCodec {
            divisions_per_quarter,
        })
    }

    pub fn divisions_per_quarter(&self) -> u32 {
        self.divisions_per_quarter
    }

    /// Upper bound for [`decompose`](Self::decompose): one whole note.
    pub fn max_divisions(&self) -> u32 {
        4 * self.divisions_per_quarter
    }

    fn unrepresentable(&self, what: impl fmt::Display) -> MusicError {
        MusicError::UnrepresentableDuration {
            what: what.to_string(),
            divisions_per_quarter: self.divisions_per_quarter,
        }
    }

    /// Division count of a note value. Fails when the resolution cannot
    /// hold it exactly: the value is finer than the resolution, or it is
    /// dotted and its undotted count is odd.
    pub fn divisions(&self, value: NoteValue) -> Result<u32> {
        let (num, den) = value.name.quarters();
        if self.divisions_per_quarter % den != 0 {
            return Err(self.unrepresentable(value));
        }
        let base = self.divisions_per_quarter / den * num;
        if !value.dotted {
            return Ok(base);
        }
        if base % 2 != 0 {
            return Err(self.unrepresentable(value));
        }
        Ok(base * 3 / 2)
    }

    /// Every representable note value with its division count, longest
    /// first.
    pub fn units(&self) -> Vec<(u32, NoteValue)> {
        let mut units: Vec<(u32, NoteValue)> = DurationName::ALL
            .iter()
            .flat_map(|&name| [NoteValue::plain(name), NoteValue::dotted(name)])
            .filter_map(|value| self.divisions(value).ok().map(|d| (d, value)))
            .collect();
        units.sort_by(|a, b| b.0.cmp(&a.0));
        units
    }

    /// Break `divisions` (1..=one whole note) into note values to be tied
    /// together. A count matching a single value yields just that value.
    ///
    /// The walk is greedy, largest value first, and never backtracks. Where
    /// no value is one division long (R=16 from dotted thirty-seconds, or a
    /// resolution that is not a power of two) it can fail with
    /// `UnrepresentableDuration` on counts another split would cover: at
    /// R=16, 5 takes a sixteenth (4) and is left with 1, although 3 + 2
    /// would fit.
    pub fn decompose(&self, divisions: u32) -> Result<Vec<NoteValue>> {
        if divisions == 0 || divisions > self.max_divisions() {
            return Err(MusicError::OutOfRangeDivisions {
                divisions,
                max: self.max_divisions(),
            });
        }
        self.greedy(divisions)
    }

    /// Like [`decompose`](Self::decompose) without the whole-note ceiling,
    /// for spans longer than any single value (dotted wholes, held notes
    /// that cross several barlines).
    pub fn decompose_span(&self, divisions: u32) -> Result<Vec<NoteValue>> {
        if divisions == 0 {
            return Err(MusicError::OutOfRangeDivisions {
                divisions,
                max: u32::MAX,
            });
        }
        self.greedy(divisions)
    }

    fn greedy(&self, divisions: u32) -> Result<Vec<NoteValue>> {
        let units = self.units();
        if let Some(&(_, value)) = units.iter().find(|(d, _)| *d == divisions) {
            return Ok(vec![value]);
        }

        let mut pieces = Vec::new();
        let mut remainder = divisions;
        while remainder > 0 {
            // Resolutions that are not a power of two lack a 1-division
            // unit, so the tail may not be expressible.
            let &(d, value) = units
                .iter()
                .find(|(d, _)| *d <= remainder)
                .ok_or_else(|| self.unrepresentable(format!("{remainder} divisions")))?;
            pieces.push(value);
            remainder -= d;
        }
        Ok(pieces)
    }

    /// Smallest resolution at which every named value is exact:
    /// `max(denominator / 4, 1)` of the finest name. Empty input gives 1.
    pub fn resolution_for<I: IntoIterator<Item = DurationName>>(names: I) -> u32 {
        let finest = names
            .into_iter()
            .map(DurationName::denominator)
            .max()
            .unwrap_or(4);
        (finest / 4).max(1)
    }

    /// Smallest resolution at which every value, dots included, is exact.
    pub fn resolution_for_values<I: IntoIterator<Item = NoteValue>>(values: I) -> u32 {
        let values: Vec<NoteValue> = values.into_iter().collect();
        let resolution = Self::resolution_for(values.iter().map(|v| v.name));
        let codec = DurationCodec {
            divisions_per_quarter: resolution,
        };
        let odd_dotted = values
            .iter()
            .filter(|v| v.dotted)
            .any(|v| codec.divisions(NoteValue::plain(v.name)).is_ok_and(|d| d % 2 != 0));
        if odd_dotted { resolution * 2 } else { resolution }
    }
}

/// Division count of `name` (dotted or not) at `divisions_per_quarter`.
pub fn name_and_dots_to_divisions(
    name: DurationName,
    dotted: bool,
    divisions_per_quarter: u32,
) -> Result<u32> {
    DurationCodec::new(divisions_per_quarter)?.divisions(NoteValue { name, dotted })
}

/// Note values whose divisions sum to `divisions` at `divisions_per_quarter`.
pub fn divisions_to_decomposition(
    divisions: u32,
    divisions_per_quarter: u32,
) -> Result<Vec<NoteValue>> {
    DurationCodec::new(divisions_per_quarter)?.decompose(divisions)
}
