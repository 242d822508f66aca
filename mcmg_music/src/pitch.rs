// Pitch symbols for melodic training.
//
// A pitch is spelled as a step letter, an octave and a chromatic alteration,
// the same triple a notation `<pitch>` element carries. Identity, hashing and
// ordering all go through the absolute semitone number (MIDI numbering,
// C4 = 60), so enharmonic spellings such as C#4 and Db4 are the same symbol
// to the Markov chain. The spelling is kept only for display.
//
// Text form: step letter, accidentals (`#` per sharp, `b` per flat), octave,
// e.g. `C4`, `F#3`, `Bb2`, `Ebb5`, `A-1`.

use crate::error::{MusicError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Diatonic step letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Step {
    pub const ALL: [Step; 7] = [Step::C, Step::D, Step::E, Step::F, Step::G, Step::A, Step::B];

    /// Semitones above C within the octave.
    pub fn offset(self) -> i32 {
        match self {
            Step::C => 0,
            Step::D => 2,
            Step::E => 4,
            Step::F => 5,
            Step::G => 7,
            Step::A => 9,
            Step::B => 11,
        }
    }

    pub fn from_letter(c: char) -> Option<Step> {
        match c.to_ascii_uppercase() {
            'C' => Some(Step::C),
            'D' => Some(Step::D),
            'E' => Some(Step::E),
            'F' => Some(Step::F),
            'G' => Some(Step::G),
            'A' => Some(Step::A),
            'B' => Some(Step::B),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Step::C => 'C',
            Step::D => 'D',
            Step::E => 'E',
            Step::F => 'F',
            Step::G => 'G',
            Step::A => 'A',
            Step::B => 'B',
        }
    }
}

/// A spelled pitch. Compares by sounding semitone, not by spelling.
#[derive(Debug, Clone, Copy)]
pub struct Pitch {
    pub step: Step,
    pub octave: i8,
    /// Semitone offset from the natural step, usually -2..=2.
    pub alter: i8,
}

impl Pitch {
    pub fn new(step: Step, octave: i8, alter: i8) -> Self {
        Pitch { step, octave, alter }
    }

    /// Absolute semitone number: `(octave + 1) * 12 + step_offset + alter`.
    pub fn semitone(&self) -> i32 {
        (i32::from(self.octave) + 1) * 12 + self.step.offset() + i32::from(self.alter)
    }

    /// The MIDI key number, if the pitch falls inside 0..=127.
    pub fn midi_key(&self) -> Option<u8> {
        u8::try_from(self.semitone()).ok().filter(|k| *k <= 127)
    }
}

impl PartialEq for Pitch {
    fn eq(&self, other: &Self) -> bool {
        self.semitone() == other.semitone()
    }
}

impl Eq for Pitch {}

impl Hash for Pitch {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.semitone().hash(state);
    }
}

impl PartialOrd for Pitch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pitch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.semitone().cmp(&other.semitone())
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accidental = if self.alter >= 0 { '#' } else { 'b' };
        let marks: String = std::iter::repeat_n(accidental, self.alter.unsigned_abs() as usize).collect();
        write!(f, "{}{}{}", self.step.letter(), marks, self.octave)
    }
}

impl FromStr for Pitch {
    type Err = MusicError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || MusicError::InvalidPitch(s.to_string());
        let mut chars = s.trim().chars().peekable();
        let step = chars.next().and_then(Step::from_letter).ok_or_else(invalid)?;

        let mut alter: i8 = 0;
        while let Some(&c) = chars.peek() {
            match c {
                '#' => alter += 1,
                'b' => alter -= 1,
                _ => break,
            }
            chars.next();
            if alter.abs() > 2 {
                return Err(invalid());
            }
        }

        let octave: String = chars.collect();
        let octave = octave.parse::<i8>().map_err(|_| invalid())?;
        if !(-1..=9).contains(&octave) {
            return Err(invalid());
        }
        Ok(Pitch { step, octave, alter })
    }
}

impl Serialize for Pitch {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Pitch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
