// Error type shared by every module of the generator.
//
// All failures are deterministic given the same input, so nothing here is
// retried: the offending call aborts and hands the error back. No call ever
// substitutes a default pitch or note value.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MusicError {
    #[error("Markov chain degree must be at least 1, got {0}")]
    InvalidDegree(usize),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("no transitions recorded for context {0}")]
    UnknownContext(String),

    #[error("chain cannot produce any symbol; train it on a non-empty sequence")]
    EmptyModel,

    #[error("unsupported duration name: {0:?}")]
    UnsupportedDuration(String),

    #[error("{what} is not representable at {divisions_per_quarter} divisions per quarter")]
    UnrepresentableDuration {
        what: String,
        divisions_per_quarter: u32,
    },

    #[error("{divisions} divisions is outside the valid range 1..={max}")]
    OutOfRangeDivisions { divisions: u32, max: u32 },

    #[error("paired sequences differ in length: {pitches} pitches, {durations} durations")]
    LengthMismatch { pitches: usize, durations: usize },

    #[error("invalid pitch: {0:?}")]
    InvalidPitch(String),

    #[error("invalid time signature {beats}/{beat_unit}")]
    InvalidTimeSignature { beats: u32, beat_unit: u32 },

    #[error("invalid resolution: {0} divisions per quarter")]
    InvalidResolution(u32),

    #[error("score has no part {0:?}")]
    UnknownPart(String),

    #[error("MIDI encoding failed: {0}")]
    Midi(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MusicError>;
