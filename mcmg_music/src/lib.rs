// Markov Chain Music Generator
//
// Learns the local statistics of existing melodies and samples new ones
// that reproduce them. Pitches and note values are modelled by two
// independent arbitrary-order Markov chains; the sampled notes are then
// re-encoded at an integer divisions-per-quarter resolution and packed into
// measures, with notes that cross a barline split into tied chains.
//
// Architecture:
// - markov.rs: Generic Markov chain (training, roulette sampling, explicit
//   sequence boundaries)
// - pitch.rs: Spelled pitches compared by sounding semitone
// - duration.rs: Note values <-> divisions, greedy tie decomposition,
//   resolution selection
// - measure.rs: Time signatures and the measure packer producing render
//   events with tie and barline flags
// - score.rs: Reader/writer seams, the JSON training format, `Piece`
// - midi.rs: MIDI file output from packed pieces
// - compose.rs: Training -> generation -> packing pipeline
// - config.rs: JSON-loadable generation settings
// - error.rs: Crate error type
//
// Randomness comes only from the `UniformSource` handed to generation (see
// `mcmg_prng`), so output is reproducible from a seed.

pub mod compose;
pub mod config;
pub mod duration;
pub mod error;
pub mod markov;
pub mod measure;
pub mod midi;
pub mod pitch;
pub mod score;

pub use error::{MusicError, Result};
