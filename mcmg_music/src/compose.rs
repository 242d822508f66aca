// The generation pipeline: training -> sampling -> resolution -> packing.
//
// Two independent chains are trained on the same parts: one over pitches,
// one over note values. Generation draws the same number of symbols from
// each and zips them into notes. The resolution is chosen from the trained
// note values (every generated value was seen in training, so this covers
// the output too) and doubled until the measure length is a whole number of
// divisions. The notes are then packed into measures.
//
// Both chains share one `UniformSource`, pitches first, so a seed fixes the
// whole piece.

use crate::config::GeneratorConfig;
use crate::duration::{DurationCodec, NoteValue};
use crate::error::{MusicError, Result};
use crate::markov::MarkovChain;
use crate::measure::{MeasurePacker, TimeSignature};
use crate::pitch::Pitch;
use crate::score::{PartSequences, Piece};
use log::{debug, info};
use mcmg_prng::UniformSource;
use std::collections::BTreeSet;

/// Trained pitch and note-value chains.
#[derive(Debug, Clone)]
pub struct Composer {
    pitches: MarkovChain<Pitch>,
    durations: MarkovChain<NoteValue>,
    trained_values: BTreeSet<NoteValue>,
    notes_seen: usize,
}

impl Composer {
    pub fn new(pitch_degree: usize, duration_degree: usize) -> Result<Self> {
        Ok(Composer {
            pitches: MarkovChain::new(pitch_degree)?,
            durations: MarkovChain::new(duration_degree)?,
            trained_values: BTreeSet::new(),
            notes_seen: 0,
        })
    }

    /// Train both chains on one part. Each part is its own sequence.
    pub fn train(&mut self, part: &PartSequences) -> Result<()> {
        self.pitches.train(part.pitches().iter().copied())?;
        self.durations.train(part.durations().iter().copied())?;
        self.trained_values.extend(part.durations().iter().copied());
        self.notes_seen += part.len();
        Ok(())
    }

    pub fn pitch_chain(&self) -> &MarkovChain<Pitch> {
        &self.pitches
    }

    pub fn duration_chain(&self) -> &MarkovChain<NoteValue> {
        &self.durations
    }

    /// Smallest resolution holding every trained value and a whole measure.
    pub fn resolution_for(&self, time: TimeSignature) -> Result<u32> {
        let mut resolution = DurationCodec::resolution_for_values(self.trained_values.iter().copied());
        while (4 * u64::from(resolution) * u64::from(time.beats)) % u64::from(time.beat_unit) != 0 {
            resolution = resolution
                .checked_mul(2)
                .ok_or(MusicError::InvalidResolution(resolution))?;
        }
        Ok(resolution)
    }

    /// Generate and pack one piece.
    pub fn compose(&mut self, config: &GeneratorConfig, rng: &mut impl UniformSource) -> Result<Piece> {
        let time = config.time_signature()?;
        let pitches = self.pitches.generate_exact(rng, config.length)?;
        let durations = self.durations.generate_exact(rng, config.length)?;
        let notes: Vec<(Pitch, NoteValue)> = pitches.into_iter().zip(durations).collect();

        let resolution = match config.divisions_per_quarter {
            Some(r) => r,
            None => self.resolution_for(time)?,
        };
        debug!(
            "resolution {} divisions per quarter for {} trained note values",
            resolution,
            self.trained_values.len()
        );

        let packer = MeasurePacker::new(time, DurationCodec::new(resolution)?)?;
        let events = packer.pack(&notes)?;
        let piece = Piece {
            title: config.title.clone(),
            time,
            divisions_per_quarter: resolution,
            tempo_bpm: config.tempo_bpm,
            events,
        };
        info!(
            "composed {} notes ({} events, {} measures of {}) from {} training notes",
            notes.len(),
            piece.events.len(),
            piece.measures(),
            time,
            self.notes_seen
        );
        Ok(piece)
    }
}

/// Train on `parts` and compose one piece.
pub fn compose(
    parts: &[PartSequences],
    config: &GeneratorConfig,
    rng: &mut impl UniformSource,
) -> Result<Piece> {
    let mut composer = Composer::new(config.pitch_degree, config.duration_degree)?;
    for part in parts {
        composer.train(part)?;
    }
    composer.compose(config, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcmg_prng::SeqRng;

    fn part(pitches: &[&str], durations: &[&str]) -> PartSequences {
        PartSequences::new(
            pitches.iter().map(|s| s.parse().unwrap()).collect(),
            durations.iter().map(|s| s.parse().unwrap()).collect(),
        )
        .unwrap()
    }

    fn scale() -> PartSequences {
        part(
            &["C4", "D4", "E4", "F4", "G4", "A4", "B4", "C5"],
            &["quarter", "eighth", "eighth", "half", "quarter.", "eighth", "half", "whole"],
        )
    }

    #[test]
    fn generated_symbols_come_from_training() {
        let training = scale();
        let config = GeneratorConfig {
            length: 40,
            pitch_degree: 2,
            duration_degree: 1,
            ..Default::default()
        };
        let mut rng = SeqRng::new(5);
        let piece = compose(&[training.clone()], &config, &mut rng).unwrap();

        assert_eq!(piece.divisions_per_quarter, 2);
        let trained_pitches: BTreeSet<Pitch> = training.pitches().iter().copied().collect();
        assert!(piece.events.iter().all(|e| trained_pitches.contains(&e.pitch)));

        // Ties merged back give exactly `length` notes.
        let notes = piece.events.iter().filter(|e| !e.tie_end).count();
        assert_eq!(notes, 40);
    }

    #[test]
    fn resolution_covers_the_meter() {
        let mut composer = Composer::new(2, 2).unwrap();
        composer.train(&part(&["C4", "D4"], &["quarter", "half"])).unwrap();
        assert_eq!(composer.resolution_for(TimeSignature::common()).unwrap(), 1);
        assert_eq!(composer.resolution_for(TimeSignature::new(3, 8).unwrap()).unwrap(), 2);
        assert_eq!(composer.resolution_for(TimeSignature::new(7, 16).unwrap()).unwrap(), 4);
    }

    #[test]
    fn huge_meters_do_not_overflow() {
        let mut composer = Composer::new(2, 2).unwrap();
        composer.train(&part(&["C4"], &["quarter"])).unwrap();
        let wide = TimeSignature::new(1 << 30, 4).unwrap();
        assert_eq!(composer.resolution_for(wide).unwrap(), 1);
        let odd = TimeSignature::new(u32::MAX, 32).unwrap();
        assert_eq!(composer.resolution_for(odd).unwrap(), 8);

        // The measure itself no longer fits in a division count.
        let config = GeneratorConfig {
            length: 4,
            beats: u32::MAX,
            beat_unit: 1,
            ..Default::default()
        };
        assert!(matches!(
            composer.compose(&config, &mut SeqRng::new(1)),
            Err(MusicError::InvalidTimeSignature { .. })
        ));
    }

    #[test]
    fn fixed_resolution_is_respected() {
        let config = GeneratorConfig {
            length: 10,
            divisions_per_quarter: Some(12),
            seed: Some(1),
            ..Default::default()
        };
        let mut rng = SeqRng::new(1);
        let piece = compose(&[scale()], &config, &mut rng).unwrap();
        assert_eq!(piece.divisions_per_quarter, 12);
        assert!(piece.events.iter().all(|e| e.divisions % 3 == 0));
    }

    #[test]
    fn same_seed_same_piece() {
        let config = GeneratorConfig::default();
        let a = compose(&[scale()], &config, &mut SeqRng::new(77)).unwrap();
        let b = compose(&[scale()], &config, &mut SeqRng::new(77)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn no_training_material() {
        let config = GeneratorConfig::default();
        let result = compose(&[], &config, &mut SeqRng::new(1));
        assert!(matches!(result, Err(MusicError::UnknownContext(_))));
    }

    #[test]
    fn zero_length_piece() {
        let config = GeneratorConfig {
            length: 0,
            ..Default::default()
        };
        let piece = compose(&[scale()], &config, &mut SeqRng::new(1)).unwrap();
        assert!(piece.events.is_empty());
        assert_eq!(piece.measures(), 0);
    }
}
