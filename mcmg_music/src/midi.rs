// MIDI output for packed pieces.
//
// Renders a `Piece` as a Standard MIDI File for playback. Track 0 carries
// tempo and time signature; track 1 carries the melody. Tied pieces are
// notation only: a tie chain sounds as one note, so note-on is sent on the
// first piece and note-off after the last.
//
// Divisions map to ticks at 480 per quarter when the resolution divides
// 480, otherwise the resolution itself is used as the tick rate.
//
// Uses the `midly` crate for encoding. Output is SMF Format 1.

use crate::error::{MusicError, Result};
use crate::score::{Piece, ScoreWriter};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Preferred ticks per quarter note.
const TICKS_PER_QUARTER: u16 = 480;

/// Largest delta a MIDI variable-length quantity can hold.
const MAX_DELTA: u32 = 0x0FFF_FFFF;

const VELOCITY: u8 = 80;

/// Writes pieces as SMF bytes to any `Write`.
pub struct MidiWriter<W: Write> {
    out: W,
    program: u8,
}

impl<W: Write> MidiWriter<W> {
    /// `program` is the General MIDI instrument (0 = acoustic grand).
    pub fn new(out: W, program: u8) -> Self {
        MidiWriter {
            out,
            program: program.min(127),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ScoreWriter for MidiWriter<W> {
    fn write_piece(&mut self, piece: &Piece) -> Result<()> {
        let smf = piece_to_smf(piece, self.program)?;
        smf.write_std(&mut self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Write a piece to a `.mid` file.
pub fn write_midi(piece: &Piece, path: &Path, program: u8) -> Result<()> {
    let file = std::fs::File::create(path)?;
    MidiWriter::new(BufWriter::new(file), program).write_piece(piece)
}

/// Tick rate and ticks per division for a resolution.
fn tick_scale(divisions_per_quarter: u32) -> Result<(u16, u32)> {
    if divisions_per_quarter == 0 {
        return Err(MusicError::InvalidResolution(0));
    }
    let tpq = u32::from(TICKS_PER_QUARTER);
    if tpq % divisions_per_quarter == 0 {
        return Ok((TICKS_PER_QUARTER, tpq / divisions_per_quarter));
    }
    match u16::try_from(divisions_per_quarter) {
        Ok(d) if d <= 0x7FFF => Ok((d, 1)),
        _ => Err(MusicError::Midi(format!(
            "{divisions_per_quarter} divisions per quarter exceeds the MIDI tick rate"
        ))),
    }
}

fn delta(ticks: u32) -> Result<u28> {
    if ticks > MAX_DELTA {
        return Err(MusicError::Midi(format!("delta of {ticks} ticks is too long")));
    }
    Ok(u28::new(ticks))
}

/// Convert a piece to an in-memory SMF.
pub fn piece_to_smf(piece: &Piece, program: u8) -> Result<Smf<'_>> {
    let (tpq, ticks_per_division) = tick_scale(piece.divisions_per_quarter)?;
    let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::new(tpq))));

    // Track 0: tempo and meter. Below 4 BPM the microseconds per quarter
    // overflow the 24-bit field.
    let tempo = 60_000_000 / u32::from(piece.tempo_bpm.max(4));
    let denominator_pow = piece.time.beat_unit.trailing_zeros() as u8;
    let numerator = u8::try_from(piece.time.beats)
        .map_err(|_| MusicError::Midi(format!("time signature {} has too many beats", piece.time)))?;
    let conductor: Track<'_> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, denominator_pow, 24, 8)),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ];
    smf.tracks.push(conductor);

    // Track 1: melody.
    let channel = u4::new(0);
    let mut track: Track<'_> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(piece.title.as_bytes())),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::new(program.min(127)),
                },
            },
        },
    ];

    let mut pending: u32 = 0;
    for event in &piece.events {
        let key = event
            .pitch
            .midi_key()
            .ok_or_else(|| MusicError::Midi(format!("{} is outside the MIDI key range", event.pitch)))?;

        if !event.tie_end {
            track.push(TrackEvent {
                delta: delta(pending)?,
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn {
                        key: u7::new(key),
                        vel: u7::new(VELOCITY),
                    },
                },
            });
            pending = 0;
        }

        pending += event.divisions * ticks_per_division;

        if !event.tie_start {
            track.push(TrackEvent {
                delta: delta(pending)?,
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff {
                        key: u7::new(key),
                        vel: u7::new(0),
                    },
                },
            });
            pending = 0;
        }
    }

    track.push(TrackEvent {
        delta: delta(pending)?,
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    Ok(smf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::NoteValue;
    use crate::measure::{RenderEvent, TimeSignature};

    fn event(pitch: &str, divisions: u32, value: &str, tie_start: bool, tie_end: bool) -> RenderEvent {
        RenderEvent {
            measure: 1,
            measure_start: false,
            pitch: pitch.parse().unwrap(),
            divisions,
            value: value.parse::<NoteValue>().unwrap(),
            tie_start,
            tie_end,
        }
    }

    fn piece(events: Vec<RenderEvent>) -> Piece {
        Piece {
            title: "test".into(),
            time: TimeSignature::common(),
            divisions_per_quarter: 1,
            tempo_bpm: 120,
            events,
        }
    }

    fn note_events(smf: &Smf<'_>) -> Vec<(u32, bool, u8)> {
        smf.tracks[1]
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, .. },
                    ..
                } => Some((e.delta.as_int(), true, key.as_int())),
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOff { key, .. },
                    ..
                } => Some((e.delta.as_int(), false, key.as_int())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn tie_chain_sounds_once() {
        let p = piece(vec![
            event("C4", 1, "quarter", true, false),
            event("C4", 3, "half.", false, true),
            event("E4", 1, "quarter", false, false),
        ]);
        let smf = piece_to_smf(&p, 0).unwrap();
        assert_eq!(smf.tracks.len(), 2);
        assert_eq!(
            note_events(&smf),
            vec![(0, true, 60), (1920, false, 60), (0, true, 64), (480, false, 64)]
        );
    }

    #[test]
    fn odd_resolutions_use_their_own_tick_rate() {
        assert_eq!(tick_scale(1).unwrap(), (480, 480));
        assert_eq!(tick_scale(8).unwrap(), (480, 60));
        assert_eq!(tick_scale(7).unwrap(), (7, 1));
        assert!(tick_scale(40_000).is_err());
        assert!(tick_scale(0).is_err());
    }

    #[test]
    fn out_of_range_pitch_is_an_error() {
        let p = piece(vec![event("G#9", 1, "quarter", false, false)]);
        assert!(matches!(piece_to_smf(&p, 0), Err(MusicError::Midi(_))));
    }

    #[test]
    fn written_bytes_parse_back() {
        let p = piece(vec![event("A4", 4, "whole", false, false)]);
        let mut writer = MidiWriter::new(Vec::new(), 73);
        writer.write_piece(&p).unwrap();
        let bytes = writer.into_inner();
        let parsed = Smf::parse(&bytes).unwrap();
        assert_eq!(parsed.tracks.len(), 2);
        assert_eq!(parsed.header.timing, Timing::Metrical(u15::new(480)));
        assert_eq!(note_events(&parsed), vec![(0, true, 69), (1920, false, 69)]);
    }
}
