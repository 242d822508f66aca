// Markov Chain Music Generator: CLI entry point.
//
// Trains pitch and note-value chains on the parts of a JSON score, samples
// a new melody, packs it into measures and writes it as MIDI.
//
// Usage:
//   cargo run -p mcmg_music -- <training.json> [output.mid] [--part ID]...
//     [--config FILE] [--length N] [--seed N] [--pitch-degree N]
//     [--duration-degree N] [--time 3/4] [--resolution N] [--tempo BPM]
//     [--program N] [--dump-chains] [--verbose]
//
// Without --part every part of the score is used for training.

use log::{LevelFilter, error, info, warn};
use mcmg_music::compose::Composer;
use mcmg_music::config::GeneratorConfig;
use mcmg_music::midi::write_midi;
use mcmg_music::score::{JsonScore, ScoreReader};
use mcmg_prng::SeqRng;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let level = if args.iter().any(|a| a == "--verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let positional: Vec<&str> = positional_args(args);
    let Some(&input) = positional.first() else {
        return Err("usage: generate <training.json> [output.mid] [--part ID]... [options]".into());
    };
    let output = positional.get(1).copied().unwrap_or("output.mid");

    let mut config = match parse_flag::<String>(args, "--config") {
        Some(path) => GeneratorConfig::load(Path::new(&path))?,
        None => GeneratorConfig::default(),
    };
    apply_overrides(&mut config, args)?;

    let (mut rng, seed) = match config.seed {
        Some(s) => (SeqRng::new(s), s),
        None => SeqRng::from_entropy(),
    };

    info!("Input: {input}");
    info!("Output: {output}");
    info!(
        "Chains: pitch degree {}, duration degree {}",
        config.pitch_degree, config.duration_degree
    );
    info!("Length: {} notes in {}/{}", config.length, config.beats, config.beat_unit);
    info!("Seed: {seed}");

    let score = JsonScore::load(Path::new(input))?;
    let requested = multi_flag(args, "--part");
    let part_ids = if requested.is_empty() {
        score.part_ids()
    } else {
        requested
    };
    if part_ids.is_empty() {
        return Err("score contains no parts".into());
    }

    let mut composer = Composer::new(config.pitch_degree, config.duration_degree)?;
    for id in &part_ids {
        let part = score.read_part(id)?;
        if part.is_empty() {
            warn!("part {id} has no notes, skipping");
            continue;
        }
        info!("Training on part {id} ({} notes)", part.len());
        composer.train(&part)?;
    }

    if args.iter().any(|a| a == "--dump-chains") {
        println!("{}", composer.pitch_chain());
        println!("{}", composer.duration_chain());
    }

    let piece = composer.compose(&config, &mut rng)?;
    write_midi(&piece, Path::new(output), config.midi_program)?;
    info!(
        "Wrote {} measures at {} divisions per quarter to {output}",
        piece.measures(),
        piece.divisions_per_quarter
    );
    Ok(())
}

fn apply_overrides(config: &mut GeneratorConfig, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(v) = parse_flag(args, "--length") {
        config.length = v;
    }
    if let Some(v) = parse_flag(args, "--seed") {
        config.seed = Some(v);
    }
    if let Some(v) = parse_flag(args, "--pitch-degree") {
        config.pitch_degree = v;
    }
    if let Some(v) = parse_flag(args, "--duration-degree") {
        config.duration_degree = v;
    }
    if let Some(v) = parse_flag(args, "--resolution") {
        config.divisions_per_quarter = Some(v);
    }
    if let Some(v) = parse_flag(args, "--tempo") {
        config.tempo_bpm = v;
    }
    if let Some(v) = parse_flag(args, "--program") {
        config.midi_program = v;
    }
    if let Some(time) = parse_flag::<String>(args, "--time") {
        let (beats, unit) = time
            .split_once('/')
            .ok_or_else(|| format!("time signature must look like 3/4, got {time:?}"))?;
        config.beats = beats.trim().parse()?;
        config.beat_unit = unit.trim().parse()?;
    }
    Ok(())
}

/// Flags that take no value.
const SWITCHES: [&str; 2] = ["--verbose", "--dump-chains"];

/// Arguments that are neither flags nor flag values.
fn positional_args(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut i = 1;
    while i < args.len() {
        let a = &args[i];
        if a.starts_with("--") {
            i += if SWITCHES.contains(&a.as_str()) { 1 } else { 2 };
            continue;
        }
        out.push(a.as_str());
        i += 1;
    }
    out
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn multi_flag(args: &[String], flag: &str) -> Vec<String> {
    args.windows(2)
        .filter(|w| w[0] == flag)
        .map(|w| w[1].clone())
        .collect()
}
