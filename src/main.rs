//! chordstep: play a progression through the default output device.
//!
//! Renders the workstation a few blocks ahead of the device and ticks the
//! scheduler on its lookahead timer until Ctrl-C or the duration runs out.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chordstep::audio::{OutputDevice, RingInput};
use chordstep::config::EngineConfig;
use chordstep::midi::{MidiConfig, MidiInput};
use chordstep::pattern::PatternBank;
use chordstep::preset::Preset;
use chordstep::scheduler::SequencerConfig;
use chordstep::theory::PitchClass;
use chordstep::Workstation;

/// Blocks rendered ahead of the device.
const BLOCKS_AHEAD: u64 = 4;

#[derive(Debug, Parser)]
#[command(name = "chordstep", version, about = "Step-sequenced chords, bass and drums")]
struct Cli {
    /// Preset JSON file. Overrides the sequencer flags.
    #[arg(long)]
    preset: Option<PathBuf>,
    #[arg(long, default_value_t = 100.0)]
    bpm: f64,
    /// Key root, e.g. C, F#, Bb.
    #[arg(long, default_value = "C")]
    key: String,
    #[arg(long, default_value = "major")]
    scale: String,
    #[arg(long, default_value = "Pop Hit")]
    progression: String,
    #[arg(long, default_value = "Quarter Notes")]
    rhythm: String,
    #[arg(long, default_value = "Basic Rock")]
    drums: String,
    #[arg(long, default_value_t = 0.0)]
    swing: f64,
    #[arg(long)]
    metronome: bool,
    /// Seconds to play; runs until Ctrl-C when omitted.
    #[arg(long)]
    seconds: Option<f64>,
    /// Render offline to this WAV file instead of playing.
    #[arg(long)]
    bounce: Option<PathBuf>,
    /// Play notes from the configured MIDI device.
    #[arg(long)]
    midi: bool,
    /// Open the default microphone for the looper.
    #[arg(long)]
    mic: bool,
    /// List MIDI input devices and exit.
    #[arg(long)]
    list_midi: bool,
}

impl Cli {
    fn sequencer(&self) -> Result<SequencerConfig, String> {
        let key = PitchClass::parse(&self.key).map_err(|e| e.to_string())?;
        let mut config = SequencerConfig {
            bpm: self.bpm,
            key,
            scale: self.scale.clone(),
            swing: self.swing,
            ..SequencerConfig::default()
        };
        config.metronome.enabled = self.metronome;
        config.patterns.progression = self.progression.clone();
        config.patterns.rhythm = self.rhythm.clone();
        config.patterns.drums = self.drums.clone();
        Ok(config.normalized())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if cli.list_midi {
        for name in MidiInput::list_devices() {
            println!("{name}");
        }
        return;
    }

    if let Err(e) = run(&cli) {
        eprintln!("chordstep: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load();
    let preset = match &cli.preset {
        Some(path) => Some(Preset::load(path)?),
        None => None,
    };
    let sequencer = match &preset {
        Some(p) => p.sequencer.clone(),
        None => cli.sequencer()?,
    };

    if let Some(path) = &cli.bounce {
        let mut ws = Workstation::new(&config, sequencer, PatternBank::builtin());
        if let Some(p) = &preset {
            ws.load_preset(p);
        }
        ws.start();
        let seconds = cli.seconds.unwrap_or(8.0);
        let samples = ws.bounce(seconds, config.block_size);
        chordstep::audio::AudioBuffer::from_mono(samples, config.sample_rate).write_wav_file(path)?;
        println!("wrote {seconds}s to {}", path.display());
        return Ok(());
    }

    let mut device = OutputDevice::open(config.sample_rate, config.channels)?;
    let mut ws = Workstation::new(&config, sequencer, PatternBank::builtin());
    if let Some(p) = &preset {
        ws.load_preset(p);
    }

    if cli.mic {
        match RingInput::default_microphone() {
            Ok(input) => ws.attach_microphone(Box::new(input)),
            Err(e) => tracing::warn!(error = %e, "no microphone, looper recording disabled"),
        }
    }
    let _midi = if cli.midi {
        let midi_config = MidiConfig::load().unwrap_or_default();
        match ws.connect_midi(&midi_config) {
            Ok(input) => Some(input),
            Err(e) => {
                tracing::warn!(error = %e, "MIDI unavailable");
                None
            }
        }
    } else {
        None
    };

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    let channels = device.channels() as usize;
    let block_frames = config.block_size;
    let deadline = cli.seconds.map(|s| Instant::now() + Duration::from_secs_f64(s));
    ws.start();
    println!(
        "chordstep v{}: {} BPM in {} {}, Ctrl-C to stop",
        env!("CARGO_PKG_VERSION"),
        ws.scheduler().config().bpm,
        ws.scheduler().config().key,
        ws.scheduler().config().scale
    );

    while running.load(Ordering::SeqCst) && deadline.map_or(true, |d| Instant::now() < d) {
        ws.tick_if_due(Instant::now());
        fill(&mut ws, &mut device, channels, block_frames)?;
        thread::sleep(Duration::from_millis(2));
    }

    ws.stop();
    // Let the stop fade reach the device.
    let tail = Instant::now() + Duration::from_millis(300);
    while Instant::now() < tail {
        fill(&mut ws, &mut device, channels, block_frames)?;
        thread::sleep(Duration::from_millis(2));
    }
    println!("stopped.");
    Ok(())
}

/// Keep the device queue [`BLOCKS_AHEAD`] blocks ahead of playback.
fn fill(
    ws: &mut Workstation,
    device: &mut OutputDevice,
    channels: usize,
    block_frames: usize,
) -> Result<(), chordstep::audio::AudioError> {
    let ahead = block_frames as u64 * BLOCKS_AHEAD;
    while ws.engine().frames_rendered() < device.frames_played() + ahead {
        let mut block = vec![0.0; block_frames * channels];
        ws.render(&mut block, channels);
        device.push_block(block)?;
    }
    Ok(())
}
