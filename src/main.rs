//! `avpipe` command-line player.
//!
//! Plays a media file (with the `ffmpeg` feature) or the built-in
//! `synthetic` test stream through the pipeline. With `--interactive`,
//! playback commands are read line by line from stdin.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;

use anyhow::Context;
use clap::Parser;
use crossbeam::channel::{self, select};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use avpipe::audio::{AudioFormat, AudioSink, NullSink};
use avpipe::config::{AudioOutput, OutputConfig, PlayerConfig, VideoOutput};
use avpipe::core::format_time;
use avpipe::media::SyntheticStream;
use avpipe::playback::{
    AudioStages, PlaybackCommand, PlaybackEngine, PlaybackError, Stages, VideoStages,
};
use avpipe::render::{NullSurface, PresentationSurface, RawFileSurface};

/// Name that selects the generated test stream instead of a file
const SYNTHETIC_INPUT: &str = "synthetic";

#[derive(Parser, Debug)]
#[command(name = "avpipe")]
#[command(about = "Threaded A/V playback pipeline with master-clock sync")]
#[command(version)]
struct Args {
    /// Media file to play, or `synthetic` for a generated test stream
    input: String,

    /// TOML configuration file
    #[arg(short, long, env = "AVPIPE_CONFIG")]
    config: Option<PathBuf>,

    /// Initial time speed (overrides config)
    #[arg(long)]
    rate: Option<f64>,

    /// Start position in seconds
    #[arg(long, default_value_t = 0.0)]
    start: f64,

    /// Video output (overrides config)
    #[arg(long, value_enum)]
    video_out: Option<VideoOutput>,

    /// File for `--video-out raw` (overrides config)
    #[arg(long)]
    raw_path: Option<PathBuf>,

    /// Audio output (overrides config)
    #[arg(long, value_enum)]
    audio_out: Option<AudioOutput>,

    /// Length of the synthetic stream in seconds
    #[arg(long, default_value_t = 10.0)]
    synthetic_secs: f64,

    /// Read playback commands from stdin
    #[arg(short, long)]
    interactive: bool,
}

impl Args {
    fn apply(&self, config: &mut PlayerConfig) {
        if let Some(rate) = self.rate {
            config.clock.rate = rate;
        }
        if let Some(video) = self.video_out {
            config.output.video = video;
        }
        if let Some(path) = &self.raw_path {
            config.output.raw_path = path.clone();
        }
        if let Some(audio) = self.audio_out {
            config.output.audio = audio;
        }
    }
}

enum Input {
    Synthetic(SyntheticStream),
    #[cfg(feature = "ffmpeg")]
    File(PathBuf),
}

#[cfg(feature = "ffmpeg")]
fn file_input(name: &str) -> anyhow::Result<Input> {
    Ok(Input::File(PathBuf::from(name)))
}

#[cfg(not(feature = "ffmpeg"))]
fn file_input(name: &str) -> anyhow::Result<Input> {
    anyhow::bail!(
        "cannot open '{}': built without the `ffmpeg` feature (try `{}`)",
        name,
        SYNTHETIC_INPUT
    )
}

/// The raw dump is truncated by the first session only, so frames shown
/// after a seek follow the earlier ones in the same file.
fn open_surface(
    output: &OutputConfig,
    first_session: bool,
) -> Result<Box<dyn PresentationSurface>, PlaybackError> {
    Ok(match output.video {
        VideoOutput::Null => Box::new(NullSurface::new()),
        VideoOutput::Raw if first_session => Box::new(RawFileSurface::create(&output.raw_path)?),
        VideoOutput::Raw => Box::new(RawFileSurface::append(&output.raw_path)?),
    })
}

fn open_sink(output: AudioOutput, format: AudioFormat) -> Result<Box<dyn AudioSink>, PlaybackError> {
    match output {
        AudioOutput::Null => Ok(Box::new(NullSink::new())),
        #[cfg(feature = "cpal")]
        AudioOutput::Cpal => Ok(Box::new(avpipe::audio::CpalSink::open(format)?)),
        #[cfg(not(feature = "cpal"))]
        AudioOutput::Cpal => {
            let _ = format;
            Err(avpipe::audio::SinkError::Device("built without the `cpal` feature".into()).into())
        }
    }
}

fn stage_factory(
    input: Input,
    config: &PlayerConfig,
) -> impl FnMut(f64) -> Result<Stages, PlaybackError> + Send + 'static {
    let output = config.output.clone();
    let format = config.audio_format();
    let mut opened = 0u64;

    move |start: f64| {
        let surface = open_surface(&output, opened == 0)?;
        opened += 1;
        let sink = open_sink(output.audio, format)?;
        match &input {
            Input::Synthetic(stream) => Ok(Stages {
                source: Box::new(stream.source(start)),
                video: Some(VideoStages {
                    decoder: Box::new(stream.video_decoder()),
                    surface,
                }),
                audio: Some(AudioStages {
                    decoder: Box::new(stream.audio_decoder()?),
                    sink,
                }),
            }),
            #[cfg(feature = "ffmpeg")]
            Input::File(path) => {
                let media = avpipe::media::ffmpeg::open(path, start, format)?;
                Ok(Stages {
                    source: Box::new(media.source),
                    video: media.video.map(|decoder| VideoStages {
                        decoder: Box::new(decoder),
                        surface,
                    }),
                    audio: media.audio.map(|decoder| AudioStages {
                        decoder: Box::new(decoder),
                        sink,
                    }),
                })
            }
        }
    }
}

fn print_status(engine: &PlaybackEngine) {
    let duration = engine
        .duration()
        .map(format_time)
        .unwrap_or_else(|| "--:--:--.---".to_string());
    println!(
        "{} / {}  [{}]  rate {:.2}x",
        format_time(engine.position()),
        duration,
        engine.state(),
        engine.rate()
    );
    if let Some(metrics) = engine.live_metrics() {
        println!("{}", metrics);
    }
}

fn run_interactive(engine: &mut PlaybackEngine) -> anyhow::Result<()> {
    let (line_tx, line_rx) = channel::unbounded::<String>();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("spawning stdin reader")?;

    let events = engine.events();
    println!("commands: play | pause | resume | seek <s> | rate <x> | status | stop | quit");

    loop {
        select! {
            recv(line_rx) -> line => {
                let Ok(line) = line else {
                    // stdin closed
                    engine.stop();
                    break;
                };
                match line.trim() {
                    "quit" | "exit" => {
                        engine.stop();
                        break;
                    }
                    "status" => print_status(engine),
                    text => match text.parse::<PlaybackCommand>() {
                        Ok(command) => {
                            if let Err(e) = engine.process_command(command) {
                                error!(error = %e, "command failed");
                            }
                        }
                        Err(e) => warn!("{}", e),
                    },
                }
            }
            recv(events) -> event => {
                if let Ok(event) = event {
                    if engine.handle_event(event) {
                        println!("end of media; `play` restarts, `quit` exits");
                    }
                }
            }
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PlayerConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let input = if args.input == SYNTHETIC_INPUT {
        Input::Synthetic(SyntheticStream {
            duration: args.synthetic_secs,
            audio: config.audio_format(),
            ..SyntheticStream::default()
        })
    } else {
        file_input(&args.input)?
    };

    info!(input = %args.input, rate = config.clock.rate, "starting avpipe");
    let factory = stage_factory(input, &config);
    let mut engine = PlaybackEngine::new(config, factory)?;

    if args.start > 0.0 {
        engine.seek(args.start)?;
    }
    engine.play().context("starting playback")?;

    if args.interactive {
        run_interactive(&mut engine)?;
    } else if let Some(metrics) = engine.wait() {
        info!(%metrics, "done");
    }
    Ok(())
}
