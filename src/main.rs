use std::io::{BufRead as _, Write as _};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use streamspeak::config::SinkKind;
use streamspeak::voice::{self, tone_wav};
use streamspeak::{Config, Coordinator, Error, SessionReport, StaticSource};

/// streamspeak - hear an LLM's answer while it is still being written
#[derive(Parser)]
#[command(name = "streamspeak", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/streamspeak/config.toml)
    #[arg(short, long, env = "STREAMSPEAK_CONFIG")]
    config: Option<PathBuf>,

    /// Where to play audio
    #[arg(long, value_enum)]
    sink: Option<SinkArg>,

    /// Characters required before a sentence end is spoken
    #[arg(long)]
    min_chars: Option<usize>,

    /// Max concurrent TTS requests
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum SinkArg {
    Ffplay,
    Device,
    Null,
}

impl From<SinkArg> for SinkKind {
    fn from(arg: SinkArg) -> Self {
        match arg {
            SinkArg::Ffplay => Self::Ffplay,
            SinkArg::Device => Self::Device,
            SinkArg::Null => Self::Null,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Speak the answer to a single prompt
    Ask {
        /// Prompt sent to the model
        prompt: String,
    },
    /// Speak the given text without asking the model
    Speak {
        /// Text to speak
        text: String,
    },
    /// Play a test tone through the configured sink
    TestSink,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,streamspeak=info",
        1 => "info,streamspeak=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(sink) = cli.sink {
        config.playback.sink = sink.into();
    }
    if let Some(min_chars) = cli.min_chars {
        config.chunker.min_chars = min_chars;
    }
    if let Some(max_in_flight) = cli.max_in_flight {
        config.pipeline.max_in_flight = max_in_flight;
    }
    config.validate()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Some(Command::Ask { prompt }) => {
            let mut coordinator = Coordinator::from_config(&config)?;
            watch_ctrl_c(coordinator.cancellation_token());
            let report = coordinator.run_session(&prompt).await?;
            print_report(&report);
            Ok(())
        }
        Some(Command::Speak { text }) => {
            let source = Arc::new(StaticSource::from_text(&text));
            let mut coordinator = Coordinator::with_source(&config, source)?;
            watch_ctrl_c(coordinator.cancellation_token());
            let report = coordinator.run_session("").await?;
            print_report(&report);
            Ok(())
        }
        Some(Command::TestSink) => test_sink(&config).await,
        None => prompt_loop(&config).await,
    }
}

/// Cancel running sessions on Ctrl-C
fn watch_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, stopping playback");
            token.cancel();
        }
    });
}

/// Read prompts from stdin until `exit`, speaking each answer
async fn prompt_loop(config: &Config) -> anyhow::Result<()> {
    let mut coordinator = Coordinator::from_config(config)?;
    let token = coordinator.cancellation_token();
    watch_ctrl_c(token.clone());

    println!("Streaming {} -> TTS -> {:?} ready.", config.llm.model, config.playback.sink);
    let mut lines = spawn_stdin_reader();

    loop {
        print!("Enter prompt (or 'exit'): ");
        std::io::stdout().flush()?;

        let Some(line) = next_prompt(&mut lines, &token).await? else {
            break;
        };
        let prompt = line.trim();
        if prompt.eq_ignore_ascii_case("exit") {
            break;
        }
        if prompt.is_empty() {
            continue;
        }

        match coordinator.run_session(prompt).await {
            Ok(report) => print_report(&report),
            Err(Error::Cancelled) => break,
            Err(e) => eprintln!("Failed streaming: {e}"),
        }
    }

    Ok(())
}

/// Read stdin lines on a plain thread so a pending read never holds up exit
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Next input line, or `None` on end of input or cancellation
async fn next_prompt(
    lines: &mut mpsc::UnboundedReceiver<std::io::Result<String>>,
    token: &CancellationToken,
) -> std::io::Result<Option<String>> {
    tokio::select! {
        () = token.cancelled() => Ok(None),
        line = lines.recv() => line.transpose(),
    }
}

fn print_report(report: &SessionReport) {
    if report.skipped.is_empty() {
        println!("Spoke {} of {} chunks.", report.played, report.chunks);
    } else {
        println!(
            "Spoke {} of {} chunks (skipped {:?}).",
            report.played, report.chunks, report.skipped
        );
    }
}

/// Play a 440Hz tone through the configured sink
async fn test_sink(config: &Config) -> anyhow::Result<()> {
    println!("Testing {:?} sink...", config.playback.sink);
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sink = voice::sink_from_config(&config.playback)?;
    let wav = tone_wav(440.0, 2.0, config.playback.format.sample_rate)?;
    sink.play(&wav, config.playback.format).await?;

    println!("If you heard the tone, playback is working!");
    Ok(())
}
