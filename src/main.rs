//! podio: compile a remote clip with optional padding, background, volume
//! and fades, and write the result to a file or stdout.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use podio::{remote, AudioBuilder, CancelToken, Client, ClientConfig, DurationSlot, Format};

#[derive(Debug, Parser)]
#[command(name = "podio", version, about = "Compile audio with the podio service")]
struct Args {
    /// Source audio URL.
    #[arg(long)]
    url: String,

    /// Output format: mp3, wav, opus or s16le.
    #[arg(long, default_value = "mp3")]
    format: Format,

    /// Output file. Writes to stdout when omitted.
    #[arg(long, short)]
    out: Option<PathBuf>,

    /// Replay the clip this many additional times.
    #[arg(long = "loop")]
    loop_count: Option<u32>,

    #[arg(long)]
    pad_left_ms: Option<u64>,

    #[arg(long)]
    pad_right_ms: Option<u64>,

    /// Background audio URL, looped under the clip.
    #[arg(long)]
    background: Option<String>,

    /// Volume factor (1.0 = unchanged).
    #[arg(long)]
    volume: Option<f64>,

    #[arg(long)]
    fade_in_ms: Option<u64>,

    #[arg(long)]
    fade_out_ms: Option<u64>,

    /// Config file (defaults to ~/.podio/client.yaml).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn tree(&self, length: &DurationSlot) -> AudioBuilder {
        let mut tree = remote(self.url.as_str());
        if let Some(count) = self.loop_count {
            tree = tree.repeat(count);
        }
        if let Some(ms) = self.pad_left_ms {
            tree = tree.pad_left(Duration::from_millis(ms));
        }
        if let Some(ms) = self.pad_right_ms {
            tree = tree.pad_right(Duration::from_millis(ms));
        }
        if let Some(url) = &self.background {
            tree = tree.with_background(&remote(url.as_str()));
        }
        if let Some(factor) = self.volume {
            tree = tree.volume(factor);
        }
        if let Some(ms) = self.fade_in_ms {
            tree = tree.fade_in(Duration::from_millis(ms));
        }
        if let Some(ms) = self.fade_out_ms {
            tree = tree.fade_out(Duration::from_millis(ms));
        }
        tree.save_duration(length)
    }
}

fn load_config(path: Option<&PathBuf>) -> podio::Result<ClientConfig> {
    let config = match path {
        Some(path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load().unwrap_or_default(),
    };
    Ok(config.apply_env())
}

fn run(args: &Args, cancel: &CancelToken) -> podio::Result<()> {
    let client = Client::from_config(&load_config(args.config.as_ref())?)?;
    let length = DurationSlot::new();
    let tree = args.tree(&length);

    let mut dst: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).map_err(podio::PodioError::SinkWrite)?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    let summary = client.compile(args.format, &tree, &mut dst, cancel)?;

    eprintln!("wrote {} bytes", summary.bytes);
    if let Some(duration) = length.get() {
        eprintln!("duration: {:.3}s", duration.as_secs_f64());
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("podio=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        eprintln!("failed to install Ctrl-C handler: {e}");
    }

    match run(&args, &cancel) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("podio: {e}");
            ExitCode::FAILURE
        }
    }
}
