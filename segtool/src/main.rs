use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use fmp4::{EncodeOptimization, InfoLevels, MediaSegment, SliceWriter, TrackExtendsBox};
use tracing::*;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Inspect and refragment fragmented MP4 media segments.
#[derive(Parser, Debug)]
#[command(name = "segtool", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the box tree of a segment.
    Info {
        input: PathBuf,

        /// Detail levels, e.g. "all:1,trun:2".
        #[arg(long, env = "SEGTOOL_INFO_LEVELS", default_value = "all:1")]
        levels: String,
    },

    /// Print the sample duration shared by every fragment.
    Duration {
        input: PathBuf,

        #[command(flatten)]
        trex: TrexArgs,
    },

    /// Rebuild the fragments of a segment around a target duration.
    Refragment {
        input: PathBuf,
        output: PathBuf,

        /// Minimum duration of an output fragment, in track timescale units.
        #[arg(long, env = "SEGTOOL_TARGET_DURATION")]
        target_duration: u32,

        /// Move shared sample values into the track fragment header.
        #[arg(long)]
        optimize_trun: bool,

        /// Write the segment without a styp box.
        #[arg(long)]
        no_styp: bool,

        #[command(flatten)]
        trex: TrexArgs,
    },
}

/// Track defaults normally found in the `trex` of the init segment.
#[derive(Args, Debug)]
struct TrexArgs {
    #[arg(long, default_value_t = 1)]
    track_id: u32,

    #[arg(long, default_value_t = 0)]
    default_duration: u32,

    #[arg(long, default_value_t = 0)]
    default_size: u32,

    #[arg(long, default_value_t = 0)]
    default_flags: u32,
}

impl TrexArgs {
    fn trex(&self) -> TrackExtendsBox {
        TrackExtendsBox::new(
            self.track_id,
            1,
            self.default_duration,
            self.default_size,
            self.default_flags,
        )
    }
}

fn read_segment(path: &Path) -> anyhow::Result<MediaSegment> {
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    MediaSegment::decode(&data).with_context(|| format!("Failed to parse {}", path.display()))
}

fn info(input: &Path, levels: &str) -> anyhow::Result<()> {
    let levels: InfoLevels = levels.parse()?;
    let segment = read_segment(input)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    segment.describe(&mut out, &levels, "", "  ")?;
    out.flush()?;

    Ok(())
}

fn duration(input: &Path, trex: &TrexArgs) -> anyhow::Result<()> {
    let segment = read_segment(input)?;
    let duration = segment.common_sample_duration(Some(&trex.trex()))?;

    println!("{}", duration);

    Ok(())
}

fn refragment(
    input: &Path,
    output: &Path,
    target_duration: u32,
    optimize_trun: bool,
    no_styp: bool,
    trex: &TrexArgs,
) -> anyhow::Result<()> {
    let segment = read_segment(input)?;

    if segment.sidx().is_some() {
        warn!("Dropping sidx boxes, they index the old fragments");
    }

    let fragments = segment
        .fragmentify(&trex.trex(), target_duration)
        .context("Failed to refragment")?;

    let mut refragmented = match (no_styp, segment.styp) {
        (true, _) => MediaSegment::without_styp(),
        (false, Some(styp)) => MediaSegment::with_styp(styp),
        (false, None) => MediaSegment::new(),
    };

    if optimize_trun {
        refragmented.encode_optimization = EncodeOptimization::Trun;
    }

    let count = fragments.len();
    for fragment in fragments {
        refragmented.append_fragment(fragment);
    }

    let mut sw = SliceWriter::with_size(refragmented.size() as usize);
    refragmented.encode_sw(&mut sw)?;

    let bytes = sw.into_inner();
    fs::write(output, &bytes).with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        fragments = count,
        bytes = bytes.len(),
        "Wrote {}",
        output.display()
    );

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let cli = Cli::parse();
    debug!(?cli, "Parsed arguments");

    match &cli.command {
        Command::Info { input, levels } => info(input, levels),
        Command::Duration { input, trex } => duration(input, trex),
        Command::Refragment {
            input,
            output,
            target_duration,
            optimize_trun,
            no_styp,
            trex,
        } => refragment(
            input,
            output,
            *target_duration,
            *optimize_trun,
            *no_styp,
            trex,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn refragment_arguments() {
        let cli = Cli::try_parse_from([
            "segtool",
            "refragment",
            "in.m4s",
            "out.m4s",
            "--target-duration",
            "96000",
            "--optimize-trun",
            "--default-duration",
            "1024",
        ])
        .unwrap();

        match cli.command {
            Command::Refragment {
                target_duration,
                optimize_trun,
                no_styp,
                trex,
                ..
            } => {
                assert_eq!(target_duration, 96000);
                assert!(optimize_trun);
                assert!(!no_styp);
                assert_eq!(trex.trex().default_sample_duration, 1024);
                assert_eq!(trex.trex().track_id, 1);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
