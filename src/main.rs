use std::env;
use std::path::PathBuf;

use synthfs::{extract_monolith, fill_gaps, write_image};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage:
  synthfs extract <monolith> <out-dir>    Unpack a sampler container into an
                                          instrument directory
  synthfs fill <instrument-dir>           Synthesize every missing semitone of
                                          one instrument
  synthfs mkimg <instruments-dir> <image> Pack all instrument directories into
                                          one device image

Logging is controlled through RUST_LOG (default: info).";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn expect_path(args: &mut env::Args, what: &str) -> anyhow::Result<PathBuf> {
    args.next()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("missing <{what}> argument\n\n{USAGE}"))
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let mut args = env::args();
    args.next();

    let Some(command) = args.next() else {
        eprintln!("{USAGE}");
        return Ok(());
    };

    match command.as_str() {
        "extract" => {
            let monolith = expect_path(&mut args, "monolith")?;
            let out_dir = expect_path(&mut args, "out-dir")?;
            let summary = extract_monolith(&monolith, &out_dir)?;
            println!(
                "extracted '{}': {} zones across {} tracks",
                summary.name, summary.zones, summary.tracks
            );
        }
        "fill" => {
            let dir = expect_path(&mut args, "instrument-dir")?;
            let summary = fill_gaps(&dir)?;
            println!(
                "filled '{}': {} recorded semitones, {} synthesized files",
                dir.display(),
                summary.recorded,
                summary.synthesized
            );
        }
        "mkimg" => {
            let instruments = expect_path(&mut args, "instruments-dir")?;
            let image = expect_path(&mut args, "image")?;
            let summary = write_image(&instruments, &image)?;
            println!(
                "wrote '{}': {} instruments, {} samples, {} bytes",
                image.display(),
                summary.header.instrument_count,
                summary.samples,
                summary.bytes_written
            );
        }
        "--help" | "-h" => {
            println!("{USAGE}");
        }
        other => {
            anyhow::bail!("unknown command '{other}'\n\n{USAGE}");
        }
    }

    Ok(())
}
