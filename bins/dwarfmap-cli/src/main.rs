//! Command line front-end for the dwarfmap exporter.

use anyhow::{Context, Result};
use clap::Parser;
use dwarfmap::{write_pretty, DwarfExporter, DwarfFile};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(name = "dwarfmap")]
#[command(version)]
#[command(about = "Export the declaration catalog of a DWARF binary as JSON")]
struct Cli {
    /// Executable or object file with DWARF debug info
    input: PathBuf,

    /// Only export entities whose declaration file starts with this prefix
    #[arg(short = 'f', long = "filter", default_value = "", value_name = "PREFIX")]
    filter: String,

    /// Repeat the full pipeline N times (timing runs)
    #[arg(long = "test", value_name = "N")]
    test: Option<u32>,
}

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            use clap::error::ErrorKind;
            err.print().ok();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    };

    init_logging();

    match cli.test {
        Some(runs) => {
            for run in 0..runs {
                let started = Instant::now();
                export(&cli)?;
                info!("run {} finished in {:?}", run + 1, started.elapsed());
            }
        }
        None => export(&cli)?,
    }
    Ok(())
}

fn export(cli: &Cli) -> Result<()> {
    let file = DwarfFile::open(&cli.input)
        .with_context(|| format!("unable to open file: {}", cli.input.display()))?;

    let mut exporter = DwarfExporter::new(file, cli.filter.clone());
    exporter.run()?;

    let out = File::create("out.json")?;
    let mut writer = BufWriter::new(out);
    write_pretty(exporter.output(), &mut writer)?;
    writer.flush()?;
    info!("output written to out.json");
    Ok(())
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
