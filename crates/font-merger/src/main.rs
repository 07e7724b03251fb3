use std::{
    fs::{read, write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;
use fontmerge::{Merger, Options};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "fontmerge")]
#[command(about = "Merge multiple fonts into one", long_about = None)]
struct Cli {
    /// Input font files to merge
    #[arg(required = true)]
    input_files: Vec<PathBuf>,

    /// Output font file
    #[arg(short, long, default_value = "merged.ttf")]
    output: PathBuf,

    /// Comma-separated list of tables to drop
    #[arg(long, value_delimiter = ',')]
    drop_tables: Vec<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Log time spent per table
    #[arg(long)]
    timing: bool,
}

fn init_logger(options: &Options) {
    let level = if options.verbose { LevelFilter::Info } else { LevelFilter::Warn };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if options.timing {
        builder.filter_module("fontmerge::timer", LevelFilter::Info);
    }
    builder.parse_default_env().init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let options = Options::new()
        .drop_tables(&cli.drop_tables)
        .verbose(cli.verbose)
        .timing(cli.timing);
    init_logger(&options);

    let font_data: Vec<Vec<u8>> = cli
        .input_files
        .iter()
        .map(|path| read(path).with_context(|| format!("failed to read {}", path.display())))
        .collect::<Result<_>>()?;
    let font_refs: Vec<&[u8]> = font_data.iter().map(Vec::as_slice).collect();

    let merged = Merger::new(options).merge(&font_refs)?;
    write(&cli.output, &merged)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;

    println!("{}", cli.output.display());
    Ok(())
}
