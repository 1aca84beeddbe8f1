use std::path::PathBuf;

use clap::Parser;
use nano_pcap::{
    pcap::ReaderOptions,
    tools::{MergeConfig, merge_files},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(name = "pcap-merge", about = "Merges time ordered captures into one")]
struct PcapMerge {
    /// Output capture, gzip compressed if it ends in .gz
    #[clap(short, long)]
    output: PathBuf,
    /// Captures to merge. Ties go to the one listed first
    #[clap(required = true, num_args = 2..)]
    inputs: Vec<PathBuf>,
    #[clap(long)]
    strict: bool,
    /// Fail if the inputs have different link types
    #[clap(short = 'R', long)]
    require_same_linktype: bool,
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = PcapMerge::parse();
    init_logging(cli.verbose);
    let config = MergeConfig {
        reader: ReaderOptions { strict: cli.strict },
        require_same_link_type: cli.require_same_linktype,
        ..Default::default()
    };
    let outcome = merge_files(&cli.inputs, &cli.output, &config)?;
    for (input, records) in cli.inputs.iter().zip(&outcome.records_per_input) {
        println!("{}: {records} records", input.display());
    }
    println!("Wrote {} records to {}", outcome.records(), cli.output.display());
    Ok(())
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();
}
