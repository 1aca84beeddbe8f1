use std::path::PathBuf;

use clap::Parser;
use nano_pcap::{
    listener::{ParseOptions, parse_file},
    tools::{OutputOptions, SplitConfig, SplitListener, Truncation},
    units::{UNITS_1000, UNITS_1024, UnitsError, parse_units},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(name = "pcap-split", about = "Splits a capture into numbered slices")]
struct PcapSplit {
    input: PathBuf,
    /// Directory for the slices, named 0.pcap, 1.pcap...
    output: PathBuf,
    #[clap(long)]
    gzip_output: bool,
    #[clap(long)]
    strict: bool,
    /// Maximum record bytes per slice, e.g. 512M
    #[clap(short = 'b', long, value_parser = parse_byte_count)]
    max_bytes: Option<u64>,
    /// Maximum records per slice, e.g. 10K
    #[clap(short = 'p', long, value_parser = parse_packet_count)]
    max_packets: Option<u64>,
    #[clap(short = 'l', long, default_value_t = 65535)]
    snaplen: u32,
    #[clap(short = 'o', long, default_value_t = 0)]
    data_offset: usize,
    #[clap(short = 'x', long, default_value_t = 0)]
    data_end_offset: usize,
    #[clap(short = 'H', long)]
    no_header: bool,
    #[clap(short, long)]
    append: bool,
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_byte_count(value: &str) -> Result<u64, UnitsError> {
    parse_units(value, UNITS_1024)
}
fn parse_packet_count(value: &str) -> Result<u64, UnitsError> {
    parse_units(value, UNITS_1000)
}

fn main() -> anyhow::Result<()> {
    let cli = PcapSplit::parse();
    init_logging(cli.verbose);
    let config = SplitConfig {
        max_bytes: cli.max_bytes,
        max_packets: cli.max_packets,
        gzip_output: cli.gzip_output,
        output_options: OutputOptions {
            append: cli.append,
            no_header: cli.no_header,
        },
        truncation: Truncation {
            snap_length: cli.snaplen,
            data_offset: cli.data_offset,
            data_end_offset: cli.data_end_offset,
        },
    };
    let options = if cli.strict {
        ParseOptions::strict()
    } else {
        ParseOptions::default()
    };
    let mut listener = SplitListener::in_directory(config, &cli.output)?;
    let outcome = parse_file(&cli.input, &mut listener, &options)?;
    println!(
        "Split {} records into {} slices in {}",
        outcome.records,
        listener.slices(),
        cli.output.display()
    );
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
