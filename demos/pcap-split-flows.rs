use std::path::PathBuf;

use clap::Parser;
use nano_pcap::{
    listener::{ParseOptions, parse_file},
    tools::{FlowSplitConfig, FlowSplitListener, OutputOptions, Truncation},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(
    name = "pcap-split-flows",
    about = "Writes each MAC (Ethernet) or IP (raw IPv4) conversation to its own file"
)]
struct PcapSplitFlows {
    input: PathBuf,
    /// Directory for the flow files, named after both addresses
    output: PathBuf,
    #[clap(long)]
    gzip_output: bool,
    #[clap(long)]
    strict: bool,
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

fn main() -> anyhow::Result<()> {
    let cli = PcapSplitFlows::parse();
    init_logging(cli.verbose);
    let config = FlowSplitConfig {
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
    let mut listener = FlowSplitListener::in_directory(config, &cli.output);
    let outcome = parse_file(&cli.input, &mut listener, &options)?;
    println!(
        "Split {} records into {} flows",
        outcome.records,
        listener.flows().count()
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
