use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::Parser;
use nano_pcap::{
    listener::{ParseOptions, parse_file},
    tools::{FilterConfig, FilterListener, OutputOptions, Truncation},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(name = "pcap-filter", about = "Filters, edits and rolls a capture")]
struct PcapFilter {
    /// Capture to use as input
    input: PathBuf,
    /// Output file. May contain strftime fields to roll on record time, e.g. %Y/%m/%d/%H.pcap
    output: String,
    #[clap(long)]
    strict: bool,
    /// Maximum bytes kept per record
    #[clap(short = 'l', long, default_value_t = 65535)]
    snaplen: u32,
    #[clap(short = 'o', long, default_value_t = 0)]
    data_offset: usize,
    #[clap(short = 'x', long, default_value_t = 0)]
    data_end_offset: usize,
    #[clap(short = 'H', long)]
    no_header: bool,
    /// Only write the file header
    #[clap(short = 'R', long)]
    no_records: bool,
    #[clap(short, long)]
    append: bool,
    #[clap(long, default_value_t = 0.0)]
    data_randomization_fraction: f64,
    /// Link type the input must have (1 Ethernet, 228 IPv4, 229 IPv6)
    #[clap(long)]
    required_link_type: Option<u32>,
    /// Link type to write instead of the input's
    #[clap(long)]
    link_type: Option<u32>,
    #[clap(long, allow_hyphen_values = true)]
    time_shift_seconds: Option<i64>,
    /// Epoch nanoseconds or "YYYY-MM-DD HH:MM:SS.ffffff" in UTC
    #[clap(short, long)]
    start: Option<String>,
    /// Like start, or "+N" nanoseconds after start
    #[clap(short, long)]
    end: Option<String>,
    #[clap(short = 'D', long, default_value_t = 0.0)]
    drop_fraction: f64,
    #[clap(long, default_value_t = 0.0)]
    duplicate_fraction: f64,
    /// Number of previous records compared for duplicate content
    #[clap(long, default_value_t = 0)]
    deduplication_window: usize,
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_time(value: &str) -> anyhow::Result<u64> {
    if let Ok(nanos) = value.parse::<u64>() {
        return Ok(nanos);
    }
    let datetime = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")?;
    let nanos = datetime
        .and_utc()
        .timestamp_nanos_opt()
        .ok_or_else(|| anyhow::anyhow!("{value} is out of range"))?;
    Ok(u64::try_from(nanos)?)
}

fn main() -> anyhow::Result<()> {
    let cli = PcapFilter::parse();
    init_logging(cli.verbose);

    let start = cli.start.as_deref().map(parse_time).transpose()?;
    let end = match (cli.end.as_deref(), start) {
        (Some(relative), Some(start)) if relative.starts_with('+') => {
            Some(start + relative[1..].parse::<u64>()?)
        }
        (Some(end), _) => Some(parse_time(end)?),
        (None, _) => None,
    };
    let config = FilterConfig {
        output_options: OutputOptions {
            append: cli.append,
            no_header: cli.no_header,
        },
        truncation: Truncation {
            snap_length: cli.snaplen,
            data_offset: cli.data_offset,
            data_end_offset: cli.data_end_offset,
        },
        start,
        end,
        drop_fraction: cli.drop_fraction,
        duplicate_fraction: cli.duplicate_fraction,
        randomization_fraction: cli.data_randomization_fraction,
        deduplication_window: cli.deduplication_window,
        required_link_type: cli.required_link_type,
        link_type: cli.link_type,
        time_shift_seconds: cli.time_shift_seconds,
        no_records: cli.no_records,
        ..FilterConfig::new(cli.output)
    };
    let options = if cli.strict {
        ParseOptions::strict()
    } else {
        ParseOptions::default()
    };
    let mut listener = FilterListener::new(config)?;
    parse_file(&cli.input, &mut listener, &options)?;
    let stats = listener.stats();
    println!(
        "Read {} records, wrote {} ({} duplicated) to {} outputs",
        stats.read, stats.written, stats.duplicated, stats.outputs_opened
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
