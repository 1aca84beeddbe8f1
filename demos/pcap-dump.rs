use std::{ops::ControlFlow, path::PathBuf};

use clap::Parser;
use nano_pcap::{
    listener::{ParseOptions, PcapListener, parse_file},
    pcap::{
        PcapParseError,
        file_header::{PcapFileHeader, TimeResolution},
        packet_header::PacketHeader,
    },
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(name = "pcap-dump", about = "Prints the header and records of a capture")]
struct PcapDump {
    /// Capture to dump, optionally gzip compressed
    pcap: PathBuf,
    /// Show this many bytes of each record as hex
    #[clap(short, long, default_value_t = 0)]
    data_bytes: usize,
    /// Offset of the data to show
    #[clap(short = 'o', long, default_value_t = 0)]
    data_offset: usize,
    /// One value per line, for easy diffing
    #[clap(short, long)]
    long: bool,
    #[clap(short = 'H', long)]
    no_header: bool,
    /// Stop after the header
    #[clap(short = 'R', long)]
    no_records: bool,
    #[clap(short, long)]
    strict: bool,
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

struct DumpListener<'a> {
    cli: &'a PcapDump,
}
impl PcapListener for DumpListener<'_> {
    type Error = PcapParseError;

    fn on_header(&mut self, header: &PcapFileHeader) -> Result<ControlFlow<()>, Self::Error> {
        if !self.cli.no_header {
            let validity = if header.is_magic_valid() { "Valid" } else { "Invalid" };
            let resolution = match header.resolution() {
                TimeResolution::Microsecond => "Micros",
                TimeResolution::Nanosecond => "Nanos",
            };
            if self.cli.long {
                println!("  Magic:         {:X}", header.magic_number());
                println!("  Valid:         {validity}");
                println!("  Resolution:    {resolution}");
                println!("  Version:       {}", header.version());
                println!("  TZ Offset:     {}", header.timezone());
                println!("  Sigfigs:       {}", header.sig_figs());
                println!("  Snaplen:       {}", header.snap_length());
                println!("  Network:       {}", header.network());
            } else {
                println!(
                    "Header | Magic: {:X} {validity} {resolution} | Version {} | TZ Offset: {} | Sigfigs: {} | Snaplen: {} | Network: {}",
                    header.magic_number(),
                    header.version(),
                    header.timezone(),
                    header.sig_figs(),
                    header.snap_length(),
                    header.network()
                );
            }
        }
        if self.cli.no_records {
            return Ok(ControlFlow::Break(()));
        }
        Ok(ControlFlow::Continue(()))
    }

    fn on_record(
        &mut self,
        header: PacketHeader,
        data: &[u8],
    ) -> Result<ControlFlow<()>, Self::Error> {
        let start = self.cli.data_offset.min(data.len());
        let end = start.saturating_add(self.cli.data_bytes).min(data.len());
        let hex = data[start..end]
            .iter()
            .map(|byte| format!("{byte:02X}"))
            .collect::<Vec<_>>()
            .join(" ");
        if self.cli.long {
            println!("Record");
            println!("  Seconds:  {}", header.ts_sec());
            println!("  Fraction: {}", header.ts_frac());
            println!("  Length:   {}", header.include_len());
            println!("  Original: {}", header.orig_len());
            if !hex.is_empty() {
                println!("  Data:     {hex}");
            }
        } else {
            println!(
                "Record | {}.{} | Length {:5} | Original: {:5} | {hex}",
                header.ts_sec(),
                header.ts_frac(),
                header.include_len(),
                header.orig_len()
            );
        }
        Ok(ControlFlow::Continue(()))
    }
}

fn main() -> anyhow::Result<()> {
    let cli = PcapDump::parse();
    init_logging(cli.verbose);
    let options = if cli.strict {
        ParseOptions::strict()
    } else {
        ParseOptions::default()
    };
    let mut listener = DumpListener { cli: &cli };
    parse_file(&cli.pcap, &mut listener, &options)?;
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
