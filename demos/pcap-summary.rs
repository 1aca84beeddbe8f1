use std::{
    path::PathBuf,
    sync::{Arc, atomic::AtomicBool, atomic::Ordering},
};

use clap::Parser;
use nano_pcap::{
    listener::{ParseOptions, parse_file},
    statistics::OrderStatistics,
    tools::{CaptureSummary, LineRate, SummaryListener},
    units::{UNITS_1000, UNITS_1024, UNITS_TIME, Unit, format_units},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(name = "pcap-summary", about = "Prints statistics about a capture")]
struct PcapSummary {
    input: PathBuf,
    #[clap(long)]
    strict: bool,
    /// How many of the most common byte values to list
    #[clap(short, long, default_value_t = 8)]
    common_bytes: usize,
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = PcapSummary::parse();
    init_logging(cli.verbose);

    let stop = Arc::new(AtomicBool::new(false));
    let mut options = if cli.strict {
        ParseOptions::strict()
    } else {
        ParseOptions::default()
    };
    options.stop = Some(stop.clone());

    let input = cli.input.clone();
    let mut parsing = tokio::task::spawn_blocking(move || {
        let mut listener = SummaryListener::default();
        let outcome = parse_file(&input, &mut listener, &options);
        outcome.map(|outcome| (outcome, listener.into_summary()))
    });
    let result = tokio::select! {
        result = &mut parsing => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, summarizing what was read");
            stop.store(true, Ordering::Relaxed);
            parsing.await
        }
    };
    let (outcome, mut summary) = result??;
    if outcome.interrupted {
        println!("(interrupted after {} records)", outcome.records);
    }
    print_summary(&cli, &mut summary);
    Ok(())
}

fn print_summary(cli: &PcapSummary, summary: &mut CaptureSummary) {
    if let Some(header) = &summary.header {
        println!(
            "Header: magic {:#010x} version {} snaplen {} network {}",
            header.magic_number(),
            header.version(),
            header.snap_length(),
            header.network()
        );
    }
    println!("Records: {}", summary.records());
    if summary.records() == 0 {
        return;
    }
    if let Some((first, last)) = summary.epoch_range() {
        println!(
            "Duration: {}",
            format_units((last - first) as f64, UNITS_TIME, 3)
        );
    }
    println!(
        "Included length: {}",
        describe(summary.included_lengths.average(), &mut summary.included_lengths_order, UNITS_1024, f64::from)
    );
    println!(
        "Original length: {}",
        describe(summary.original_lengths.average(), &mut summary.original_lengths_order, UNITS_1024, f64::from)
    );
    if summary.interpacket_ns.n() > 0 {
        println!(
            "Inter-packet gap: {} (stddev {})",
            describe(summary.interpacket_ns.average(), &mut summary.interpacket_ns_order, UNITS_TIME, |gap| gap as f64),
            format_units(summary.interpacket_ns.sample_stddev(), UNITS_TIME, 2)
        );
        println!(
            "Packet rate: {}pps average, {}pps peak",
            format_units(summary.average_packet_rate(), UNITS_1000, 2),
            format_units(summary.packet_rates.max().unwrap_or_default(), UNITS_1000, 2)
        );
    }
    match summary.min_line_rate() {
        Some(LineRate::Unbounded) => println!("Line rate: unbounded (records share a timestamp)"),
        Some(LineRate::Required {
            bits_per_second,
            peak_utilization,
        }) => println!(
            "Line rate: {}bps needed, peak at {:.1}%",
            format_units(bits_per_second, UNITS_1000, 0),
            peak_utilization * 100.0
        ),
        None => {}
    }
    let constant = summary.constant_offsets();
    if !constant.is_empty() {
        println!("Constant offsets: {constant:?}");
    }
    let common = summary
        .most_common_bytes(cli.common_bytes)
        .into_iter()
        .map(|(byte, count)| format!("{byte:02X}x{}", format_units(count as f64, UNITS_1000, 1)))
        .collect::<Vec<_>>();
    println!("Common bytes: {}", common.join(" "));
}

fn describe<T: Copy + PartialOrd>(
    average: f64,
    order: &mut OrderStatistics<T>,
    units: &[Unit],
    to_f64: impl Fn(T) -> f64,
) -> String {
    let format = |value: Option<T>| format_units(value.map(&to_f64).unwrap_or_default(), units, 1);
    format!(
        "min {} q1 {} median {} q3 {} max {} average {}",
        format(order.min()),
        format(order.q1()),
        format(order.median()),
        format(order.q3()),
        format(order.max()),
        format_units(average, units, 1)
    )
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
