use std::{collections::VecDeque, fmt::Write as _, ops::ControlFlow};

use chrono::{
    DateTime, Utc,
    format::{Item, StrftimeItems},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    io::{FileSinkFactory, SinkFactory},
    listener::PcapListener,
    pcap::{SyncPcapWriter, file_header::PcapFileHeader, packet_header::PacketHeader},
    tools::{OutputOptions, ToolError, Truncation, check_fraction, close_output, start_output},
};

/// Settings for [FilterListener]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterConfig {
    /// Output file name, formatted through strftime with each record's UTC timestamp.
    /// A new file is started whenever the formatted name changes
    pub output: String,
    pub output_options: OutputOptions,
    pub truncation: Truncation,
    /// Inclusive bounds in nanoseconds since the epoch
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub drop_fraction: f64,
    pub duplicate_fraction: f64,
    /// Chance of replacing each kept byte with a random one
    pub randomization_fraction: f64,
    /// Number of previous payloads compared against. 0 disables deduplication
    pub deduplication_window: usize,
    /// Reject captures whose link type differs
    pub required_link_type: Option<u32>,
    /// Rewrite the link type of the output. Original lengths then follow the kept bytes
    pub link_type: Option<u32>,
    pub time_shift_seconds: Option<i64>,
    /// Write only the file header
    pub no_records: bool,
    pub require_valid_magic: bool,
}
impl FilterConfig {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.output.is_empty() {
            return Err(ToolError::InvalidConfig("No output given".to_owned()));
        }
        if StrftimeItems::new(&self.output).any(|item| matches!(item, Item::Error)) {
            return Err(ToolError::InvalidConfig(format!(
                "Invalid time format in output {:?}",
                self.output
            )));
        }
        check_fraction("Drop fraction", self.drop_fraction)?;
        check_fraction("Duplicate fraction", self.duplicate_fraction)?;
        check_fraction("Data randomization fraction", self.randomization_fraction)?;
        if let (Some(start), Some(end)) = (self.start, self.end)
            && start > end
        {
            return Err(ToolError::InvalidConfig(format!(
                "Start {start} is after end {end}"
            )));
        }
        Ok(())
    }
}

/// Counters reported by [FilterListener]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterStats {
    pub read: u64,
    pub outside_time_window: u64,
    pub dropped: u64,
    pub duplicates_removed: u64,
    pub written: u64,
    pub duplicated: u64,
    pub outputs_opened: u64,
}

/// Filters, edits and rolls a capture into one or more outputs
///
/// Per record, in order: time window, random drop, deduplication, output
/// rolling, truncation, time shift, byte randomization, write and random
/// duplication.
pub struct FilterListener<F: SinkFactory = FileSinkFactory, R: Rng = StdRng> {
    config: FilterConfig,
    factory: F,
    rng: R,
    header: Option<PcapFileHeader>,
    output: Option<(String, SyncPcapWriter<F::Sink>)>,
    window: VecDeque<Vec<u8>>,
    stats: FilterStats,
}
impl FilterListener {
    /// Writes files relative to the working directory
    pub fn new(config: FilterConfig) -> Result<Self, ToolError> {
        let factory = FileSinkFactory::new(config.output_options.append);
        Self::with_parts(config, factory, StdRng::from_os_rng())
    }
}
impl<F: SinkFactory, R: Rng> FilterListener<F, R> {
    pub fn with_parts(config: FilterConfig, factory: F, rng: R) -> Result<Self, ToolError> {
        config.validate()?;
        Ok(Self {
            window: VecDeque::new(),
            config,
            factory,
            rng,
            header: None,
            output: None,
            stats: FilterStats::default(),
        })
    }
    pub fn stats(&self) -> FilterStats {
        self.stats
    }
    /// The header written to outputs, once the input header has been seen
    pub fn output_header(&self) -> Option<&PcapFileHeader> {
        self.header.as_ref()
    }

    fn in_time_window(&self, epoch_nanos: u64) -> bool {
        self.config.start.is_none_or(|start| epoch_nanos >= start)
            && self.config.end.is_none_or(|end| epoch_nanos <= end)
    }
    /// Always remembers `data`, returns whether it was already in the window
    fn seen_recently(&mut self, data: &[u8]) -> bool {
        let window = self.config.deduplication_window;
        if window == 0 {
            return false;
        }
        let found = self.window.iter().any(|previous| previous.as_slice() == data);
        self.window.push_back(data.to_vec());
        if self.window.len() > window {
            self.window.pop_front();
        }
        found
    }
    /// Makes sure the output for `name` is the open one
    fn roll_to(&mut self, name: String, header: PcapFileHeader) -> Result<(), ToolError> {
        if self
            .output
            .as_ref()
            .is_some_and(|(current, _)| *current == name)
        {
            return Ok(());
        }
        if let Some((previous, writer)) = self.output.take() {
            tracing::debug!(output = %previous, "Rolling output");
            close_output(writer)?;
        }
        let sink = self.factory.open(&name)?;
        let writer = start_output(sink, header, self.config.output_options)?;
        self.stats.outputs_opened += 1;
        self.output = Some((name, writer));
        Ok(())
    }
}

impl<F: SinkFactory, R: Rng> PcapListener for FilterListener<F, R> {
    type Error = ToolError;

    fn on_header(&mut self, header: &PcapFileHeader) -> Result<ControlFlow<()>, Self::Error> {
        if self.config.require_valid_magic && !header.is_magic_valid() {
            return Err(ToolError::InvalidMagic(header.magic_number()));
        }
        if let Some(expected) = self.config.required_link_type
            && expected != header.network()
        {
            return Err(ToolError::LinkTypeMismatch {
                expected,
                got: header.network(),
            });
        }
        let mut output_header = *header;
        output_header.set_snap_length(
            self.config
                .truncation
                .output_snap_length(header.snap_length()),
        );
        if let Some(link_type) = self.config.link_type {
            output_header.set_network(link_type);
        }
        self.header = Some(output_header);

        if self.config.no_records {
            // No record timestamps to format with, so the epoch names the file
            let name = format_output_name(&self.config.output, DateTime::<Utc>::default())?;
            self.roll_to(name, output_header)?;
            return Ok(ControlFlow::Break(()));
        }
        Ok(ControlFlow::Continue(()))
    }

    fn on_record(
        &mut self,
        mut record: PacketHeader,
        data: &[u8],
    ) -> Result<ControlFlow<()>, Self::Error> {
        let header = self.header.ok_or(ToolError::MissingHeader)?;
        self.stats.read += 1;

        if !self.in_time_window(record.epoch_nanos()) {
            self.stats.outside_time_window += 1;
            return Ok(ControlFlow::Continue(()));
        }
        if self.config.drop_fraction > 0.0 && self.rng.random::<f64>() < self.config.drop_fraction
        {
            self.stats.dropped += 1;
            return Ok(ControlFlow::Continue(()));
        }
        if self.seen_recently(data) {
            self.stats.duplicates_removed += 1;
            return Ok(ControlFlow::Continue(()));
        }

        let timestamp = record
            .timestamp_datetime()
            .ok_or(ToolError::TimestampOutOfRange {
                ts_sec: record.ts_sec(),
                shift: 0,
            })?;
        let name = format_output_name(&self.config.output, timestamp)?;
        self.roll_to(name, header)?;

        let kept = self.config.truncation.apply(data);
        record.set_include_len(kept.len() as u32);
        if self.config.link_type.is_some() {
            record.set_orig_len(kept.len() as u32);
        }
        if let Some(shift) = self.config.time_shift_seconds {
            record = record
                .shifted(shift)
                .ok_or(ToolError::TimestampOutOfRange {
                    ts_sec: record.ts_sec(),
                    shift,
                })?;
        }

        let randomized;
        let kept = if self.config.randomization_fraction > 0.0 {
            let mut copy = kept.to_vec();
            randomize_bytes(&mut copy, self.config.randomization_fraction, &mut self.rng);
            randomized = copy;
            randomized.as_slice()
        } else {
            kept
        };
        let duplicate = self.config.duplicate_fraction > 0.0
            && self.rng.random::<f64>() < self.config.duplicate_fraction;

        let Some((_, writer)) = self.output.as_mut() else {
            return Err(ToolError::MissingHeader);
        };
        writer.write_packet(&record, kept)?;
        self.stats.written += 1;
        if duplicate {
            writer.write_packet(&record, kept)?;
            self.stats.duplicated += 1;
        }
        Ok(ControlFlow::Continue(()))
    }

    fn finish(&mut self) -> Result<(), Self::Error> {
        if let Some((name, writer)) = self.output.take() {
            tracing::debug!(output = %name, "Closing output");
            close_output(writer)?;
        }
        tracing::info!(
            read = self.stats.read,
            written = self.stats.written,
            outputs = self.stats.outputs_opened,
            "Filter finished"
        );
        Ok(())
    }
}

/// Replaces each byte with a uniformly random one with probability `fraction`
pub fn randomize_bytes<R: Rng>(data: &mut [u8], fraction: f64, rng: &mut R) {
    for byte in data {
        if rng.random::<f64>() < fraction {
            *byte = rng.random();
        }
    }
}

fn format_output_name(pattern: &str, timestamp: DateTime<Utc>) -> Result<String, ToolError> {
    let mut name = String::with_capacity(pattern.len());
    write!(name, "{}", timestamp.format(pattern))
        .map_err(|_| ToolError::InvalidConfig(format!("Cannot format output {pattern:?}")))?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{
        listener::{ParseOptions, parse},
        pcap::file_header::MagicNumber,
        test_helpers::{CaptureBuilder, read_capture, udp_frame},
    };

    const SECOND: u64 = 1_000_000_000;

    fn frame(tag: u8) -> Vec<u8> {
        udp_frame([10, 0, 0, 1], [10, 0, 0, 2], &[tag; 16])
    }

    fn run(dir: &Path, config: FilterConfig, capture: &[u8]) -> anyhow::Result<FilterStats> {
        let factory = FileSinkFactory::in_directory(dir, config.output_options.append);
        let mut listener = FilterListener::with_parts(config, factory, StdRng::seed_from_u64(7))?;
        parse(capture, &mut listener, &ParseOptions::default())?;
        Ok(listener.stats())
    }

    #[test]
    fn time_window_is_inclusive() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let capture = CaptureBuilder::ethernet()
            .record(1, 0, &frame(1))
            .record(2, 0, &frame(2))
            .record(3, 0, &frame(3))
            .record(3, 1, &frame(4))
            .build();
        let config = FilterConfig {
            start: Some(2 * SECOND),
            end: Some(3 * SECOND),
            ..FilterConfig::new("out.pcap")
        };
        let stats = run(dir.path(), config, &capture)?;
        assert_eq!(stats.outside_time_window, 2);
        let (_, records) = read_capture(dir.path().join("out.pcap"))?;
        let seconds: Vec<u32> = records.iter().map(|r| r.header.ts_sec()).collect();
        assert_eq!(seconds, vec![2, 3]);
        Ok(())
    }

    #[test]
    fn deduplication_window() -> anyhow::Result<()> {
        let capture = CaptureBuilder::ethernet()
            .record(1, 0, &frame(b'A'))
            .record(2, 0, &frame(b'B'))
            .record(3, 0, &frame(b'A'))
            .build();
        for (window, expected) in [(2, 2), (1, 3), (0, 3), (usize::MAX, 2)] {
            let dir = tempfile::tempdir()?;
            let config = FilterConfig {
                deduplication_window: window,
                ..FilterConfig::new("out.pcap")
            };
            let stats = run(dir.path(), config, &capture)?;
            assert_eq!(stats.written, expected, "window {window}");
            let (_, records) = read_capture(dir.path().join("out.pcap"))?;
            assert_eq!(records.len() as u64, expected);
        }
        Ok(())
    }

    #[test]
    fn truncation_and_link_type_override() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let data = frame(9);
        let capture = CaptureBuilder::ethernet().record(1, 0, &data).build();

        let config = FilterConfig {
            truncation: Truncation {
                snap_length: 20,
                data_offset: 14,
                ..Default::default()
            },
            ..FilterConfig::new("kept.pcap")
        };
        run(dir.path(), config.clone(), &capture)?;
        let (header, records) = read_capture(dir.path().join("kept.pcap"))?;
        assert_eq!(header.snap_length(), 20);
        assert_eq!(header.network(), 1);
        assert_eq!(records[0].data, &data[14..34]);
        assert_eq!(records[0].header.include_len(), 20);
        assert_eq!(records[0].header.orig_len(), data.len() as u32);

        let config = FilterConfig {
            link_type: Some(228),
            ..config.clone()
        };
        run(dir.path(), FilterConfig { output: "ipv4.pcap".to_owned(), ..config }, &capture)?;
        let (header, records) = read_capture(dir.path().join("ipv4.pcap"))?;
        assert_eq!(header.network(), 228);
        assert_eq!(records[0].header.orig_len(), 20);
        Ok(())
    }

    #[test]
    fn drop_and_duplicate_everything() -> anyhow::Result<()> {
        let capture = CaptureBuilder::ethernet()
            .record(1, 0, &frame(1))
            .record(2, 0, &frame(2))
            .build();

        let dir = tempfile::tempdir()?;
        let config = FilterConfig {
            drop_fraction: 1.0,
            ..FilterConfig::new("out.pcap")
        };
        let stats = run(dir.path(), config, &capture)?;
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.outputs_opened, 0);
        assert!(!dir.path().join("out.pcap").exists());

        let config = FilterConfig {
            duplicate_fraction: 1.0,
            ..FilterConfig::new("out.pcap")
        };
        run(dir.path(), config, &capture)?;
        let (_, records) = read_capture(dir.path().join("out.pcap"))?;
        let seconds: Vec<u32> = records.iter().map(|r| r.header.ts_sec()).collect();
        assert_eq!(seconds, vec![1, 1, 2, 2]);
        Ok(())
    }

    #[test]
    fn randomization_keeps_lengths() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let data = frame(0);
        let capture = CaptureBuilder::ethernet().record(1, 0, &data).build();
        let config = FilterConfig {
            randomization_fraction: 1.0,
            duplicate_fraction: 1.0,
            ..FilterConfig::new("out.pcap")
        };
        run(dir.path(), config, &capture)?;
        let (_, records) = read_capture(dir.path().join("out.pcap"))?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].data.len(), data.len());
        assert_ne!(records[0].data, data);
        // The duplicate repeats the randomized bytes
        assert_eq!(records[0], records[1]);
        Ok(())
    }

    #[test]
    fn randomize_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut data = *b"1234567890";
        randomize_bytes(&mut data, 0.0, &mut rng);
        assert_eq!(&data, b"1234567890");
        let mut empty: [u8; 0] = [];
        randomize_bytes(&mut empty, 0.5, &mut rng);
    }

    #[test]
    fn rolls_outputs_by_time() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        // 2016-05-13 22:44:05 UTC and one hour later
        let capture = CaptureBuilder::ethernet()
            .record(1_463_179_445, 0, &frame(1))
            .record(1_463_179_446, 0, &frame(2))
            .record(1_463_183_045, 0, &frame(3))
            .build();
        let stats = run(dir.path(), FilterConfig::new("%Y/%m/%d/%H.pcap"), &capture)?;
        assert_eq!(stats.outputs_opened, 2);
        let (header, first) = read_capture(dir.path().join("2016/05/13/22.pcap"))?;
        assert!(header.is_magic_valid());
        assert_eq!(first.len(), 2);
        let (_, second) = read_capture(dir.path().join("2016/05/13/23.pcap"))?;
        assert_eq!(second.len(), 1);
        Ok(())
    }

    #[test]
    fn append_never_repeats_the_header() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let capture = CaptureBuilder::ethernet().record(1, 0, &frame(1)).build();
        let config = FilterConfig {
            output_options: OutputOptions {
                append: true,
                no_header: false,
            },
            ..FilterConfig::new("out.pcap")
        };
        run(dir.path(), config.clone(), &capture)?;
        run(dir.path(), config, &capture)?;
        let (_, records) = read_capture(dir.path().join("out.pcap"))?;
        assert_eq!(records.len(), 2);
        Ok(())
    }

    #[test]
    fn header_checks_and_edits() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let capture = CaptureBuilder::ethernet().record(10, 0, &frame(1)).build();
        let config = FilterConfig {
            required_link_type: Some(228),
            ..FilterConfig::new("out.pcap")
        };
        assert!(matches!(
            run(dir.path(), config, &capture)
                .unwrap_err()
                .downcast::<ToolError>()?,
            ToolError::LinkTypeMismatch {
                expected: 228,
                got: 1
            }
        ));

        let config = FilterConfig {
            time_shift_seconds: Some(-4),
            ..FilterConfig::new("shifted.pcap")
        };
        run(dir.path(), config, &capture)?;
        let (_, records) = read_capture(dir.path().join("shifted.pcap"))?;
        assert_eq!(records[0].header.ts_sec(), 6);

        let config = FilterConfig {
            time_shift_seconds: Some(-11),
            ..FilterConfig::new("broken.pcap")
        };
        let err = run(dir.path(), config, &capture).unwrap_err();
        assert!(matches!(
            err.downcast::<ToolError>()?,
            ToolError::TimestampOutOfRange { ts_sec: 10, shift: -11 }
        ));
        Ok(())
    }

    #[test]
    fn header_only_output() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let header = PcapFileHeader::new(MagicNumber::Nanosecond, 65535, 1);
        let capture = CaptureBuilder::new(header).record(1, 0, &frame(1)).build();
        let config = FilterConfig {
            no_records: true,
            ..FilterConfig::new("header.pcap")
        };
        let stats = run(dir.path(), config, &capture)?;
        assert_eq!(stats.read, 0);
        let (written, records) = read_capture(dir.path().join("header.pcap"))?;
        assert_eq!(written, header);
        assert!(records.is_empty());
        Ok(())
    }

    #[test]
    fn config_validation() {
        assert!(FilterConfig::new("out.pcap").validate().is_ok());
        assert!(FilterConfig::default().validate().is_err());
        assert!(FilterConfig::new("%Y-%Q.pcap").validate().is_err());
        let config = FilterConfig {
            drop_fraction: 1.5,
            ..FilterConfig::new("out.pcap")
        };
        assert!(config.validate().is_err());
        let config = FilterConfig {
            start: Some(10),
            end: Some(5),
            ..FilterConfig::new("out.pcap")
        };
        assert!(config.validate().is_err());
    }
}
