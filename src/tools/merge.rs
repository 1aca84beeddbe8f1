use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    io::{Read, Write},
    path::Path,
};

use crate::{
    io::{OutputSink, PcapSink, open_source},
    pcap::{ReaderOptions, Record, Records, SyncPcapWriter, open_reader},
    tools::ToolError,
};

/// Settings for [merge]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeConfig {
    pub reader: ReaderOptions,
    /// Reject inputs whose link type differs from the first input
    pub require_same_link_type: bool,
    pub require_valid_magic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// Records written from each input, in input order
    pub records_per_input: Vec<u64>,
}
impl MergeOutcome {
    pub fn records(&self) -> u64 {
        self.records_per_input.iter().sum()
    }
}

/// Merges time ordered captures into one time ordered capture
///
/// Holds one pending record per input and always writes the earliest, comparing
/// timestamps in nanoseconds so inputs of different resolution mix. Equal
/// timestamps are written in input order. Once an input ends the others are
/// drained in their own order. The output takes the first input's file header,
/// and records from other inputs are converted to its resolution.
///
/// Inputs are assumed, not checked, to be ordered themselves.
pub fn merge<R: Read, W: Write>(
    inputs: Vec<R>,
    output: W,
    config: &MergeConfig,
) -> Result<(W, MergeOutcome), ToolError> {
    if inputs.is_empty() {
        return Err(ToolError::InvalidConfig("No inputs to merge".to_owned()));
    }
    let mut streams = Vec::with_capacity(inputs.len());
    for input in inputs {
        let (header, records) = open_reader(input, config.reader)?;
        if config.require_valid_magic && !header.is_magic_valid() {
            return Err(ToolError::InvalidMagic(header.magic_number()));
        }
        streams.push(records);
    }
    let output_header = *streams[0].file_header();
    if config.require_same_link_type {
        for stream in &streams[1..] {
            let network = stream.file_header().network();
            if network != output_header.network() {
                return Err(ToolError::LinkTypeMismatch {
                    expected: output_header.network(),
                    got: network,
                });
            }
        }
    }
    for (index, stream) in streams.iter().enumerate().skip(1) {
        if stream.file_header().resolution() != output_header.resolution() {
            tracing::warn!(
                input = index,
                "Input resolution {:?} differs from output resolution {:?}, timestamps will be converted",
                stream.file_header().resolution(),
                output_header.resolution()
            );
        }
    }

    let mut writer = SyncPcapWriter::new(output, output_header)?;
    let mut outcome = MergeOutcome {
        records_per_input: vec![0; streams.len()],
    };
    if let Err(err) = merge_records(&mut streams, &mut writer, &mut outcome) {
        // Whatever was written is complete records, keep it
        if let Err(flush_err) = writer.finish() {
            tracing::warn!("Failed to flush partial merge output: {flush_err}");
        }
        return Err(err);
    }
    tracing::info!(records = outcome.records(), "Merge finished");
    Ok((writer.finish()?, outcome))
}

fn merge_records<R: Read, W: Write>(
    streams: &mut [Records<R>],
    writer: &mut SyncPcapWriter<W>,
    outcome: &mut MergeOutcome,
) -> Result<(), ToolError> {
    let mut pending: Vec<Option<Record>> = Vec::with_capacity(streams.len());
    // Min heap on (timestamp, input index) so ties favour the earlier input
    let mut heap = BinaryHeap::with_capacity(streams.len());
    for (index, stream) in streams.iter_mut().enumerate() {
        let next = stream.next().transpose()?;
        if let Some(record) = &next {
            heap.push(Reverse((record.header.epoch_nanos(), index)));
        }
        pending.push(next);
    }
    while let Some(Reverse((_, index))) = heap.pop() {
        if let Some(record) = pending[index].take() {
            writer.write_record(&record)?;
            outcome.records_per_input[index] += 1;
        }
        if let Some(record) = streams[index].next().transpose()? {
            heap.push(Reverse((record.header.epoch_nanos(), index)));
            pending[index] = Some(record);
        }
    }
    Ok(())
}

/// [merge] for files. Inputs may be gzip compressed, the output is compressed
/// when its name ends in `.gz`
pub fn merge_files<P: AsRef<Path>>(
    inputs: &[P],
    output: impl AsRef<Path>,
    config: &MergeConfig,
) -> Result<MergeOutcome, ToolError> {
    let sources = inputs
        .iter()
        .map(|input| open_source(input.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    let sink = OutputSink::create(output.as_ref(), false)?;
    let (sink, outcome) = merge(sources, sink, config)?;
    sink.close()?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        byte_order::Endianness,
        pcap::file_header::{MagicNumber, PcapFileHeader, TimeResolution},
        test_helpers::{CaptureBuilder, ipv4_header, read_capture},
    };

    fn seconds_of(capture: &[u8]) -> anyhow::Result<Vec<u32>> {
        let (_, records) = open_reader(capture, ReaderOptions::default())?;
        Ok(records
            .map(|record| record.map(|record| record.header.ts_sec()))
            .collect::<Result<_, _>>()?)
    }

    #[test]
    fn merge_two_interleaved() -> anyhow::Result<()> {
        let first = CaptureBuilder::ethernet().record(1, 0, b"a").record(3, 0, b"c").build();
        let second = CaptureBuilder::ethernet().record(2, 0, b"b").record(4, 0, b"d").build();
        let (output, outcome) = merge(
            vec![first.as_slice(), second.as_slice()],
            Vec::new(),
            &MergeConfig::default(),
        )?;
        assert_eq!(seconds_of(&output)?, vec![1, 2, 3, 4]);
        assert_eq!(outcome.records_per_input, vec![2, 2]);
        let (_, records) = open_reader(output.as_slice(), ReaderOptions::default())?;
        let data: Vec<Vec<u8>> = records.map(|r| r.map(|r| r.data)).collect::<Result<_, _>>()?;
        assert_eq!(data, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
        Ok(())
    }

    #[test]
    fn ties_go_to_the_earlier_input_and_leftovers_drain() -> anyhow::Result<()> {
        let first = CaptureBuilder::ethernet().record(5, 0, b"first").build();
        let second = CaptureBuilder::ethernet()
            .record(5, 0, b"second")
            .record(6, 0, b"x")
            .record(7, 0, b"y")
            .build();
        let (output, _) = merge(
            vec![second.as_slice(), first.as_slice()],
            Vec::new(),
            &MergeConfig::default(),
        )?;
        let (_, records) = open_reader(output.as_slice(), ReaderOptions::default())?;
        let data: Vec<Vec<u8>> = records.map(|r| r.map(|r| r.data)).collect::<Result<_, _>>()?;
        assert_eq!(data[0], b"second");
        assert_eq!(data[1], b"first");
        assert_eq!(data.len(), 4);
        Ok(())
    }

    #[test]
    fn three_inputs_with_shared_timestamp() -> anyhow::Result<()> {
        let first = CaptureBuilder::ethernet().record(2, 0, b"a2").record(9, 0, b"a9").build();
        let second = CaptureBuilder::ethernet().record(1, 0, b"b1").record(2, 0, b"b2").build();
        let third = CaptureBuilder::ethernet()
            .record(2, 0, b"c2")
            .record(3, 0, b"c3")
            .record(10, 0, b"c10")
            .build();
        let (output, outcome) = merge(
            vec![first.as_slice(), second.as_slice(), third.as_slice()],
            Vec::new(),
            &MergeConfig::default(),
        )?;
        assert_eq!(outcome.records_per_input, vec![2, 2, 3]);
        let (_, records) = open_reader(output.as_slice(), ReaderOptions::default())?;
        let data: Vec<Vec<u8>> = records.map(|r| r.map(|r| r.data)).collect::<Result<_, _>>()?;
        let expected = ["b1", "a2", "b2", "c2", "c3", "a9", "c10"].map(|s| s.as_bytes().to_vec());
        assert_eq!(data, expected);
        Ok(())
    }

    #[test]
    fn mixed_resolutions_and_byte_orders() -> anyhow::Result<()> {
        let nano = PcapFileHeader::new(MagicNumber::Nanosecond, 65535, 1)
            .with_endianness(Endianness::native().swapped());
        let first = CaptureBuilder::new(nano).record(1, 500_000_000, b"a").build();
        // 1.25s and 1.75s in microseconds
        let second = CaptureBuilder::ethernet()
            .record(1, 250_000, b"b")
            .record(1, 750_000, b"c")
            .build();
        let (output, _) = merge(
            vec![first.as_slice(), second.as_slice()],
            Vec::new(),
            &MergeConfig::default(),
        )?;
        let (header, records) = open_reader(output.as_slice(), ReaderOptions::default())?;
        assert_eq!(header.resolution(), TimeResolution::Nanosecond);
        assert_eq!(header.endianness(), Endianness::native().swapped());
        let fractions: Vec<u32> = records
            .map(|r| r.map(|r| r.header.ts_frac()))
            .collect::<Result<_, _>>()?;
        assert_eq!(fractions, vec![250_000_000, 500_000_000, 750_000_000]);
        Ok(())
    }

    #[test]
    fn link_type_policy() -> anyhow::Result<()> {
        let ethernet = CaptureBuilder::ethernet().record(1, 0, b"a").build();
        let ipv4 = CaptureBuilder::new(ipv4_header()).record(2, 0, b"b").build();
        let (output, _) = merge(
            vec![ethernet.as_slice(), ipv4.as_slice()],
            Vec::new(),
            &MergeConfig::default(),
        )?;
        let (header, _) = open_reader(output.as_slice(), ReaderOptions::default())?;
        assert_eq!(header.network(), 1);

        let config = MergeConfig {
            require_same_link_type: true,
            ..Default::default()
        };
        let result = merge(vec![ethernet.as_slice(), ipv4.as_slice()], Vec::new(), &config);
        assert!(matches!(
            result,
            Err(ToolError::LinkTypeMismatch {
                expected: 1,
                got: 228
            })
        ));
        Ok(())
    }

    #[test]
    fn invalid_inputs() {
        let empty: Vec<&[u8]> = Vec::new();
        assert!(matches!(
            merge(empty, Vec::new(), &MergeConfig::default()),
            Err(ToolError::InvalidConfig(_))
        ));

        let good = CaptureBuilder::ethernet().record(1, 0, b"a").build();
        let mut broken = CaptureBuilder::ethernet().record(2, 0, b"bb").build();
        broken.pop();
        let result = merge(
            vec![good.as_slice(), broken.as_slice()],
            Vec::new(),
            &MergeConfig::default(),
        );
        assert!(matches!(result, Err(ToolError::Parse(_))));
    }

    #[test]
    fn merge_files_with_gzip_output() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let first = dir.path().join("first.pcap");
        let second = dir.path().join("second.pcap");
        std::fs::write(&first, CaptureBuilder::ethernet().record(1, 0, b"a").build())?;
        std::fs::write(&second, CaptureBuilder::ethernet().record(0, 0, b"b").build())?;
        let output = dir.path().join("merged.pcap.gz");
        let outcome = merge_files(&[&first, &second], &output, &MergeConfig::default())?;
        assert_eq!(outcome.records(), 2);
        let (_, records) = read_capture(&output)?;
        assert_eq!(records[0].data, b"b");
        Ok(())
    }
}
