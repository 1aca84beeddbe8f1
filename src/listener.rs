//! Event driven parsing
//!
//! [parse] reads a capture and hands the header and then every record, in file
//! order, to a [PcapListener]. The tools in [crate::tools] are all listeners.
use std::{
    io::Read,
    ops::ControlFlow,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    io::open_source,
    pcap::{
        PcapParseError, ReaderOptions, SyncPcapReader, file_header::PcapFileHeader,
        packet_header::PacketHeader,
    },
};

/// Receives the contents of a capture as it is read
///
/// Returning [ControlFlow::Break] from a callback stops the parse without an
/// error. [PcapListener::finish] is called exactly once when parsing ends, however it ends.
pub trait PcapListener {
    type Error: From<PcapParseError>;
    /// Called once, before any record
    fn on_header(&mut self, header: &PcapFileHeader) -> Result<ControlFlow<()>, Self::Error>;
    /// Called once per record in file order
    fn on_record(
        &mut self,
        header: PacketHeader,
        data: &[u8],
    ) -> Result<ControlFlow<()>, Self::Error>;
    /// Close or flush anything the listener opened
    fn finish(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub reader: ReaderOptions,
    /// Checked between records. Once set, parsing ends after the current record
    pub stop: Option<Arc<AtomicBool>>,
}
impl ParseOptions {
    pub fn strict() -> Self {
        Self {
            reader: ReaderOptions { strict: true },
            ..Default::default()
        }
    }
    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|stop| stop.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseOutcome {
    /// Records handed to the listener
    pub records: u64,
    /// The listener asked to stop before the end of the capture
    pub stopped_early: bool,
    /// The stop flag was raised before the end of the capture
    pub interrupted: bool,
}

/// Parses a capture from any reader
pub fn parse<R: Read, L: PcapListener>(
    reader: R,
    listener: &mut L,
    options: &ParseOptions,
) -> Result<ParseOutcome, L::Error> {
    let result = drive(reader, listener, options);
    let finished = listener.finish();
    let outcome = result?;
    finished?;
    tracing::debug!(
        records = outcome.records,
        interrupted = outcome.interrupted,
        "Finished parsing capture"
    );
    Ok(outcome)
}

/// Parses a capture file. Gzip compressed files are decompressed on the fly
pub fn parse_file<L: PcapListener>(
    path: impl AsRef<Path>,
    listener: &mut L,
    options: &ParseOptions,
) -> Result<ParseOutcome, L::Error> {
    let source = match open_source(path.as_ref()) {
        Ok(source) => source,
        Err(err) => {
            listener.finish()?;
            return Err(PcapParseError::from(err).into());
        }
    };
    parse(source, listener, options)
}

fn drive<R: Read, L: PcapListener>(
    reader: R,
    listener: &mut L,
    options: &ParseOptions,
) -> Result<ParseOutcome, L::Error> {
    let mut reader = SyncPcapReader::with_options(reader, options.reader)?;
    let mut outcome = ParseOutcome::default();
    if listener.on_header(reader.file_header())?.is_break() {
        outcome.stopped_early = true;
        return Ok(outcome);
    }
    loop {
        if options.stop_requested() {
            outcome.interrupted = true;
            break;
        }
        let Some((header, data)) = reader.next_packet()? else {
            break;
        };
        outcome.records += 1;
        if listener.on_record(header, data)?.is_break() {
            outcome.stopped_early = true;
            break;
        }
    }
    Ok(outcome)
}

/// Discards everything
#[derive(Debug, Default)]
pub struct DoNothingListener;
impl PcapListener for DoNothingListener {
    type Error = PcapParseError;
    fn on_header(&mut self, _: &PcapFileHeader) -> Result<ControlFlow<()>, Self::Error> {
        Ok(ControlFlow::Continue(()))
    }
    fn on_record(&mut self, _: PacketHeader, _: &[u8]) -> Result<ControlFlow<()>, Self::Error> {
        Ok(ControlFlow::Continue(()))
    }
}

/// Keeps the file header and every record header for later inspection
#[derive(Debug, Default)]
pub struct RecordingListener {
    header: Option<PcapFileHeader>,
    record_headers: Vec<PacketHeader>,
}
impl RecordingListener {
    /// `None` until a header has been parsed
    pub fn header(&self) -> Option<&PcapFileHeader> {
        self.header.as_ref()
    }
    pub fn record_headers(&self) -> &[PacketHeader] {
        &self.record_headers
    }
}
impl PcapListener for RecordingListener {
    type Error = PcapParseError;
    fn on_header(&mut self, header: &PcapFileHeader) -> Result<ControlFlow<()>, Self::Error> {
        if self.header.is_some() {
            tracing::warn!("Recording listener received a second file header, ignoring it");
        } else {
            self.header = Some(*header);
        }
        Ok(ControlFlow::Continue(()))
    }
    fn on_record(
        &mut self,
        header: PacketHeader,
        _: &[u8],
    ) -> Result<ControlFlow<()>, Self::Error> {
        self.record_headers.push(header);
        Ok(ControlFlow::Continue(()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::{Compression, write::GzEncoder};

    use super::*;
    use crate::test_helpers::{CaptureBuilder, udp_frame};

    fn three_records() -> Vec<u8> {
        CaptureBuilder::ethernet()
            .record(1, 10, &udp_frame([10, 0, 0, 1], [10, 0, 0, 2], b"a"))
            .record(2, 20, &udp_frame([10, 0, 0, 1], [10, 0, 0, 2], b"b"))
            .record(3, 30, &udp_frame([10, 0, 0, 2], [10, 0, 0, 1], b"c"))
            .build()
    }

    /// Stops after a fixed number of records and remembers whether it was finished
    #[derive(Default)]
    struct StopAfter {
        limit: usize,
        seen: usize,
        finished: usize,
    }
    impl PcapListener for StopAfter {
        type Error = PcapParseError;
        fn on_header(&mut self, _: &PcapFileHeader) -> Result<ControlFlow<()>, Self::Error> {
            Ok(ControlFlow::Continue(()))
        }
        fn on_record(
            &mut self,
            _: PacketHeader,
            _: &[u8],
        ) -> Result<ControlFlow<()>, Self::Error> {
            self.seen += 1;
            if self.seen >= self.limit {
                return Ok(ControlFlow::Break(()));
            }
            Ok(ControlFlow::Continue(()))
        }
        fn finish(&mut self) -> Result<(), Self::Error> {
            self.finished += 1;
            Ok(())
        }
    }

    #[test]
    fn recording_listener_sees_everything_in_order() -> anyhow::Result<()> {
        let capture = three_records();
        let mut listener = RecordingListener::default();
        let outcome = parse(capture.as_slice(), &mut listener, &ParseOptions::default())?;
        assert_eq!(outcome.records, 3);
        assert!(!outcome.interrupted && !outcome.stopped_early);
        assert!(listener.header().is_some_and(|h| h.is_magic_valid()));
        let seconds: Vec<u32> = listener.record_headers().iter().map(|h| h.ts_sec()).collect();
        assert_eq!(seconds, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn early_stop_still_finishes() -> anyhow::Result<()> {
        let capture = three_records();
        let mut listener = StopAfter {
            limit: 2,
            ..Default::default()
        };
        let outcome = parse(capture.as_slice(), &mut listener, &ParseOptions::default())?;
        assert_eq!(outcome.records, 2);
        assert!(outcome.stopped_early);
        assert_eq!(listener.finished, 1);
        Ok(())
    }

    #[test]
    fn errors_still_finish() {
        let mut capture = three_records();
        capture.truncate(capture.len() - 1);
        let mut listener = StopAfter {
            limit: 10,
            ..Default::default()
        };
        let result = parse(capture.as_slice(), &mut listener, &ParseOptions::default());
        assert!(matches!(result, Err(PcapParseError::ShortRead { .. })));
        assert_eq!(listener.seen, 2);
        assert_eq!(listener.finished, 1);
    }

    #[test]
    fn stop_flag_interrupts_between_records() -> anyhow::Result<()> {
        let capture = three_records();
        let stop = Arc::new(AtomicBool::new(true));
        let options = ParseOptions {
            stop: Some(stop),
            ..Default::default()
        };
        let mut listener = RecordingListener::default();
        let outcome = parse(capture.as_slice(), &mut listener, &options)?;
        assert!(outcome.interrupted);
        assert_eq!(outcome.records, 0);
        assert!(listener.header().is_some());
        Ok(())
    }

    #[test]
    fn parse_file_reads_gzip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("capture.pcap.gz");
        let mut encoder = GzEncoder::new(std::fs::File::create(&path)?, Compression::default());
        encoder.write_all(&three_records())?;
        encoder.finish()?;

        let mut listener = RecordingListener::default();
        let outcome = parse_file(&path, &mut listener, &ParseOptions::default())?;
        assert_eq!(outcome.records, 3);
        Ok(())
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let mut listener = StopAfter::default();
        let result = parse_file("/nonexistent/capture.pcap", &mut listener, &ParseOptions::default());
        assert!(matches!(result, Err(PcapParseError::IO(_))));
        assert_eq!(listener.finished, 1);
    }
}
