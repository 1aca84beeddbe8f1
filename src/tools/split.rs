use std::ops::ControlFlow;

use crate::{
    io::{FileSinkFactory, SinkFactory},
    listener::PcapListener,
    pcap::{SyncPcapWriter, file_header::PcapFileHeader, packet_header::PacketHeader},
    tools::{OutputOptions, ToolError, Truncation, close_output, start_output},
};

/// Settings for [SplitListener]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitConfig {
    /// Largest number of record bytes (as captured) in one slice
    pub max_bytes: Option<u64>,
    /// Largest number of records in one slice
    pub max_packets: Option<u64>,
    /// Name slices `N.pcap.gz` instead of `N.pcap`
    pub gzip_output: bool,
    pub output_options: OutputOptions,
    pub truncation: Truncation,
}
impl SplitConfig {
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.max_bytes == Some(0) {
            return Err(ToolError::InvalidConfig(
                "Maximum bytes per slice must be a positive integer".to_owned(),
            ));
        }
        if self.max_packets == Some(0) {
            return Err(ToolError::InvalidConfig(
                "Maximum packets per slice must be a positive integer".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Splits a capture into numbered slices limited by size and record count
///
/// A record that alone exceeds the byte limit still gets a slice of its own.
pub struct SplitListener<F: SinkFactory = FileSinkFactory> {
    config: SplitConfig,
    factory: F,
    header: Option<PcapFileHeader>,
    output: Option<SyncPcapWriter<F::Sink>>,
    slice_number: u64,
    slice_packets: u64,
    slice_bytes: u64,
}
impl<F: SinkFactory> SplitListener<F> {
    pub fn new(config: SplitConfig, factory: F) -> Result<Self, ToolError> {
        config.validate()?;
        Ok(Self {
            config,
            factory,
            header: None,
            output: None,
            slice_number: 0,
            slice_packets: 0,
            slice_bytes: 0,
        })
    }
    /// Number of slices opened so far
    pub fn slices(&self) -> u64 {
        self.slice_number
    }
    pub fn slice_name(&self, number: u64) -> String {
        if self.config.gzip_output {
            format!("{number}.pcap.gz")
        } else {
            format!("{number}.pcap")
        }
    }
    fn next_slice(&mut self) -> Result<(), ToolError> {
        if let Some(writer) = self.output.take() {
            close_output(writer)?;
        }
        self.slice_packets = 0;
        self.slice_bytes = 0;
        Ok(())
    }
}
impl SplitListener {
    /// Writes slices into `directory`
    pub fn in_directory(
        config: SplitConfig,
        directory: impl Into<std::path::PathBuf>,
    ) -> Result<Self, ToolError> {
        let factory = FileSinkFactory::in_directory(directory, config.output_options.append);
        Self::new(config, factory)
    }
}

impl<F: SinkFactory> PcapListener for SplitListener<F> {
    type Error = ToolError;

    fn on_header(&mut self, header: &PcapFileHeader) -> Result<ControlFlow<()>, Self::Error> {
        let mut output_header = *header;
        output_header.set_snap_length(
            self.config
                .truncation
                .output_snap_length(header.snap_length()),
        );
        self.header = Some(output_header);
        Ok(ControlFlow::Continue(()))
    }

    fn on_record(
        &mut self,
        mut record: PacketHeader,
        data: &[u8],
    ) -> Result<ControlFlow<()>, Self::Error> {
        let header = self.header.ok_or(ToolError::MissingHeader)?;
        let include_len = record.include_len() as u64;
        let out_of_bytes = self
            .config
            .max_bytes
            .is_some_and(|max| max < self.slice_bytes + include_len);
        let out_of_packets = self
            .config
            .max_packets
            .is_some_and(|max| max < self.slice_packets + 1);
        if (out_of_bytes || out_of_packets) && self.slice_packets > 0 {
            self.next_slice()?;
        }
        self.slice_bytes += include_len;
        self.slice_packets += 1;

        let writer = if let Some(writer) = self.output.as_mut() {
            writer
        } else {
            let name = self.slice_name(self.slice_number);
            tracing::debug!(slice = self.slice_number, "Starting slice");
            let sink = self.factory.open(&name)?;
            self.slice_number += 1;
            self.output
                .insert(start_output(sink, header, self.config.output_options)?)
        };
        let kept = self.config.truncation.apply(data);
        record.set_include_len(kept.len() as u32);
        writer.write_packet(&record, kept)?;
        Ok(ControlFlow::Continue(()))
    }

    fn finish(&mut self) -> Result<(), Self::Error> {
        if let Some(writer) = self.output.take() {
            close_output(writer)?;
        }
        tracing::info!(slices = self.slices(), "Split finished");
        Ok(())
    }
}
