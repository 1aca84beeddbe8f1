use std::{
    collections::{BTreeMap, btree_map::Entry},
    ops::ControlFlow,
};

use crate::{
    io::{FileSinkFactory, SinkFactory},
    link_type::LinkType,
    listener::PcapListener,
    pcap::{SyncPcapWriter, file_header::PcapFileHeader, packet_header::PacketHeader},
    protocols::{EthernetFrame, FlowKey, Ipv4Packet},
    tools::{OutputOptions, ToolError, Truncation, close_output, start_output},
};

/// Settings for [FlowSplitListener]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlowSplitConfig {
    /// Name flow files `KEY.pcap.gz` instead of `KEY.pcap`
    pub gzip_output: bool,
    pub output_options: OutputOptions,
    pub truncation: Truncation,
}

/// How flow keys are read from records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowLayer {
    /// MAC address pair
    Ethernet,
    /// IPv4 address pair
    Ipv4,
}
impl FlowLayer {
    fn for_network(network: u32) -> Option<Self> {
        match LinkType::try_from(network).ok()? {
            LinkType::Ethernet => Some(FlowLayer::Ethernet),
            LinkType::Ipv4 => Some(FlowLayer::Ipv4),
            _ => None,
        }
    }
    fn flow_key(self, data: &[u8]) -> Result<FlowKey, ToolError> {
        let key = match self {
            FlowLayer::Ethernet => EthernetFrame::new(data)?.flow_key(),
            FlowLayer::Ipv4 => Ipv4Packet::new(data)?.flow_key(),
        };
        Ok(key)
    }
}

/// Writes every conversation of a capture to its own file
///
/// Ethernet captures are keyed by MAC address pair, raw IPv4 captures by IP
/// address pair. Every output stays open until [PcapListener::finish].
pub struct FlowSplitListener<F: SinkFactory = FileSinkFactory> {
    config: FlowSplitConfig,
    factory: F,
    header: Option<(PcapFileHeader, FlowLayer)>,
    outputs: BTreeMap<FlowKey, SyncPcapWriter<F::Sink>>,
}
impl<F: SinkFactory> FlowSplitListener<F> {
    pub fn new(config: FlowSplitConfig, factory: F) -> Self {
        Self {
            config,
            factory,
            header: None,
            outputs: BTreeMap::new(),
        }
    }
    /// Flows seen so far
    pub fn flows(&self) -> impl Iterator<Item = &FlowKey> {
        self.outputs.keys()
    }
    pub fn flow_file_name(&self, key: &FlowKey) -> String {
        if self.config.gzip_output {
            format!("{key}.pcap.gz")
        } else {
            format!("{key}.pcap")
        }
    }
}
impl FlowSplitListener {
    /// Writes flow files into `directory`
    pub fn in_directory(config: FlowSplitConfig, directory: impl Into<std::path::PathBuf>) -> Self {
        let factory = FileSinkFactory::in_directory(directory, config.output_options.append);
        Self::new(config, factory)
    }
}

impl<F: SinkFactory> PcapListener for FlowSplitListener<F> {
    type Error = ToolError;

    fn on_header(&mut self, header: &PcapFileHeader) -> Result<ControlFlow<()>, Self::Error> {
        let layer = FlowLayer::for_network(header.network())
            .ok_or(ToolError::UnsupportedLinkType(header.network()))?;
        let mut output_header = *header;
        output_header.set_snap_length(
            self.config
                .truncation
                .output_snap_length(header.snap_length()),
        );
        self.header = Some((output_header, layer));
        Ok(ControlFlow::Continue(()))
    }

    fn on_record(
        &mut self,
        mut record: PacketHeader,
        data: &[u8],
    ) -> Result<ControlFlow<()>, Self::Error> {
        let (header, layer) = self.header.ok_or(ToolError::MissingHeader)?;
        let key = layer.flow_key(data)?;
        let name = self.flow_file_name(&key);
        let writer = match self.outputs.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                tracing::debug!(flow = %entry.key(), "New flow");
                let sink = self.factory.open(&name)?;
                entry.insert(start_output(sink, header, self.config.output_options)?)
            }
        };
        let kept = self.config.truncation.apply(data);
        record.set_include_len(kept.len() as u32);
        writer.write_packet(&record, kept)?;
        Ok(ControlFlow::Continue(()))
    }

    /// Closes every flow, reporting the first failure after trying them all
    fn finish(&mut self) -> Result<(), Self::Error> {
        let flows = self.outputs.len();
        let mut result = Ok(());
        for (key, writer) in std::mem::take(&mut self.outputs) {
            if let Err(err) = close_output(writer) {
                tracing::warn!(flow = %key, "Failed to close flow output: {err}");
                if result.is_ok() {
                    result = Err(err.into());
                }
            }
        }
        tracing::info!(flows, "Flow split finished");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        listener::{ParseOptions, parse},
        test_helpers::{CaptureBuilder, ethernet_udp_frame, ipv4_header, ipv4_udp_packet, read_capture},
    };

    const A: [u8; 6] = [0, 0, 0, 0, 0, 0xA];
    const B: [u8; 6] = [0, 0, 0, 0, 0, 0xB];
    const C: [u8; 6] = [0, 0, 0, 0, 0, 0xC];

    #[test]
    fn ethernet_flows_by_mac_pair() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let ip = [10, 0, 0, 1];
        let capture = CaptureBuilder::ethernet()
            .record(1, 0, &ethernet_udp_frame(A, B, ip, ip, b"1"))
            .record(2, 0, &ethernet_udp_frame(B, A, ip, ip, b"2"))
            .record(3, 0, &ethernet_udp_frame(A, C, ip, ip, b"3"))
            .record(4, 0, &ethernet_udp_frame(B, A, ip, ip, b"4"))
            .build();
        let mut listener = FlowSplitListener::in_directory(FlowSplitConfig::default(), dir.path());
        parse(capture.as_slice(), &mut listener, &ParseOptions::default())?;

        let (header, ab) = read_capture(dir.path().join("00:00:00:00:00:0A_00:00:00:00:00:0B.pcap"))?;
        assert_eq!(header.network(), 1);
        let seconds: Vec<u32> = ab.iter().map(|r| r.header.ts_sec()).collect();
        assert_eq!(seconds, vec![1, 2, 4]);
        let (_, ac) = read_capture(dir.path().join("00:00:00:00:00:0A_00:00:00:00:00:0C.pcap"))?;
        assert_eq!(ac.len(), 1);
        Ok(())
    }

    #[test]
    fn ipv4_flows_by_address_pair() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let capture = CaptureBuilder::new(ipv4_header())
            .record(1, 0, &ipv4_udp_packet([192, 168, 0, 2], [10, 1, 1, 1], b"out"))
            .record(2, 0, &ipv4_udp_packet([10, 1, 1, 1], [192, 168, 0, 2], b"in"))
            .build();
        let config = FlowSplitConfig {
            gzip_output: true,
            ..Default::default()
        };
        let mut listener = FlowSplitListener::in_directory(config, dir.path());
        parse(capture.as_slice(), &mut listener, &ParseOptions::default())?;
        let (_, records) = read_capture(dir.path().join("10.1.1.1_192.168.0.2.pcap.gz"))?;
        assert_eq!(records.len(), 2);
        Ok(())
    }

    #[test]
    fn unsupported_link_types_are_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut header = PcapFileHeader::default();
        header.set_network(LinkType::Ipv6.value());
        let capture = CaptureBuilder::new(header).build();
        let mut listener = FlowSplitListener::in_directory(FlowSplitConfig::default(), dir.path());
        let result = parse(capture.as_slice(), &mut listener, &ParseOptions::default());
        assert!(matches!(result, Err(ToolError::UnsupportedLinkType(229))));
        Ok(())
    }

    #[test]
    fn short_frames_stop_the_split() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let capture = CaptureBuilder::ethernet()
            .record(1, 0, &ethernet_udp_frame(A, B, [1, 1, 1, 1], [2, 2, 2, 2], b""))
            .record(2, 0, &[0u8; 6])
            .build();
        let mut listener = FlowSplitListener::in_directory(FlowSplitConfig::default(), dir.path());
        let result = parse(capture.as_slice(), &mut listener, &ParseOptions::default());
        assert!(matches!(result, Err(ToolError::TruncatedFrame(_))));
        // Flows opened before the error are still complete captures
        let (_, records) = read_capture(dir.path().join("00:00:00:00:00:0A_00:00:00:00:00:0B.pcap"))?;
        assert_eq!(records.len(), 1);
        Ok(())
    }
}
