use std::ops::ControlFlow;

use crate::{
    listener::PcapListener,
    pcap::{PcapParseError, file_header::PcapFileHeader, packet_header::PacketHeader},
    statistics::{OrderStatistics, SummaryStatistics},
};

/// The set of values seen at one byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteSet([u64; 4]);
impl ByteSet {
    pub fn insert(&mut self, byte: u8) {
        self.0[(byte >> 6) as usize] |= 1u64 << (byte & 63);
    }
    pub fn contains(&self, byte: u8) -> bool {
        self.0[(byte >> 6) as usize] & (1u64 << (byte & 63)) != 0
    }
    pub fn len(&self) -> usize {
        self.0.iter().map(|word| word.count_ones() as usize).sum()
    }
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|word| *word == 0)
    }
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(|byte| self.contains(*byte))
    }
}

/// Everything [SummaryListener] measured
///
/// Rates are computed between consecutive records: packets per second from the
/// gap, bytes per second from the previous record's original length over the gap.
/// A zero gap gives an infinite rate.
#[derive(Debug, Clone, Default)]
pub struct CaptureSummary {
    pub header: Option<PcapFileHeader>,
    pub included_lengths: SummaryStatistics,
    pub included_lengths_order: OrderStatistics<u32>,
    pub original_lengths: SummaryStatistics,
    pub original_lengths_order: OrderStatistics<u32>,
    /// Nanoseconds between consecutive records. Negative for out of order captures
    pub interpacket_ns: SummaryStatistics,
    pub interpacket_ns_order: OrderStatistics<i64>,
    pub epoch_ns: SummaryStatistics,
    pub epoch_ns_order: OrderStatistics<u64>,
    pub packet_rates: OrderStatistics<f64>,
    pub data_rates: OrderStatistics<f64>,
    /// Occurrences of every byte value across all record data
    pub byte_counts: Vec<u64>,
    /// Values seen at each offset into record data
    pub offset_values: Vec<ByteSet>,
}

/// The slowest standard line rate that fits the peak data rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineRate {
    /// Two records shared a timestamp, usually several interfaces in one capture
    Unbounded,
    Required {
        /// A power of ten, in bits per second
        bits_per_second: f64,
        /// Peak data rate as a fraction of `bits_per_second`
        peak_utilization: f64,
    },
}

impl CaptureSummary {
    pub fn records(&self) -> u64 {
        self.included_lengths.n()
    }
    /// First and last timestamp in nanoseconds
    pub fn epoch_range(&mut self) -> Option<(u64, u64)> {
        Some((self.epoch_ns_order.min()?, self.epoch_ns_order.max()?))
    }
    /// Records per second over the average gap. Infinite with fewer than two records
    pub fn average_packet_rate(&self) -> f64 {
        if self.interpacket_ns.n() == 0 {
            return f64::INFINITY;
        }
        1.0e9 / self.interpacket_ns.average()
    }
    /// `None` until two records have been seen
    pub fn min_line_rate(&mut self) -> Option<LineRate> {
        let peak = self.data_rates.max()?;
        if peak.is_infinite() {
            return Some(LineRate::Unbounded);
        }
        let peak_bits = peak * 8.0;
        let bits_per_second = if peak_bits > 0.0 {
            10f64.powi(peak_bits.log10().ceil() as i32)
        } else {
            1.0
        };
        Some(LineRate::Required {
            bits_per_second,
            peak_utilization: peak_bits / bits_per_second,
        })
    }
    /// Offsets that held the same value in every record long enough to reach them
    pub fn constant_offsets(&self) -> Vec<usize> {
        self.offset_values
            .iter()
            .enumerate()
            .filter(|(_, values)| values.len() == 1)
            .map(|(offset, _)| offset)
            .collect()
    }
    /// Up to `limit` byte values with their counts, most common first
    pub fn most_common_bytes(&self, limit: usize) -> Vec<(u8, u64)> {
        let mut counts: Vec<(u8, u64)> = self
            .byte_counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(byte, count)| (byte as u8, *count))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        counts.truncate(limit);
        counts
    }
}

/// Collects a [CaptureSummary]
#[derive(Debug, Clone)]
pub struct SummaryListener {
    summary: CaptureSummary,
    last: Option<(u64, u32)>,
}
impl Default for SummaryListener {
    fn default() -> Self {
        Self {
            summary: CaptureSummary {
                byte_counts: vec![0; 256],
                ..Default::default()
            },
            last: None,
        }
    }
}
impl SummaryListener {
    pub fn summary(&self) -> &CaptureSummary {
        &self.summary
    }
    pub fn into_summary(self) -> CaptureSummary {
        self.summary
    }
}
impl PcapListener for SummaryListener {
    type Error = PcapParseError;

    fn on_header(&mut self, header: &PcapFileHeader) -> Result<ControlFlow<()>, Self::Error> {
        self.summary.header = Some(*header);
        Ok(ControlFlow::Continue(()))
    }

    fn on_record(
        &mut self,
        header: PacketHeader,
        data: &[u8],
    ) -> Result<ControlFlow<()>, Self::Error> {
        let summary = &mut self.summary;
        summary.included_lengths.sample(header.include_len() as f64);
        summary.included_lengths_order.sample(header.include_len());
        summary.original_lengths.sample(header.orig_len() as f64);
        summary.original_lengths_order.sample(header.orig_len());

        let ns = header.epoch_nanos();
        summary.epoch_ns.sample(ns as f64);
        summary.epoch_ns_order.sample(ns);
        if let Some((last_ns, last_length)) = self.last {
            let gap = ns as i64 - last_ns as i64;
            summary.interpacket_ns.sample(gap as f64);
            summary.interpacket_ns_order.sample(gap);
            let (packet_rate, data_rate) = if gap > 0 {
                (1.0e9 / gap as f64, 1.0e9 * last_length as f64 / gap as f64)
            } else {
                (f64::INFINITY, f64::INFINITY)
            };
            summary.packet_rates.sample(packet_rate);
            summary.data_rates.sample(data_rate);
        }
        self.last = Some((ns, header.orig_len()));

        if summary.offset_values.len() < data.len() {
            summary.offset_values.resize(data.len(), ByteSet::default());
        }
        for (offset, byte) in data.iter().enumerate() {
            summary.byte_counts[*byte as usize] += 1;
            summary.offset_values[offset].insert(*byte);
        }
        Ok(ControlFlow::Continue(()))
    }
}
