use std::io::{ErrorKind, Read};

/// Fills as much of `buffer` as the reader can provide
///
/// Unlike [Read::read_exact] this reports how many bytes were read before the
/// end of the stream, so callers can tell a clean end of stream (zero bytes)
/// apart from a truncated structure.
pub(crate) fn read_up_to<R: Read + ?Sized>(
    reader: &mut R,
    buffer: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// A reader that allows peeking into the first N bytes without consuming them
pub struct PeekableReader<R: Read> {
    inner: R,
    peeked: Vec<u8>,
    position: usize,
}
impl<R: Read> PeekableReader<R> {
    /// Creates a new `PeekableReader` that buffers up to `peek_size` bytes
    pub fn new(mut inner: R, peek_size: usize) -> std::io::Result<Self> {
        let mut peeked = vec![0u8; peek_size];
        let n = read_up_to(&mut inner, &mut peeked)?;
        peeked.truncate(n);
        Ok(Self {
            inner,
            peeked,
            position: 0,
        })
    }
    /// Returns the peeked bytes. Shorter than requested if the stream was shorter
    pub fn peek(&self) -> &[u8] {
        &self.peeked
    }
}
impl<R: Read> Read for PeekableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.peeked[self.position..];
        if remaining.is_empty() {
            return self.inner.read(buf);
        }
        let to_read = std::cmp::min(buf.len(), remaining.len());
        buf[..to_read].copy_from_slice(&remaining[..to_read]);
        self.position += to_read;
        Ok(to_read)
    }
}
