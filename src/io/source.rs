use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use flate2::read::MultiGzDecoder;

use crate::utils::PeekableReader;

/// Gzip magic bytes
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const BUFFER_SIZE: usize = 64 * 1024;

/// A readable capture source that may be gzip compressed
pub struct InputSource<R: Read> {
    inner: SourceInner<R>,
}
enum SourceInner<R: Read> {
    Plain(PeekableReader<R>),
    // Appending to a compressed capture produces one gzip member per session
    Gzip(Box<MultiGzDecoder<PeekableReader<R>>>),
}
impl<R: Read> InputSource<R> {
    /// Peeks at the first bytes of `reader` and decompresses if they are the gzip magic
    pub fn detect(reader: R) -> std::io::Result<Self> {
        let reader = PeekableReader::new(reader, GZIP_MAGIC.len())?;
        let inner = if reader.peek() == GZIP_MAGIC {
            SourceInner::Gzip(Box::new(MultiGzDecoder::new(reader)))
        } else {
            SourceInner::Plain(reader)
        };
        Ok(Self { inner })
    }
    pub fn is_gzip(&self) -> bool {
        matches!(self.inner, SourceInner::Gzip(_))
    }
}
impl<R: Read> Read for InputSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SourceInner::Plain(reader) => reader.read(buf),
            SourceInner::Gzip(reader) => reader.read(buf),
        }
    }
}

/// Opens a capture file for reading
pub fn open_source(path: &Path) -> std::io::Result<InputSource<BufReader<File>>> {
    let file = File::open(path)?;
    let source = InputSource::detect(BufReader::with_capacity(BUFFER_SIZE, file))?;
    tracing::debug!(
        path = %path.display(),
        gzip = source.is_gzip(),
        "Opened capture source"
    );
    Ok(source)
}
