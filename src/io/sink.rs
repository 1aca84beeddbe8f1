use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use flate2::{Compression, write::GzEncoder};

/// A writable capture destination that knows how much it already holds
pub trait PcapSink: Write {
    /// Bytes already in the sink, including anything there before it was opened
    fn position(&self) -> u64;
    /// Flushes and releases the sink
    fn close(self) -> std::io::Result<()>
    where
        Self: Sized;
}

/// Opens named sinks for tools that write more than one output
pub trait SinkFactory {
    type Sink: PcapSink;
    fn open(&mut self, name: &str) -> std::io::Result<Self::Sink>;
}

/// A capture file, gzip compressed when its name ends in `.gz`
#[derive(Debug)]
pub struct OutputSink {
    inner: SinkInner,
    path: PathBuf,
    position: u64,
}
#[derive(Debug)]
enum SinkInner {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}
impl OutputSink {
    /// Creates or truncates the file, or opens it for appending
    pub fn create(path: impl Into<PathBuf>, append: bool) -> std::io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)?;
        let position = if append { file.metadata()?.len() } else { 0 };
        let writer = BufWriter::new(file);
        let inner = if is_gzip_name(&path) {
            SinkInner::Gzip(GzEncoder::new(writer, Compression::default()))
        } else {
            SinkInner::Plain(writer)
        };
        Ok(Self {
            inner,
            path,
            position,
        })
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
}
impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = match &mut self.inner {
            SinkInner::Plain(writer) => writer.write(buf)?,
            SinkInner::Gzip(writer) => writer.write(buf)?,
        };
        self.position += written as u64;
        Ok(written)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            SinkInner::Plain(writer) => writer.flush(),
            SinkInner::Gzip(writer) => writer.flush(),
        }
    }
}
impl PcapSink for OutputSink {
    fn position(&self) -> u64 {
        self.position
    }
    fn close(self) -> std::io::Result<()> {
        let mut file = match self.inner {
            SinkInner::Plain(writer) => writer,
            SinkInner::Gzip(encoder) => encoder.finish()?,
        };
        file.flush()?;
        tracing::debug!(path = %self.path.display(), bytes = self.position, "Closed output");
        Ok(())
    }
}

fn is_gzip_name(path: &Path) -> bool {
    path.extension().is_some_and(|extension| extension == "gz")
}

/// Opens [OutputSink]s, optionally below a root directory, creating missing directories
#[derive(Debug, Clone, Default)]
pub struct FileSinkFactory {
    root: Option<PathBuf>,
    append: bool,
}
impl FileSinkFactory {
    /// Names are used as paths as they are
    pub fn new(append: bool) -> Self {
        Self { root: None, append }
    }
    /// Names are joined onto `root`
    pub fn in_directory(root: impl Into<PathBuf>, append: bool) -> Self {
        Self {
            root: Some(root.into()),
            append,
        }
    }
    pub fn path_for(&self, name: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(name),
            None => PathBuf::from(name),
        }
    }
}
impl SinkFactory for FileSinkFactory {
    type Sink = OutputSink;
    fn open(&mut self, name: &str) -> std::io::Result<OutputSink> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        tracing::debug!(path = %path.display(), append = self.append, "Opening output");
        OutputSink::create(path, self.append)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::io::open_source;

    #[test]
    fn append_position_includes_existing_bytes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.pcap");
        let mut sink = OutputSink::create(&path, false)?;
        assert_eq!(sink.position(), 0);
        sink.write_all(b"hello")?;
        assert_eq!(sink.position(), 5);
        sink.close()?;

        let mut sink = OutputSink::create(&path, true)?;
        assert_eq!(sink.position(), 5);
        sink.write_all(b" world")?;
        sink.close()?;
        assert_eq!(std::fs::read(&path)?, b"hello world");

        let sink = OutputSink::create(&path, false)?;
        assert_eq!(sink.position(), 0);
        sink.close()?;
        assert!(std::fs::read(&path)?.is_empty());
        Ok(())
    }

    #[test]
    fn gz_names_are_compressed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.pcap.gz");
        let mut sink = OutputSink::create(&path, false)?;
        sink.write_all(b"compressed capture")?;
        sink.close()?;

        let raw = std::fs::read(&path)?;
        assert_eq!(raw[..2], crate::io::GZIP_MAGIC);
        let mut source = open_source(&path)?;
        let mut out = String::new();
        source.read_to_string(&mut out)?;
        assert_eq!(out, "compressed capture");
        Ok(())
    }

    #[test]
    fn factory_creates_directories() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut factory = FileSinkFactory::in_directory(dir.path(), false);
        let mut sink = factory.open("2024/01/02/capture.pcap")?;
        sink.write_all(&[1, 2, 3])?;
        sink.close()?;
        assert_eq!(
            std::fs::read(dir.path().join("2024/01/02/capture.pcap"))?,
            vec![1, 2, 3]
        );
        Ok(())
    }
}
