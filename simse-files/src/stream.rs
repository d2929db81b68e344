use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use serde::Serialize;

use crate::error::{FsError, Result};

/// Anything a stream handle can sit on top of: `std::fs::File`, a cursor, ...
pub trait StreamIo: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> StreamIo for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMode {
    pub readable: bool,
    pub writable: bool,
    pub seekable: bool,
}

impl StreamMode {
    pub const READ_ONLY: Self = Self {
        readable: true,
        writable: false,
        seekable: true,
    };

    pub const READ_WRITE: Self = Self {
        readable: true,
        writable: true,
        seekable: true,
    };

    /// fopen-style mode string.
    pub fn as_str(&self) -> &'static str {
        match (self.readable, self.writable) {
            (true, true) => "r+b",
            (false, true) => "wb",
            _ => "rb",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamMetadata {
    pub uri: String,
    pub mode: &'static str,
    pub seekable: bool,
    pub readable: bool,
    pub writable: bool,
    pub eof: bool,
}

/// An open byte stream over one storage entry.
pub struct StreamHandle {
    io: Box<dyn StreamIo>,
    mode: StreamMode,
    uri: String,
    position: u64,
    eof: bool,
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("uri", &self.uri)
            .field("mode", &self.mode.as_str())
            .field("position", &self.position)
            .field("eof", &self.eof)
            .finish()
    }
}

impl StreamHandle {
    pub fn new(io: impl StreamIo + 'static, mode: StreamMode, uri: impl Into<String>) -> Self {
        Self {
            io: Box::new(io),
            mode,
            uri: uri.into(),
            position: 0,
            eof: false,
        }
    }

    /// Read-only handle over bytes already in memory.
    pub fn from_bytes(content: Vec<u8>, uri: impl Into<String>) -> Self {
        Self::new(Cursor::new(content), StreamMode::READ_ONLY, uri)
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn is_readable(&self) -> bool {
        self.mode.readable
    }

    pub fn is_writable(&self) -> bool {
        self.mode.writable
    }

    pub fn is_seekable(&self) -> bool {
        self.mode.seekable
    }

    /// Read up to `len` bytes. A short read marks the end of the stream.
    pub fn read(&mut self, len: usize) -> Result<Vec<u8>> {
        if !self.mode.readable {
            return Err(FsError::NotReadable);
        }
        let mut buf = Vec::with_capacity(len.min(64 * 1024));
        (&mut self.io).take(len as u64).read_to_end(&mut buf)?;
        self.position += buf.len() as u64;
        if buf.len() < len {
            self.eof = true;
        }
        Ok(buf)
    }

    /// Everything from the current position to the end.
    pub fn read_remaining(&mut self) -> Result<Vec<u8>> {
        if !self.mode.readable {
            return Err(FsError::NotReadable);
        }
        let mut buf = Vec::new();
        self.io.read_to_end(&mut buf)?;
        self.position += buf.len() as u64;
        self.eof = true;
        Ok(buf)
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        if !self.mode.writable {
            return Err(FsError::NotWritable);
        }
        self.io.write_all(bytes)?;
        self.io.flush()?;
        self.position += bytes.len() as u64;
        Ok(bytes.len())
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if !self.mode.seekable {
            return Err(FsError::NotSeekable);
        }
        self.position = self.io.seek(pos)?;
        self.eof = false;
        Ok(self.position)
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    pub fn tell(&self) -> u64 {
        self.position
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    pub fn metadata(&self) -> StreamMetadata {
        StreamMetadata {
            uri: self.uri.clone(),
            mode: self.mode.as_str(),
            seekable: self.mode.seekable,
            readable: self.mode.readable,
            writable: self.mode.writable,
            eof: self.eof,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_in_chunks_until_eof() {
        let mut handle = StreamHandle::from_bytes(b"hello world".to_vec(), "/greeting.txt");
        assert_eq!(handle.read(5).unwrap(), b"hello");
        assert_eq!(handle.tell(), 5);
        assert!(!handle.eof());
        assert_eq!(handle.read(100).unwrap(), b" world");
        assert!(handle.eof());
        assert_eq!(handle.tell(), 11);
    }

    #[test]
    fn exact_read_does_not_flag_eof() {
        let mut handle = StreamHandle::from_bytes(b"abc".to_vec(), "/abc");
        assert_eq!(handle.read(3).unwrap(), b"abc");
        assert!(!handle.eof());
        assert!(handle.read(1).unwrap().is_empty());
        assert!(handle.eof());
    }

    #[test]
    fn seek_and_rewind_clear_eof() {
        let mut handle = StreamHandle::from_bytes(b"abcdef".to_vec(), "/abc");
        handle.read_remaining().unwrap();
        assert!(handle.eof());
        assert_eq!(handle.seek(SeekFrom::End(-2)).unwrap(), 4);
        assert!(!handle.eof());
        assert_eq!(handle.read(2).unwrap(), b"ef");
        handle.rewind().unwrap();
        assert_eq!(handle.tell(), 0);
        assert_eq!(handle.read(1).unwrap(), b"a");
    }

    #[test]
    fn read_only_handle_rejects_writes() {
        let mut handle = StreamHandle::from_bytes(Vec::new(), "/x");
        assert!(matches!(handle.write(b"nope"), Err(FsError::NotWritable)));
    }

    #[test]
    fn capability_flags_are_enforced() {
        let mode = StreamMode {
            readable: false,
            writable: true,
            seekable: false,
        };
        let mut handle = StreamHandle::new(Cursor::new(Vec::new()), mode, "/sink");
        assert!(matches!(handle.read(1), Err(FsError::NotReadable)));
        assert!(matches!(handle.seek(SeekFrom::Start(0)), Err(FsError::NotSeekable)));
        assert_eq!(handle.write(b"data").unwrap(), 4);
        assert_eq!(handle.metadata().mode, "wb");
    }
}
