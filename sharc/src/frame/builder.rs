//! Writer for synthetic cache files, the reverse of [`crate::frame::split`].

use std::io::{Error, Write};

use crate::frame::MARKER;

pub struct CacheBuilder<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> CacheBuilder<W> {
    pub fn new(writer: W) -> Self {
        CacheBuilder {
            inner: writer,
            written: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Bytes written so far, the offset the next write lands at.
    pub fn position(&self) -> usize {
        self.written
    }

    fn write(&mut self, size_field: &[u8], data: &[u8]) -> Result<usize, Error> {
        let mut len = 0;
        len += self.write_raw(MARKER.as_bytes())?;
        len += self.write_raw(size_field)?;
        len += self.write_raw(data)?;
        Ok(len)
    }

    /// Bytes outside any blob, such as an engine header or padding.
    pub fn write_raw(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.inner.write_all(data)?;
        self.written += data.len();
        Ok(data.len())
    }

    pub fn write_blob32(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.write(&(data.len() as u32).to_le_bytes(), data)
    }

    pub fn write_blob64(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.write(&(data.len() as u64).to_le_bytes(), data)
    }

    /// Delimited framing blob, the size field records `decompressed_size`
    /// instead of the length of `data`.
    pub fn write_delimited(&mut self, decompressed_size: u32, data: &[u8]) -> Result<usize, Error> {
        self.write(&decompressed_size.to_le_bytes(), data)
    }
}
