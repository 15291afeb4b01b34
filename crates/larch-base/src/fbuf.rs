//! Binary stream used to persist trees and source locations
//!
//! All multi-byte integers are little-endian. Unsigned counts use a
//! LEB128 variable-length encoding. The format is only stable within a
//! single build of the tools.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;

/// Result type for stream operations
pub type Result<T> = std::result::Result<T, FbufError>;

/// Errors that can occur reading or writing a binary stream
#[derive(Debug, Error)]
pub enum FbufError {
    /// Underlying I/O failure
    #[error("I/O error in {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Variable-length integer did not terminate within 64 bits
    #[error("corrupt variable-length integer in {0}")]
    BadVarint(String),
}

/// Write side of a binary stream
pub struct FbufWriter<W: Write> {
    inner: BufWriter<W>,
    name: String,
}

impl FbufWriter<File> {
    /// Create a stream writing to a file on disk
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| FbufError::Io {
            name: path.display().to_string(),
            source: e,
        })?;
        Ok(Self::new(file, path.display().to_string()))
    }
}

impl<W: Write> FbufWriter<W> {
    /// Wrap an arbitrary writer; `name` is used in error messages
    pub fn new(inner: W, name: impl Into<String>) -> Self {
        Self {
            inner: BufWriter::new(inner),
            name: name.into(),
        }
    }

    /// Name of the underlying file or stream
    pub fn file_name(&self) -> &str {
        &self.name
    }

    fn io_err(&self, e: io::Error) -> FbufError {
        FbufError::Io {
            name: self.name.clone(),
            source: e,
        }
    }

    /// Write raw bytes with no framing
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes).map_err(|e| FbufError::Io {
            name: self.name.clone(),
            source: e,
        })
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_raw(&[v])
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        self.write_raw(&v.to_le_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_raw(&v.to_le_bytes())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        self.write_raw(&v.to_le_bytes())
    }

    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.write_raw(&v.to_le_bytes())
    }

    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        self.write_raw(&v.to_bits().to_le_bytes())
    }

    /// Write an unsigned integer in LEB128 encoding
    pub fn put_uint(&mut self, mut v: u64) -> Result<()> {
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            self.write_u8(byte)?;
            if v == 0 {
                return Ok(());
            }
        }
    }

    /// Write a length-prefixed string
    pub fn put_str(&mut self, s: &str) -> Result<()> {
        self.put_uint(s.len() as u64)?;
        self.write_raw(s.as_bytes())
    }

    /// Flush buffered output to the underlying writer
    pub fn flush(&mut self) -> Result<()> {
        let e = self.inner.flush();
        e.map_err(|e| self.io_err(e))
    }
}

/// Read side of a binary stream
pub struct FbufReader<R: Read> {
    inner: BufReader<R>,
    name: String,
}

impl FbufReader<File> {
    /// Open a stream reading from a file on disk
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| FbufError::Io {
            name: path.display().to_string(),
            source: e,
        })?;
        Ok(Self::new(file, path.display().to_string()))
    }
}

impl<R: Read> FbufReader<R> {
    /// Wrap an arbitrary reader; `name` is used in error messages
    pub fn new(inner: R, name: impl Into<String>) -> Self {
        Self {
            inner: BufReader::new(inner),
            name: name.into(),
        }
    }

    /// Name of the underlying file or stream
    pub fn file_name(&self) -> &str {
        &self.name
    }

    /// Read exactly `buf.len()` bytes
    pub fn read_raw(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(|e| FbufError::Io {
            name: self.name.clone(),
            source: e,
        })
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_raw(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_raw(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_raw(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_raw(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_raw(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Read a LEB128-encoded unsigned integer
    pub fn get_uint(&mut self) -> Result<u64> {
        let mut v = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            v |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(v);
            }
            shift += 7;
            if shift >= 64 {
                return Err(FbufError::BadVarint(self.name.clone()));
            }
        }
    }

    /// Read a length-prefixed string
    pub fn get_str(&mut self) -> Result<String> {
        let len = self.get_uint()? as usize;
        let mut buf = vec![0u8; len];
        self.read_raw(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn scalar_round_trip() {
        let mut buf = Vec::new();
        {
            let mut w = FbufWriter::new(&mut buf, "<mem>");
            w.write_u16(0xf00f).unwrap();
            w.write_u64(0x0123_4567_89ab_cdef).unwrap();
            w.write_i64(-42).unwrap();
            w.write_f64(1.5).unwrap();
            w.flush().unwrap();
        }

        let mut r = FbufReader::new(Cursor::new(buf), "<mem>");
        assert_eq!(r.read_u16().unwrap(), 0xf00f);
        assert_eq!(r.read_u64().unwrap(), 0x0123_4567_89ab_cdef);
        assert_eq!(r.read_i64().unwrap(), -42);
        assert_eq!(r.read_f64().unwrap(), 1.5);
    }

    #[test]
    fn varint_round_trip() {
        let values = [0u64, 1, 127, 128, 300, 16383, 16384, u64::MAX];

        let mut buf = Vec::new();
        {
            let mut w = FbufWriter::new(&mut buf, "<mem>");
            for v in values {
                w.put_uint(v).unwrap();
            }
            w.flush().unwrap();
        }

        let mut r = FbufReader::new(Cursor::new(buf), "<mem>");
        for v in values {
            assert_eq!(r.get_uint().unwrap(), v);
        }
    }

    #[test]
    fn varint_single_byte_for_small_values() {
        let mut buf = Vec::new();
        let mut w = FbufWriter::new(&mut buf, "<mem>");
        w.put_uint(100).unwrap();
        w.flush().unwrap();
        drop(w);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn string_round_trip() {
        let mut buf = Vec::new();
        {
            let mut w = FbufWriter::new(&mut buf, "<mem>");
            w.put_str("work/top.vhd").unwrap();
            w.put_str("").unwrap();
            w.flush().unwrap();
        }

        let mut r = FbufReader::new(Cursor::new(buf), "<mem>");
        assert_eq!(r.get_str().unwrap(), "work/top.vhd");
        assert_eq!(r.get_str().unwrap(), "");
    }

    #[test]
    fn short_read_reports_stream_name() {
        let mut r = FbufReader::new(Cursor::new(vec![0u8]), "trees.db");
        let err = r.read_u64().unwrap_err();
        assert!(err.to_string().contains("trees.db"));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.bin");

        {
            let mut w = FbufWriter::create(&path).unwrap();
            w.put_uint(7).unwrap();
            w.put_str("hello").unwrap();
            w.flush().unwrap();
        }

        let mut r = FbufReader::open(&path).unwrap();
        assert_eq!(r.get_uint().unwrap(), 7);
        assert_eq!(r.get_str().unwrap(), "hello");
    }
}
