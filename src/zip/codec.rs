//! 压缩/解压与校验流
//!
//! - 解压：STORE、DEFLATE（flate2 raw deflate）
//! - 压缩：STORE、DEFLATE
//! - 校验：按条目的 CRC32 与原始大小检查解出的数据

use crate::error::ZipError;
use crate::types::{CompressionLevel, CompressionMethod};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::fmt;
use std::io::{self, Read, Write};

/// 流式读取过程中检测到的条目级错误
///
/// 通过 `io::Error` 穿过 `Read` 链，在提取边界转换回 [`ZipError`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFault {
    WrongPassword,
    Crc { expected: u32, actual: u32 },
    Truncated { expected: u64, actual: u64 },
}

impl fmt::Display for StreamFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamFault::WrongPassword => f.write_str("wrong password"),
            StreamFault::Crc { expected, actual } => {
                write!(f, "CRC32 mismatch: expected 0x{:08x}, got 0x{:08x}", expected, actual)
            }
            StreamFault::Truncated { expected, actual } => {
                write!(f, "truncated: expected {} bytes, got {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for StreamFault {}

impl StreamFault {
    pub fn from_io(err: &io::Error) -> Option<&StreamFault> {
        err.get_ref().and_then(|e| e.downcast_ref::<StreamFault>())
    }
}

pub(crate) fn fault(f: StreamFault) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, f)
}

/// 将条目读取中的 `io::Error` 转换为带条目名的 [`ZipError`]
pub(crate) fn classify(err: io::Error, name: &str) -> ZipError {
    match StreamFault::from_io(&err) {
        Some(StreamFault::WrongPassword) => ZipError::WrongPassword {
            name: name.to_string(),
        },
        Some(StreamFault::Crc { expected, actual }) => ZipError::IntegrityError {
            name: name.to_string(),
            expected: *expected,
            actual: *actual,
        },
        Some(StreamFault::Truncated { expected, actual }) => ZipError::Truncated {
            name: name.to_string(),
            expected: *expected,
            actual: *actual,
        },
        None => ZipError::Io(err),
    }
}

/// 为压缩数据创建解压读取器
pub(crate) fn decoder<'a, R: Read + 'a>(
    method: CompressionMethod,
    reader: R,
) -> Result<Box<dyn Read + 'a>, ZipError> {
    match method {
        CompressionMethod::Store => Ok(Box::new(reader)),
        CompressionMethod::Deflate => Ok(Box::new(DeflateDecoder::new(reader))),
        other => Err(ZipError::unsupported(format!(
            "decompression method {}",
            other
        ))),
    }
}

/// 压缩写入器
pub(crate) enum Compressor<W: Write> {
    Store(W),
    Deflate(DeflateEncoder<W>),
}

impl<W: Write> Compressor<W> {
    pub fn new(method: CompressionMethod, level: CompressionLevel, writer: W) -> Result<Self, ZipError> {
        match method {
            CompressionMethod::Store => Ok(Compressor::Store(writer)),
            CompressionMethod::Deflate => Ok(Compressor::Deflate(DeflateEncoder::new(
                writer,
                Compression::new(u32::from(level.as_u8())),
            ))),
            other => Err(ZipError::unsupported(format!(
                "compression method {}",
                other
            ))),
        }
    }

    pub fn finish(self) -> io::Result<W> {
        match self {
            Compressor::Store(w) => Ok(w),
            Compressor::Deflate(enc) => enc.finish(),
        }
    }
}

impl<W: Write> Write for Compressor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Compressor::Store(w) => w.write(buf),
            Compressor::Deflate(enc) => enc.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Compressor::Store(w) => w.flush(),
            Compressor::Deflate(enc) => enc.flush(),
        }
    }
}

/// 统计写入字节数
pub(crate) struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// 校验解出数据的 CRC32 与长度
pub struct CheckedReader<R> {
    inner: R,
    hasher: crc32fast::Hasher,
    expected_crc: Option<u32>,
    expected_size: u64,
    count: u64,
}

impl<R: Read> CheckedReader<R> {
    /// `expected_crc` 为 `None` 时只检查长度（AE-2 条目不保存 CRC）
    pub fn new(inner: R, expected_crc: Option<u32>, expected_size: u64) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            expected_crc,
            expected_size,
            count: 0,
        }
    }

    fn truncated(&self) -> io::Error {
        fault(StreamFault::Truncated {
            expected: self.expected_size,
            actual: self.count,
        })
    }
}

impl<R: Read> Read for CheckedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = match self.inner.read(buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(self.truncated()),
            Err(e) => return Err(e),
        };

        if n == 0 {
            if self.count < self.expected_size {
                return Err(self.truncated());
            }
            if let Some(expected) = self.expected_crc {
                let actual = self.hasher.clone().finalize();
                if actual != expected {
                    return Err(fault(StreamFault::Crc { expected, actual }));
                }
            }
            return Ok(0);
        }

        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut c = Compressor::new(CompressionMethod::Deflate, CompressionLevel::Level6, Vec::new()).unwrap();
        c.write_all(data).unwrap();
        c.finish().unwrap()
    }

    #[test]
    fn test_deflate_roundtrip_through_checked_reader() {
        let data = b"abcabcabcabcabcabc hello hello hello".repeat(50);
        let compressed = deflate(&data);
        assert!(compressed.len() < data.len());

        let dec = decoder(CompressionMethod::Deflate, Cursor::new(compressed)).unwrap();
        let mut reader = CheckedReader::new(dec, Some(crc32fast::hash(&data)), data.len() as u64);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_crc_mismatch() {
        let mut reader = CheckedReader::new(Cursor::new(b"hello".to_vec()), Some(0), 5);
        let err = reader.read_to_end(&mut Vec::new()).unwrap_err();
        let zerr = classify(err, "hello.txt");
        assert!(matches!(zerr, ZipError::IntegrityError { expected: 0, .. }));
    }

    #[test]
    fn test_truncated() {
        let mut reader = CheckedReader::new(Cursor::new(b"abc".to_vec()), None, 10);
        let err = reader.read_to_end(&mut Vec::new()).unwrap_err();
        assert!(matches!(
            classify(err, "x"),
            ZipError::Truncated { expected: 10, actual: 3, .. }
        ));
    }

    #[test]
    fn test_unsupported_method() {
        let err = decoder(CompressionMethod::Bzip2, Cursor::new(Vec::new()))
            .err()
            .unwrap();
        assert!(matches!(err, ZipError::Unsupported { .. }));
        assert!(Compressor::new(CompressionMethod::Deflate64, CompressionLevel::Level6, Vec::new()).is_err());
    }

    #[test]
    fn test_counting_writer() {
        let mut w = CountingWriter::new(Vec::new());
        w.write_all(b"12345").unwrap();
        assert_eq!(w.count(), 5);
    }
}
