//! 条目数据读取：定位本地头、解密、解压并校验
//!
//! 读取链：文件区间 → (ZipCrypto | AES) → 解压 → CRC/长度校验

use crate::error::{Result, ZipError};
use crate::types::EncryptionMethod;
use crate::zip::codec::{classify, decoder, CheckedReader};
#[cfg(feature = "aes")]
use crate::zip::crypto::{AesReader, AesStrength};
use crate::zip::crypto::ZipCryptoReader;
use crate::zip::format::DirectoryRecord;
use crate::zip::reader::read_local_header;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};

/// 条目内容的流式读取器
///
/// 读取错误中携带的密码、CRC 与截断错误可用
/// [`StreamFault::from_io`](crate::zip::codec::StreamFault::from_io) 识别
pub struct EntryReader<'a> {
    inner: Box<dyn Read + 'a>,
    name: String,
    size: u64,
}

impl<'a> EntryReader<'a> {
    pub(crate) fn new(inner: Box<dyn Read + 'a>, name: String, size: u64) -> Self {
        Self { inner, name, size }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 解压后的预期大小
    pub fn size(&self) -> u64 {
        self.size
    }

    /// 读取剩余全部内容，错误转换为带条目名的 [`ZipError`]
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size.min(1 << 20) as usize);
        self.inner
            .read_to_end(&mut out)
            .map_err(|e| classify(e, &self.name))?;
        Ok(out)
    }
}

impl Read for EntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// ZipCrypto 校验字节：使用数据描述符时为 DOS 时间高字节，否则为 CRC 最高字节
fn zipcrypto_check_byte(record: &DirectoryRecord) -> u8 {
    if record.has_data_descriptor() {
        (record.dos_time >> 8) as u8
    } else {
        (record.crc32 >> 24) as u8
    }
}

/// 打开已存储条目的解码读取器
pub(crate) fn open_stored<'a>(
    file: &'a mut File,
    record: &DirectoryRecord,
    name: &str,
    password: Option<&str>,
) -> Result<Box<dyn Read + 'a>> {
    let encryption = record.encryption_method();
    let method = record.compression_method();
    let need_password = || {
        password.ok_or_else(|| ZipError::MissingPassword {
            name: name.to_string(),
        })
    };

    let local = read_local_header(file, record)?;
    file.seek(SeekFrom::Start(local.data_offset))?;
    let raw = BufReader::new(Read::take(file, record.compressed_size));

    let mut expected_crc = Some(record.crc32);
    let plain: Box<dyn Read + 'a> = match encryption {
        EncryptionMethod::None => Box::new(raw),
        EncryptionMethod::TradPkware => {
            let password = need_password()?;
            let reader = ZipCryptoReader::new(raw, password.as_bytes(), zipcrypto_check_byte(record))
                .map_err(|e| classify(e, name))?;
            Box::new(reader)
        }
        #[cfg(feature = "aes")]
        EncryptionMethod::Aes128 | EncryptionMethod::Aes192 | EncryptionMethod::Aes256 => {
            let password = need_password()?;
            let strength = AesStrength::from_method(encryption)
                .ok_or_else(|| ZipError::internal("AES method without strength"))?;
            // AE-2 条目不保存 CRC
            if record.aes_extra().map_or(false, |aes| aes.vendor_version == 2) {
                expected_crc = None;
            }
            let reader = AesReader::new(raw, strength, password.as_bytes(), record.compressed_size)
                .map_err(|e| classify(e, name))?;
            Box::new(reader)
        }
        other => {
            return Err(ZipError::unsupported(format!(
                "encryption method {} (entry '{}')",
                other, name
            )))
        }
    };

    let decoded = decoder(method, plain)?;
    Ok(Box::new(CheckedReader::new(
        decoded,
        expected_crc,
        record.uncompressed_size,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::format::{FLAG_DATA_DESCRIPTOR, FLAG_ENCRYPTED};

    #[test]
    fn test_check_byte_source() {
        let mut record = DirectoryRecord {
            crc32: 0xAB00_0000,
            dos_time: 0x7700,
            flags: FLAG_ENCRYPTED,
            ..Default::default()
        };
        assert_eq!(zipcrypto_check_byte(&record), 0xAB);
        record.flags |= FLAG_DATA_DESCRIPTOR;
        assert_eq!(zipcrypto_check_byte(&record), 0x77);
    }

    #[test]
    fn test_entry_reader_read_all() {
        let data = b"entry body".to_vec();
        let mut reader = EntryReader::new(Box::new(std::io::Cursor::new(data)), "a.txt".into(), 10);
        assert_eq!(reader.name(), "a.txt");
        assert_eq!(reader.read_all().unwrap(), b"entry body");
    }
}
