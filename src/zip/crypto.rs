//! 条目加密：传统 PKWARE (ZipCrypto) 与 WinZip AES
//!
//! 读写两端都以 `Read`/`Write` 适配器的形式串接在压缩流与容器之间。
//! 密码错误或认证失败通过 [`StreamFault`] 在 `io::Error` 中传递。

use crate::error::ZipError;
use crate::types::EncryptionMethod;
use crate::zip::codec::{fault, StreamFault};
use std::io::{self, Read, Write};

/// CRC-32 表（多项式 0xEDB88320），ZipCrypto 密钥更新使用
const CRC_TABLE: [u32; 256] = make_crc_table();

const fn make_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

fn crc32_update(crc: u32, byte: u8) -> u32 {
    CRC_TABLE[((crc ^ u32::from(byte)) & 0xff) as usize] ^ (crc >> 8)
}

/// 加密头长度
pub const ZIPCRYPTO_HEADER_LEN: usize = 12;

/// ZipCrypto 三密钥状态
#[derive(Clone)]
pub(crate) struct ZipCryptoKeys {
    key0: u32,
    key1: u32,
    key2: u32,
}

impl ZipCryptoKeys {
    pub fn new(password: &[u8]) -> Self {
        let mut keys = Self {
            key0: 0x1234_5678,
            key1: 0x2345_6789,
            key2: 0x3456_7890,
        };
        for &b in password {
            keys.update(b);
        }
        keys
    }

    fn update(&mut self, byte: u8) {
        self.key0 = crc32_update(self.key0, byte);
        self.key1 = self
            .key1
            .wrapping_add(self.key0 & 0xff)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        self.key2 = crc32_update(self.key2, (self.key1 >> 24) as u8);
    }

    fn stream_byte(&self) -> u8 {
        let temp = (self.key2 | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    pub fn decrypt_byte(&mut self, cipher: u8) -> u8 {
        let plain = cipher ^ self.stream_byte();
        self.update(plain);
        plain
    }

    pub fn encrypt_byte(&mut self, plain: u8) -> u8 {
        let cipher = plain ^ self.stream_byte();
        self.update(plain);
        cipher
    }
}

impl Drop for ZipCryptoKeys {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.key0.zeroize();
        self.key1.zeroize();
        self.key2.zeroize();
    }
}

/// 解密 ZipCrypto 数据流
pub struct ZipCryptoReader<R> {
    reader: R,
    keys: ZipCryptoKeys,
}

impl<R: Read> ZipCryptoReader<R> {
    /// 读取 12 字节加密头并校验密码
    ///
    /// `check_byte` 为 CRC 最高字节，或使用数据描述符时为 DOS 时间高字节
    pub fn new(mut reader: R, password: &[u8], check_byte: u8) -> io::Result<Self> {
        let mut keys = ZipCryptoKeys::new(password);
        let mut header = [0u8; ZIPCRYPTO_HEADER_LEN];
        reader.read_exact(&mut header)?;
        for b in header.iter_mut() {
            *b = keys.decrypt_byte(*b);
        }
        if header[ZIPCRYPTO_HEADER_LEN - 1] != check_byte {
            return Err(fault(StreamFault::WrongPassword));
        }
        Ok(Self { reader, keys })
    }
}

impl<R: Read> Read for ZipCryptoReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        for b in buf[..n].iter_mut() {
            *b = self.keys.decrypt_byte(*b);
        }
        Ok(n)
    }
}

/// 以 ZipCrypto 加密写入
pub struct ZipCryptoWriter<W> {
    writer: W,
    keys: ZipCryptoKeys,
    buffer: Vec<u8>,
}

impl<W: Write> ZipCryptoWriter<W> {
    /// 写入 12 字节加密头（10 字节随机数 + 2 字节校验）
    pub fn new(mut writer: W, password: &[u8], check: u16) -> io::Result<Self> {
        let mut keys = ZipCryptoKeys::new(password);
        let mut header = [0u8; ZIPCRYPTO_HEADER_LEN];
        getrandom::getrandom(&mut header[..ZIPCRYPTO_HEADER_LEN - 2])
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        header[ZIPCRYPTO_HEADER_LEN - 2] = check as u8;
        header[ZIPCRYPTO_HEADER_LEN - 1] = (check >> 8) as u8;
        for b in header.iter_mut() {
            *b = keys.encrypt_byte(*b);
        }
        writer.write_all(&header)?;
        Ok(Self {
            writer,
            keys,
            buffer: Vec::new(),
        })
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> Write for ZipCryptoWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.clear();
        self.buffer
            .extend(buf.iter().map(|&b| self.keys.encrypt_byte(b)));
        self.writer.write_all(&self.buffer)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(feature = "aes")]
pub use self::aes_impl::{AesReader, AesWriter};

/// WinZip AES 强度参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesStrength {
    Aes128,
    Aes192,
    Aes256,
}

impl AesStrength {
    pub fn from_method(method: EncryptionMethod) -> Option<Self> {
        match method {
            EncryptionMethod::Aes128 => Some(AesStrength::Aes128),
            EncryptionMethod::Aes192 => Some(AesStrength::Aes192),
            EncryptionMethod::Aes256 => Some(AesStrength::Aes256),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            AesStrength::Aes128 => 1,
            AesStrength::Aes192 => 2,
            AesStrength::Aes256 => 3,
        }
    }

    pub fn key_length(self) -> usize {
        match self {
            AesStrength::Aes128 => 16,
            AesStrength::Aes192 => 24,
            AesStrength::Aes256 => 32,
        }
    }

    pub fn salt_length(self) -> usize {
        self.key_length() / 2
    }

    /// 盐 + 校验值 + 认证码，加密后比明文多出的字节数
    pub fn overhead(self) -> u64 {
        (self.salt_length() + aes_consts::PWD_VERIFY_LENGTH + aes_consts::AUTH_CODE_LENGTH) as u64
    }
}

/// 按条目加密方式选择的写入端
pub(crate) enum EntryEncryptor<W: Write> {
    Plain(W),
    ZipCrypto(ZipCryptoWriter<W>),
    #[cfg(feature = "aes")]
    Aes(AesWriter<W>),
}

impl<W: Write> EntryEncryptor<W> {
    /// `check` 仅用于 ZipCrypto 加密头
    pub fn new(
        writer: W,
        method: EncryptionMethod,
        password: &[u8],
        check: u16,
    ) -> Result<Self, ZipError> {
        match method {
            EncryptionMethod::None => Ok(EntryEncryptor::Plain(writer)),
            EncryptionMethod::TradPkware => {
                Ok(EntryEncryptor::ZipCrypto(ZipCryptoWriter::new(writer, password, check)?))
            }
            #[cfg(feature = "aes")]
            EncryptionMethod::Aes128 | EncryptionMethod::Aes192 | EncryptionMethod::Aes256 => {
                let strength = AesStrength::from_method(method)
                    .ok_or_else(|| ZipError::internal("AES method without strength"))?;
                Ok(EntryEncryptor::Aes(AesWriter::new(writer, strength, password)?))
            }
            other => Err(ZipError::unsupported(format!("encryption method {}", other))),
        }
    }

    pub fn finish(self) -> io::Result<W> {
        match self {
            EntryEncryptor::Plain(w) => Ok(w),
            EntryEncryptor::ZipCrypto(w) => w.finish(),
            #[cfg(feature = "aes")]
            EntryEncryptor::Aes(w) => w.finish(),
        }
    }
}

impl<W: Write> Write for EntryEncryptor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            EntryEncryptor::Plain(w) => w.write(buf),
            EntryEncryptor::ZipCrypto(w) => w.write(buf),
            #[cfg(feature = "aes")]
            EntryEncryptor::Aes(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            EntryEncryptor::Plain(w) => w.flush(),
            EntryEncryptor::ZipCrypto(w) => w.flush(),
            #[cfg(feature = "aes")]
            EntryEncryptor::Aes(w) => w.flush(),
        }
    }
}

pub(crate) mod aes_consts {
    pub const PWD_VERIFY_LENGTH: usize = 2;
    pub const AUTH_CODE_LENGTH: usize = 10;
    pub const ITERATION_COUNT: u32 = 1000;
}

#[cfg(feature = "aes")]
mod aes_impl {
    use super::aes_consts::{AUTH_CODE_LENGTH, ITERATION_COUNT, PWD_VERIFY_LENGTH};
    use super::AesStrength;
    use crate::zip::codec::{fault, StreamFault};
    use aes::cipher::generic_array::GenericArray;
    use aes::cipher::{BlockEncrypt, KeyInit};
    use constant_time_eq::constant_time_eq;
    use hmac::{Hmac, Mac};
    use sha1::Sha1;
    use std::io::{self, Read, Write};
    use zeroize::Zeroizing;

    type HmacSha1 = Hmac<Sha1>;

    enum BlockCipher {
        Aes128(aes::Aes128),
        Aes192(aes::Aes192),
        Aes256(aes::Aes256),
    }

    /// 小端计数器的 AES-CTR 密钥流（计数器从 1 开始）
    struct AesCtr {
        cipher: BlockCipher,
        counter: u128,
        block: [u8; 16],
        used: usize,
    }

    impl AesCtr {
        fn new(strength: AesStrength, key: &[u8]) -> io::Result<Self> {
            let invalid = |_: aes::cipher::InvalidLength| io::Error::new(io::ErrorKind::InvalidInput, "invalid AES key length");
            let cipher = match strength {
                AesStrength::Aes128 => BlockCipher::Aes128(aes::Aes128::new_from_slice(key).map_err(invalid)?),
                AesStrength::Aes192 => BlockCipher::Aes192(aes::Aes192::new_from_slice(key).map_err(invalid)?),
                AesStrength::Aes256 => BlockCipher::Aes256(aes::Aes256::new_from_slice(key).map_err(invalid)?),
            };
            Ok(Self {
                cipher,
                counter: 1,
                block: [0u8; 16],
                used: 16,
            })
        }

        fn refill(&mut self) {
            let mut block = GenericArray::from(self.counter.to_le_bytes());
            match &self.cipher {
                BlockCipher::Aes128(c) => c.encrypt_block(&mut block),
                BlockCipher::Aes192(c) => c.encrypt_block(&mut block),
                BlockCipher::Aes256(c) => c.encrypt_block(&mut block),
            }
            self.block.copy_from_slice(&block);
            self.counter = self.counter.wrapping_add(1);
            self.used = 0;
        }

        fn apply(&mut self, data: &mut [u8]) {
            for b in data.iter_mut() {
                if self.used == 16 {
                    self.refill();
                }
                *b ^= self.block[self.used];
                self.used += 1;
            }
        }
    }

    /// 派生 (加密密钥, HMAC 密钥, 密码校验值)
    fn derive_keys(
        strength: AesStrength,
        password: &[u8],
        salt: &[u8],
    ) -> io::Result<(AesCtr, HmacSha1, [u8; PWD_VERIFY_LENGTH])> {
        let key_len = strength.key_length();
        let mut derived = Zeroizing::new(vec![0u8; 2 * key_len + PWD_VERIFY_LENGTH]);
        pbkdf2::pbkdf2::<HmacSha1>(password, salt, ITERATION_COUNT, &mut derived)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let ctr = AesCtr::new(strength, &derived[..key_len])?;
        let hmac = <HmacSha1 as Mac>::new_from_slice(&derived[key_len..2 * key_len])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let mut verify = [0u8; PWD_VERIFY_LENGTH];
        verify.copy_from_slice(&derived[2 * key_len..]);
        Ok((ctr, hmac, verify))
    }

    /// 解密 AES 条目
    ///
    /// 数据布局：盐 | 2 字节校验值 | 密文 | 10 字节认证码
    pub struct AesReader<R> {
        reader: R,
        ctr: AesCtr,
        hmac: HmacSha1,
        remaining: u64,
        verified: bool,
    }

    impl<R: Read> AesReader<R> {
        /// 读取盐与校验值并验证密码，`compressed_size` 为条目的总存储大小
        pub fn new(
            mut reader: R,
            strength: AesStrength,
            password: &[u8],
            compressed_size: u64,
        ) -> io::Result<Self> {
            let remaining = compressed_size
                .checked_sub(strength.overhead())
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "AES entry too short"))?;

            let mut salt = vec![0u8; strength.salt_length()];
            reader.read_exact(&mut salt)?;
            let mut stored_verify = [0u8; PWD_VERIFY_LENGTH];
            reader.read_exact(&mut stored_verify)?;

            let (ctr, hmac, verify) = derive_keys(strength, password, &salt)?;
            if stored_verify != verify {
                return Err(fault(StreamFault::WrongPassword));
            }

            Ok(Self {
                reader,
                ctr,
                hmac,
                remaining,
                verified: false,
            })
        }

        fn verify_auth_code(&mut self) -> io::Result<()> {
            let mut stored = [0u8; AUTH_CODE_LENGTH];
            self.reader.read_exact(&mut stored)?;
            let computed = self.hmac.clone().finalize().into_bytes();
            if !constant_time_eq(&stored, &computed[..AUTH_CODE_LENGTH]) {
                return Err(fault(StreamFault::WrongPassword));
            }
            self.verified = true;
            Ok(())
        }
    }

    impl<R: Read> Read for AesReader<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                if !self.verified {
                    self.verify_auth_code()?;
                }
                return Ok(0);
            }
            let want = buf.len().min(self.remaining as usize);
            let n = self.reader.read(&mut buf[..want])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "AES entry data ended early",
                ));
            }
            self.hmac.update(&buf[..n]);
            self.ctr.apply(&mut buf[..n]);
            self.remaining -= n as u64;
            Ok(n)
        }
    }

    /// 以 AES 加密写入，`finish` 时追加认证码
    pub struct AesWriter<W> {
        writer: W,
        ctr: AesCtr,
        hmac: HmacSha1,
        buffer: Vec<u8>,
    }

    impl<W: Write> AesWriter<W> {
        pub fn new(mut writer: W, strength: AesStrength, password: &[u8]) -> io::Result<Self> {
            let mut salt = vec![0u8; strength.salt_length()];
            getrandom::getrandom(&mut salt)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            let (ctr, hmac, verify) = derive_keys(strength, password, &salt)?;
            writer.write_all(&salt)?;
            writer.write_all(&verify)?;
            Ok(Self {
                writer,
                ctr,
                hmac,
                buffer: Vec::new(),
            })
        }

        pub fn finish(mut self) -> io::Result<W> {
            let code = self.hmac.clone().finalize().into_bytes();
            self.writer.write_all(&code[..AUTH_CODE_LENGTH])?;
            self.writer.flush()?;
            Ok(self.writer)
        }
    }

    impl<W: Write> Write for AesWriter<W> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buffer.clear();
            self.buffer.extend_from_slice(buf);
            self.ctr.apply(&mut self.buffer);
            self.hmac.update(&self.buffer);
            self.writer.write_all(&self.buffer)?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.writer.flush()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::io::Cursor;

        #[test]
        fn test_aes_roundtrip_and_wrong_password() {
            let plain = b"The quick brown fox jumps over the lazy dog".repeat(10);
            let mut writer = AesWriter::new(Vec::new(), AesStrength::Aes256, b"secret").unwrap();
            writer.write_all(&plain).unwrap();
            let stored = writer.finish().unwrap();
            assert_eq!(stored.len() as u64, plain.len() as u64 + AesStrength::Aes256.overhead());

            let mut reader = AesReader::new(
                Cursor::new(&stored),
                AesStrength::Aes256,
                b"secret",
                stored.len() as u64,
            )
            .unwrap();
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
            assert_eq!(out, plain);

            // 校验值碰撞时认证码仍会失败
            let result = AesReader::new(
                Cursor::new(&stored),
                AesStrength::Aes256,
                b"wrong",
                stored.len() as u64,
            )
            .and_then(|mut r| r.read_to_end(&mut Vec::new()));
            assert!(result.is_err());
        }

        #[test]
        fn test_tampered_ciphertext_fails_auth() {
            let mut writer = AesWriter::new(Vec::new(), AesStrength::Aes128, b"pw").unwrap();
            writer.write_all(b"payload bytes").unwrap();
            let mut stored = writer.finish().unwrap();
            let idx = AesStrength::Aes128.salt_length() + PWD_VERIFY_LENGTH + 1;
            stored[idx] ^= 0xff;

            let mut reader =
                AesReader::new(Cursor::new(&stored), AesStrength::Aes128, b"pw", stored.len() as u64)
                    .unwrap();
            let err = reader.read_to_end(&mut Vec::new()).unwrap_err();
            assert!(StreamFault::from_io(&err).is_some());
        }
    }
}
