//! ZIP 容器格式常量与中央目录记录

use crate::types::{CompressionMethod, EncryptionMethod, HostSystem};
use crate::zip::extra::{self, AesExtra};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// 签名
pub const LOCAL_DIR_HEADER_SIG: u32 = 0x04034b50;
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x02014b50;
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x06054b50;
pub const ZIP64_END_OF_CENTRAL_DIR_SIG: u32 = 0x06064b50;
pub const ZIP64_LOCATOR_SIG: u32 = 0x07064b50;
pub const DATA_DESCRIPTOR_SIG: u32 = 0x08074b50;

// 头大小
pub const LOCAL_DIR_HEADER_SIZE: usize = 30;
pub const CENTRAL_DIR_HEADER_SIZE: usize = 46;
pub const END_OF_CENTRAL_DIR_SIZE: usize = 22;
pub const ZIP64_LOCATOR_SIZE: usize = 20;
pub const ZIP64_END_OF_CENTRAL_DIR_SIZE: usize = 56;

// 版本
pub const VERSION_NEEDED: u16 = 20;
pub const VERSION_NEEDED_AES: u16 = 51;
/// Unix (3) + 6.3
pub const VERSION_MADE_BY: u16 = 0x033f;

// 压缩方法
pub const METHOD_STORE: u16 = 0;
pub const METHOD_DEFLATE: u16 = 8;
pub const METHOD_AES: u16 = 99;

// 通用标志位
pub const FLAG_ENCRYPTED: u16 = 0x0001;
pub const FLAG_LEVEL_MASK: u16 = 0x0006;
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
pub const FLAG_STRONG_ENCRYPTION: u16 = 0x0040;
pub const FLAG_UTF8: u16 = 0x0800;

/// 字段最大值（超过则需要 ZIP64）
pub const MAX_U16: u64 = 0xFFFF;
pub const MAX_U32: u64 = 0xFFFF_FFFF;

/// 小端读取（调用方保证长度）
pub(crate) fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

pub(crate) fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

pub(crate) fn le_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

/// 中央目录记录（原始字段）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    /// 头部中的原始方法（AES 条目为 99）
    pub method: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub crc32: u32,
    /// 已合并 ZIP64 扩展字段
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// 原始文件名字节
    pub name: Vec<u8>,
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
    pub internal_attr: u16,
    pub external_attr: u32,
    pub local_header_offset: u64,
}

impl DirectoryRecord {
    pub fn host(&self) -> HostSystem {
        HostSystem::from_u8((self.version_made_by >> 8) as u8)
    }

    pub fn aes_extra(&self) -> Option<AesExtra> {
        extra::find(&self.extra, extra::AES_ID).and_then(AesExtra::parse)
    }

    /// 实际压缩方法（AES 条目取扩展字段中的方法）
    pub fn compression_method(&self) -> CompressionMethod {
        if self.method == METHOD_AES {
            if let Some(aes) = self.aes_extra() {
                return CompressionMethod::from_u16(aes.method);
            }
        }
        CompressionMethod::from_u16(self.method)
    }

    pub fn encryption_method(&self) -> EncryptionMethod {
        if self.flags & FLAG_ENCRYPTED == 0 {
            return EncryptionMethod::None;
        }
        if self.flags & FLAG_STRONG_ENCRYPTION != 0 {
            return EncryptionMethod::Unknown(0x0040);
        }
        if self.method == METHOD_AES {
            return match self.aes_extra().map(|aes| aes.strength) {
                Some(1) => EncryptionMethod::Aes128,
                Some(2) => EncryptionMethod::Aes192,
                Some(3) => EncryptionMethod::Aes256,
                Some(other) => EncryptionMethod::Unknown(u16::from(other)),
                None => EncryptionMethod::Unknown(METHOD_AES),
            };
        }
        EncryptionMethod::TradPkware
    }

    /// 修改时间：优先使用 0x5455 扩展时间戳
    pub fn modified(&self) -> SystemTime {
        match extra::find(&self.extra, extra::EXTENDED_TIMESTAMP_ID)
            .and_then(extra::parse_extended_mtime)
        {
            Some(secs) => unix_to_system_time(i64::from(secs)),
            None => dos_to_system_time(self.dos_time, self.dos_date),
        }
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }
}

pub(crate) fn unix_to_system_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

/// DOS 时间转换为 SystemTime（按 UTC 解释）
pub fn dos_to_system_time(dos_time: u16, dos_date: u16) -> SystemTime {
    // DOS 日期格式：bit 9-15=year, bit 5-8=month, bit 0-4=day
    let year = ((dos_date >> 9) & 0x7F) as i32 + 1980;
    let month = ((dos_date >> 5) & 0x0F) as u8;
    let day = (dos_date & 0x1F) as u8;

    // DOS 时间格式：bit 11-15=hour, bit 5-10=minute, bit 0-4=second/2
    let hour = ((dos_time >> 11) & 0x1F) as u8;
    let minute = ((dos_time >> 5) & 0x3F) as u8;
    let second = ((dos_time << 1) & 0x3E) as u8;

    // 如果日期为 0（未设置或无效），返回 UNIX_EPOCH
    if dos_date == 0 || month == 0 || day == 0 {
        return UNIX_EPOCH;
    }

    let month = match time::Month::try_from(month) {
        Ok(m) => m,
        Err(_) => return UNIX_EPOCH,
    };

    let datetime = time::Date::from_calendar_date(year, month, day)
        .ok()
        .and_then(|date| {
            time::Time::from_hms(hour, minute, second.min(59))
                .ok()
                .map(|t| date.with_time(t).assume_utc())
        });

    match datetime {
        Some(dt) => unix_to_system_time(dt.unix_timestamp()),
        None => UNIX_EPOCH,
    }
}

/// SystemTime 转换为 DOS (time, date)
///
/// DOS 格式：
/// - 时间: HHHHHMMMMMMSSSSS (5+6+5 = 16 bits)
/// - 日期: YYYYYYYMMMMDDDDD (7+4+5 = 16 bits)
///
/// 1980 年之前的时间钳制为 1980-01-01 00:00:00
pub fn system_time_to_dos(time: SystemTime) -> (u16, u16) {
    use time::OffsetDateTime;

    let secs = match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(_) => 0,
    };

    let datetime = match OffsetDateTime::from_unix_timestamp(secs) {
        Ok(dt) => dt,
        Err(_) => return (0, (1 << 5) | 1),
    };

    if datetime.year() < 1980 {
        return (0, (1 << 5) | 1);
    }
    if datetime.year() > 2107 {
        return ((23 << 11) | (59 << 5) | 29, (127 << 9) | (12 << 5) | 31);
    }

    let year = datetime.year() as u16;
    let month = datetime.month() as u16;
    let day = datetime.day() as u16;
    let hour = datetime.hour() as u16;
    let minute = datetime.minute() as u16;
    let second = datetime.second() as u16;

    let dos_time = (hour << 11) | (minute << 5) | (second >> 1);
    let dos_date = ((year - 1980) << 9) | (month << 5) | day;

    (dos_time, dos_date)
}
