//! Extra field 解析与生成
//!
//! 支持的字段：ZIP64 (0x0001)、WinZip AES (0x9901)、扩展时间戳 (0x5455)。
//! 其他字段原样保留。

use crate::zip::format::{le_u16, le_u32, le_u64, MAX_U32};

pub const ZIP64_ID: u16 = 0x0001;
pub const EXTENDED_TIMESTAMP_ID: u16 = 0x5455;
pub const AES_ID: u16 = 0x9901;

/// 遍历 extra 字段 (header id, data)
pub struct ExtraFields<'a> {
    buf: &'a [u8],
}

impl<'a> Iterator for ExtraFields<'a> {
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.len() < 4 {
            return None;
        }
        let id = le_u16(self.buf, 0);
        let len = le_u16(self.buf, 2) as usize;
        if self.buf.len() < 4 + len {
            // 截断的字段：停止解析
            self.buf = &[];
            return None;
        }
        let data = &self.buf[4..4 + len];
        self.buf = &self.buf[4 + len..];
        Some((id, data))
    }
}

pub fn fields(extra: &[u8]) -> ExtraFields<'_> {
    ExtraFields { buf: extra }
}

pub fn find(extra: &[u8], id: u16) -> Option<&[u8]> {
    fields(extra).find(|(field_id, _)| *field_id == id).map(|(_, data)| data)
}

/// 去掉指定 id 的字段，其余保持原顺序
pub fn strip(extra: &[u8], ids: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(extra.len());
    for (id, data) in fields(extra) {
        if ids.contains(&id) {
            continue;
        }
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(data.len() as u16).to_le_bytes());
        out.extend_from_slice(data);
    }
    out
}

/// 用 ZIP64 扩展字段替换饱和的 32 位值
///
/// 字段顺序固定：原始大小、压缩大小、本地头偏移，只包含饱和的那几项
pub fn apply_zip64(
    data: &[u8],
    uncompressed_size: &mut u64,
    compressed_size: &mut u64,
    local_header_offset: &mut u64,
) {
    let mut pos = 0;
    for value in [uncompressed_size, compressed_size, local_header_offset] {
        if *value != MAX_U32 {
            continue;
        }
        if data.len() < pos + 8 {
            return;
        }
        *value = le_u64(data, pos);
        pos += 8;
    }
}

/// WinZip AES extra field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesExtra {
    /// 1 = AE-1, 2 = AE-2
    pub vendor_version: u16,
    /// 1 = 128, 2 = 192, 3 = 256
    pub strength: u8,
    /// 实际压缩方法
    pub method: u16,
}

impl AesExtra {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 7 || &data[2..4] != b"AE" {
            return None;
        }
        Some(Self {
            vendor_version: le_u16(data, 0),
            strength: data[4],
            method: le_u16(data, 5),
        })
    }

    /// 完整字段（含 4 字节头）
    pub fn to_bytes(&self) -> [u8; 11] {
        let mut field = [0u8; 11];
        field[0..2].copy_from_slice(&AES_ID.to_le_bytes());
        field[2..4].copy_from_slice(&7u16.to_le_bytes());
        field[4..6].copy_from_slice(&self.vendor_version.to_le_bytes());
        field[6..8].copy_from_slice(b"AE");
        field[8] = self.strength;
        field[9..11].copy_from_slice(&self.method.to_le_bytes());
        field
    }
}

/// 扩展时间戳中的修改时间（Unix 秒）
pub fn parse_extended_mtime(data: &[u8]) -> Option<i32> {
    if data.len() < 5 || data[0] & 0x01 == 0 {
        return None;
    }
    Some(le_u32(data, 1) as i32)
}

/// 只含修改时间的扩展时间戳字段（本地头与中央目录相同）
pub fn extended_timestamp(mtime: i32) -> [u8; 9] {
    let mut field = [0u8; 9];
    field[0..2].copy_from_slice(&EXTENDED_TIMESTAMP_ID.to_le_bytes());
    field[2..4].copy_from_slice(&5u16.to_le_bytes());
    field[4] = 0x01;
    field[5..9].copy_from_slice(&mtime.to_le_bytes());
    field
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_and_strip() {
        let mut extra = Vec::new();
        extra.extend_from_slice(&extended_timestamp(1_700_000_000));
        extra.extend_from_slice(&AesExtra { vendor_version: 1, strength: 3, method: 8 }.to_bytes());
        extra.extend_from_slice(&[0xfe, 0xca, 0x00, 0x00]);

        let ids: Vec<u16> = fields(&extra).map(|(id, _)| id).collect();
        assert_eq!(ids, vec![EXTENDED_TIMESTAMP_ID, AES_ID, 0xcafe]);

        let aes = find(&extra, AES_ID).and_then(AesExtra::parse).unwrap();
        assert_eq!(aes.strength, 3);
        assert_eq!(aes.method, 8);

        let mtime = find(&extra, EXTENDED_TIMESTAMP_ID).and_then(parse_extended_mtime);
        assert_eq!(mtime, Some(1_700_000_000));

        let stripped = strip(&extra, &[AES_ID, EXTENDED_TIMESTAMP_ID]);
        assert_eq!(stripped, vec![0xfe, 0xca, 0x00, 0x00]);
    }

    #[test]
    fn test_truncated_field_stops() {
        let extra = [0x01, 0x00, 0x10, 0x00, 0xaa];
        assert_eq!(fields(&extra).count(), 0);
    }

    #[test]
    fn test_apply_zip64() {
        let mut data = Vec::new();
        data.extend_from_slice(&(5_000_000_000u64).to_le_bytes());
        data.extend_from_slice(&(6_000_000_000u64).to_le_bytes());

        let mut usize_ = MAX_U32;
        let mut csize = 1234;
        let mut offset = MAX_U32;
        apply_zip64(&data, &mut usize_, &mut csize, &mut offset);
        assert_eq!(usize_, 5_000_000_000);
        assert_eq!(csize, 1234);
        assert_eq!(offset, 6_000_000_000);
    }
}
