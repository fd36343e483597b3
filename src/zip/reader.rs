//! 纯 Rust ZIP 容器读取
//!
//! 定位 EOCD（含 ZIP64）、解析中央目录、定位本地文件数据。

use crate::error::{Result, ZipError};
use crate::zip::extra;
use crate::zip::format::{
    self, le_u16, le_u32, le_u64, DirectoryRecord, CENTRAL_DIR_HEADER_SIG,
    CENTRAL_DIR_HEADER_SIZE, END_OF_CENTRAL_DIR_SIG, END_OF_CENTRAL_DIR_SIZE,
    LOCAL_DIR_HEADER_SIG, LOCAL_DIR_HEADER_SIZE, MAX_U16, MAX_U32,
    ZIP64_END_OF_CENTRAL_DIR_SIG, ZIP64_END_OF_CENTRAL_DIR_SIZE, ZIP64_LOCATOR_SIG,
    ZIP64_LOCATOR_SIZE,
};
use std::io::{Read, Seek, SeekFrom};

/// 解析结果：全部中央目录记录 + 归档注释
#[derive(Debug, Clone, Default)]
pub struct CentralDirectory {
    pub records: Vec<DirectoryRecord>,
    pub comment: Vec<u8>,
}

/// EOCD (End of Central Directory) 信息
#[derive(Debug, Clone)]
struct EocdRecord {
    /// EOCD 在文件中的偏移量
    offset: u64,
    /// 中央目录偏移量
    central_dir_offset: u64,
    /// 中央目录大小
    central_dir_size: u64,
    /// 总记录数
    total_entries: u64,
    comment: Vec<u8>,
}

/// 读取整个中央目录
pub fn read_central_directory<R: Read + Seek>(reader: &mut R) -> Result<CentralDirectory> {
    let file_size = reader.seek(SeekFrom::End(0))?;
    let mut eocd = find_eocd(reader, file_size)?;

    // ZIP64：任一字段饱和时查找 locator
    if eocd.total_entries == MAX_U16
        || eocd.central_dir_size == MAX_U32
        || eocd.central_dir_offset == MAX_U32
    {
        read_zip64_eocd(reader, &mut eocd)?;
    }

    let cdir_end = eocd
        .central_dir_offset
        .checked_add(eocd.central_dir_size)
        .ok_or_else(|| ZipError::format("central directory offset out of range"))?;
    if cdir_end > eocd.offset {
        return Err(ZipError::format("central directory overlaps end record"));
    }

    // 每条记录至少 46 字节
    let min_size = eocd
        .total_entries
        .checked_mul(CENTRAL_DIR_HEADER_SIZE as u64)
        .ok_or_else(|| ZipError::format("central directory entry count out of range"))?;
    if min_size > eocd.central_dir_size {
        return Err(ZipError::format(format!(
            "central directory too small for {} entries",
            eocd.total_entries
        )));
    }

    reader.seek(SeekFrom::Start(eocd.central_dir_offset))?;
    let mut cdir = vec![0u8; eocd.central_dir_size as usize];
    reader.read_exact(&mut cdir)?;

    let records = parse_central_directory(&cdir, eocd.total_entries)?;
    log::debug!(
        "central directory: {} entries at offset {}",
        records.len(),
        eocd.central_dir_offset
    );

    Ok(CentralDirectory {
        records,
        comment: eocd.comment,
    })
}

/// 查找并解析 EOCD 记录
///
/// EOCD 签名可能出现在注释或数据中，必须选择最接近文件末尾、
/// 且注释长度不越界的那一个
fn find_eocd<R: Read + Seek>(reader: &mut R, file_size: u64) -> Result<EocdRecord> {
    const MAX_SCAN_SIZE: u64 = MAX_U16 + END_OF_CENTRAL_DIR_SIZE as u64;

    if file_size < END_OF_CENTRAL_DIR_SIZE as u64 {
        return Err(ZipError::format("file too small to be a ZIP archive"));
    }

    let scan = file_size.min(MAX_SCAN_SIZE);
    let start = file_size - scan;
    let mut tail = vec![0u8; scan as usize];
    reader.seek(SeekFrom::Start(start))?;
    reader.read_exact(&mut tail)?;

    // 从后向前搜索签名
    for i in (0..=tail.len() - END_OF_CENTRAL_DIR_SIZE).rev() {
        if le_u32(&tail, i) != END_OF_CENTRAL_DIR_SIG {
            continue;
        }
        let record = &tail[i..i + END_OF_CENTRAL_DIR_SIZE];
        let comment_len = le_u16(record, 20) as usize;
        let comment_start = i + END_OF_CENTRAL_DIR_SIZE;
        if comment_start + comment_len > tail.len() {
            continue;
        }

        // 不支持多卷归档
        let disk_num = le_u16(record, 4);
        let cdir_disk = le_u16(record, 6);
        if disk_num != 0 || cdir_disk != 0 {
            return Err(ZipError::format("multi-disk ZIP archives are not supported"));
        }

        return Ok(EocdRecord {
            offset: start + i as u64,
            total_entries: u64::from(le_u16(record, 10)),
            central_dir_size: u64::from(le_u32(record, 12)),
            central_dir_offset: u64::from(le_u32(record, 16)),
            comment: tail[comment_start..comment_start + comment_len].to_vec(),
        });
    }

    Err(ZipError::format("cannot find end of central directory"))
}

/// 读取 ZIP64 EOCD locator 与记录，覆盖 32 位字段
fn read_zip64_eocd<R: Read + Seek>(reader: &mut R, eocd: &mut EocdRecord) -> Result<()> {
    if eocd.offset < ZIP64_LOCATOR_SIZE as u64 {
        return Ok(());
    }

    let mut locator = [0u8; ZIP64_LOCATOR_SIZE];
    reader.seek(SeekFrom::Start(eocd.offset - ZIP64_LOCATOR_SIZE as u64))?;
    reader.read_exact(&mut locator)?;
    if le_u32(&locator, 0) != ZIP64_LOCATOR_SIG {
        // 饱和值也可能是合法的 32 位值
        return Ok(());
    }

    let record_offset = le_u64(&locator, 8);
    let record_end = record_offset.checked_add(ZIP64_END_OF_CENTRAL_DIR_SIZE as u64);
    if record_end.map_or(true, |end| end > eocd.offset) {
        return Err(ZipError::format("invalid ZIP64 end of central directory offset"));
    }

    let mut record = [0u8; ZIP64_END_OF_CENTRAL_DIR_SIZE];
    reader.seek(SeekFrom::Start(record_offset))?;
    reader.read_exact(&mut record)?;
    if le_u32(&record, 0) != ZIP64_END_OF_CENTRAL_DIR_SIG {
        return Err(ZipError::format(
            "invalid ZIP64 end of central directory signature",
        ));
    }

    eocd.total_entries = le_u64(&record, 32);
    eocd.central_dir_size = le_u64(&record, 40);
    eocd.central_dir_offset = le_u64(&record, 48);
    // 中央目录结束于 ZIP64 记录之前
    eocd.offset = record_offset;
    Ok(())
}

/// 解析中央目录
fn parse_central_directory(cdir: &[u8], total_entries: u64) -> Result<Vec<DirectoryRecord>> {
    let mut records = Vec::with_capacity(total_entries.min(65536) as usize);
    let mut pos = 0usize;

    for index in 0..total_entries {
        if cdir.len() < pos + CENTRAL_DIR_HEADER_SIZE {
            return Err(ZipError::format(format!(
                "central directory truncated at entry {}",
                index
            )));
        }
        let header = &cdir[pos..pos + CENTRAL_DIR_HEADER_SIZE];
        if le_u32(header, 0) != CENTRAL_DIR_HEADER_SIG {
            return Err(ZipError::format(format!(
                "invalid central directory header signature at entry {}: 0x{:08x}",
                index,
                le_u32(header, 0)
            )));
        }

        let name_len = le_u16(header, 28) as usize;
        let extra_len = le_u16(header, 30) as usize;
        let comment_len = le_u16(header, 32) as usize;
        let var_start = pos + CENTRAL_DIR_HEADER_SIZE;
        let var_end = var_start + name_len + extra_len + comment_len;
        if cdir.len() < var_end {
            return Err(ZipError::format(format!(
                "central directory record {} extends beyond directory",
                index
            )));
        }

        let name = cdir[var_start..var_start + name_len].to_vec();
        let extra = cdir[var_start + name_len..var_start + name_len + extra_len].to_vec();
        let comment = cdir[var_start + name_len + extra_len..var_end].to_vec();

        let mut record = DirectoryRecord {
            version_made_by: le_u16(header, 4),
            version_needed: le_u16(header, 6),
            flags: le_u16(header, 8),
            method: le_u16(header, 10),
            dos_time: le_u16(header, 12),
            dos_date: le_u16(header, 14),
            crc32: le_u32(header, 16),
            compressed_size: u64::from(le_u32(header, 20)),
            uncompressed_size: u64::from(le_u32(header, 24)),
            name,
            extra,
            comment,
            internal_attr: le_u16(header, 36),
            external_attr: le_u32(header, 38),
            local_header_offset: u64::from(le_u32(header, 42)),
        };

        if let Some(zip64) = extra::find(&record.extra, extra::ZIP64_ID) {
            extra::apply_zip64(
                zip64,
                &mut record.uncompressed_size,
                &mut record.compressed_size,
                &mut record.local_header_offset,
            );
        }

        records.push(record);
        pos = var_end;
    }

    Ok(records)
}

/// 本地文件头信息
#[derive(Debug, Clone)]
pub struct LocalHeader {
    pub method: u16,
    pub flags: u16,
    pub name: Vec<u8>,
    pub extra: Vec<u8>,
    /// 压缩数据起始偏移
    pub data_offset: u64,
}

/// 读取本地文件头
pub fn read_local_header<R: Read + Seek>(
    reader: &mut R,
    record: &DirectoryRecord,
) -> Result<LocalHeader> {
    reader.seek(SeekFrom::Start(record.local_header_offset))?;

    let mut header = [0u8; LOCAL_DIR_HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let sig = le_u32(&header, 0);
    if sig != LOCAL_DIR_HEADER_SIG {
        return Err(ZipError::format(format!(
            "invalid local header signature for '{}': 0x{:08x}",
            String::from_utf8_lossy(&record.name),
            sig
        )));
    }

    let name_len = le_u16(&header, 26) as usize;
    let extra_len = le_u16(&header, 28) as usize;
    let mut name = vec![0u8; name_len];
    reader.read_exact(&mut name)?;
    let mut extra = vec![0u8; extra_len];
    reader.read_exact(&mut extra)?;

    let data_offset = record
        .local_header_offset
        .checked_add((LOCAL_DIR_HEADER_SIZE + name_len + extra_len) as u64)
        .ok_or_else(|| ZipError::format("local header offset out of range"))?;

    Ok(LocalHeader {
        method: le_u16(&header, 8),
        flags: le_u16(&header, 6),
        name,
        extra,
        data_offset,
    })
}

/// 校验本地头与中央目录记录一致（签名、文件名、方法）
pub fn check_local_header<R: Read + Seek>(
    reader: &mut R,
    record: &DirectoryRecord,
) -> Result<()> {
    let local = read_local_header(reader, record)?;
    if local.name != record.name {
        return Err(ZipError::format(format!(
            "local header name mismatch for '{}'",
            String::from_utf8_lossy(&record.name)
        )));
    }
    if local.method != record.method {
        return Err(ZipError::format(format!(
            "local header method mismatch for '{}': {} != {}",
            String::from_utf8_lossy(&record.name),
            local.method,
            record.method
        )));
    }
    let data_end = local.data_offset.checked_add(record.compressed_size);
    let file_size = reader.seek(SeekFrom::End(0))?;
    if data_end.map_or(true, |end| end > file_size) {
        return Err(ZipError::format(format!(
            "data of '{}' extends beyond end of file",
            String::from_utf8_lossy(&record.name)
        )));
    }
    Ok(())
}

/// 文件开头的 4 字节签名是否为 ZIP
pub fn has_zip_signature(prefix: &[u8]) -> bool {
    if prefix.len() < 4 || prefix[0] != b'P' || prefix[1] != b'K' {
        return false;
    }
    let sig = le_u32(prefix, 0);
    sig == format::LOCAL_DIR_HEADER_SIG
        || sig == format::END_OF_CENTRAL_DIR_SIG
        || sig == format::DATA_DESCRIPTOR_SIG
}
