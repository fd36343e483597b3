//! 纯 Rust ZIP 容器写入
//!
//! 依次写入本地文件头与数据，最后写入中央目录与 EOCD。
//! 不生成 ZIP64 结构，超出 32/16 位字段范围时返回 `IntegerOverflow`。

use crate::error::{narrow, Result, ZipError};
use crate::zip::format::{
    DirectoryRecord, CENTRAL_DIR_HEADER_SIG, CENTRAL_DIR_HEADER_SIZE, DATA_DESCRIPTOR_SIG,
    END_OF_CENTRAL_DIR_SIG, END_OF_CENTRAL_DIR_SIZE, FLAG_DATA_DESCRIPTOR,
    LOCAL_DIR_HEADER_SIG, LOCAL_DIR_HEADER_SIZE, MAX_U16, MAX_U32,
};
use std::io::{Seek, SeekFrom, Write};

/// 32 位大小/偏移字段；0xFFFFFFFF 是 ZIP64 标记值，不能直接写入
fn field32(value: u64, what: &'static str) -> Result<u32> {
    if value >= MAX_U32 {
        return Err(ZipError::IntegerOverflow { what });
    }
    narrow(value, what)
}

/// 16 位条目数字段；0xFFFF 同样保留给 ZIP64
fn field16(value: u64, what: &'static str) -> Result<u16> {
    if value >= MAX_U16 {
        return Err(ZipError::IntegerOverflow { what });
    }
    narrow(value, what)
}

/// 容器写入器
pub struct ContainerWriter<W: Write + Seek> {
    writer: W,
    /// 已写入条目的中央目录记录
    records: Vec<DirectoryRecord>,
}

impl<W: Write + Seek> ContainerWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            records: Vec::new(),
        }
    }

    /// 写入本地文件头，返回其偏移量
    ///
    /// `record` 中的 CRC 与大小可以是占位值，数据写完后用
    /// [`patch_local_header`](Self::patch_local_header) 回填
    pub fn write_local_header(&mut self, record: &DirectoryRecord, extra: &[u8]) -> Result<u64> {
        let offset = self.writer.stream_position()?;
        field32(offset, "local header offset")?;

        let name_len: u16 = narrow(record.name.len() as u64, "entry name length")?;
        let extra_len: u16 = narrow(extra.len() as u64, "extra field length")?;

        // 使用数据描述符时，本地头中的 CRC 与大小为 0
        let (crc, csize, usize_) = if record.flags & FLAG_DATA_DESCRIPTOR != 0 {
            (0, 0, 0)
        } else {
            (
                record.crc32,
                field32(record.compressed_size, "compressed size")?,
                field32(record.uncompressed_size, "uncompressed size")?,
            )
        };

        let mut header = [0u8; LOCAL_DIR_HEADER_SIZE];
        header[0..4].copy_from_slice(&LOCAL_DIR_HEADER_SIG.to_le_bytes());
        header[4..6].copy_from_slice(&record.version_needed.to_le_bytes());
        header[6..8].copy_from_slice(&record.flags.to_le_bytes());
        header[8..10].copy_from_slice(&record.method.to_le_bytes());
        header[10..12].copy_from_slice(&record.dos_time.to_le_bytes());
        header[12..14].copy_from_slice(&record.dos_date.to_le_bytes());
        header[14..18].copy_from_slice(&crc.to_le_bytes());
        header[18..22].copy_from_slice(&csize.to_le_bytes());
        header[22..26].copy_from_slice(&usize_.to_le_bytes());
        header[26..28].copy_from_slice(&name_len.to_le_bytes());
        header[28..30].copy_from_slice(&extra_len.to_le_bytes());

        self.writer.write_all(&header)?;
        self.writer.write_all(&record.name)?;
        self.writer.write_all(extra)?;
        Ok(offset)
    }

    /// 回填本地头中的 CRC 与大小（偏移 14..26），然后回到末尾
    pub fn patch_local_header(
        &mut self,
        header_offset: u64,
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
    ) -> Result<()> {
        let csize = field32(compressed_size, "compressed size")?;
        let usize_ = field32(uncompressed_size, "uncompressed size")?;

        let mut fields = [0u8; 12];
        fields[0..4].copy_from_slice(&crc32.to_le_bytes());
        fields[4..8].copy_from_slice(&csize.to_le_bytes());
        fields[8..12].copy_from_slice(&usize_.to_le_bytes());

        let end = self.writer.stream_position()?;
        self.writer.seek(SeekFrom::Start(header_offset + 14))?;
        self.writer.write_all(&fields)?;
        self.writer.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    /// 写入带签名的数据描述符
    pub fn write_data_descriptor(
        &mut self,
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
    ) -> Result<()> {
        let mut descriptor = [0u8; 16];
        descriptor[0..4].copy_from_slice(&DATA_DESCRIPTOR_SIG.to_le_bytes());
        descriptor[4..8].copy_from_slice(&crc32.to_le_bytes());
        descriptor[8..12]
            .copy_from_slice(&field32(compressed_size, "compressed size")?.to_le_bytes());
        descriptor[12..16].copy_from_slice(
            &field32(uncompressed_size, "uncompressed size")?.to_le_bytes(),
        );
        self.writer.write_all(&descriptor)?;
        Ok(())
    }

    /// 条目数据的写入端
    pub fn data(&mut self) -> &mut W {
        &mut self.writer
    }

    /// 登记一条完成的中央目录记录
    pub fn push_record(&mut self, record: DirectoryRecord) {
        self.records.push(record);
    }

    /// 写入中央目录与 EOCD，返回底层写入器
    pub fn finish(mut self, comment: &[u8]) -> Result<W> {
        let count = field16(self.records.len() as u64, "entry count")?;
        let comment_len: u16 = narrow(comment.len() as u64, "archive comment length")?;

        let central_dir_offset = self.writer.stream_position()?;
        for record in &self.records {
            write_central_record(&mut self.writer, record)?;
        }
        let central_dir_size = self.writer.stream_position()? - central_dir_offset;

        let mut eocd = [0u8; END_OF_CENTRAL_DIR_SIZE];
        eocd[0..4].copy_from_slice(&END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        // 磁盘编号与起始磁盘为 0
        eocd[8..10].copy_from_slice(&count.to_le_bytes());
        eocd[10..12].copy_from_slice(&count.to_le_bytes());
        eocd[12..16].copy_from_slice(
            &field32(central_dir_size, "central directory size")?.to_le_bytes(),
        );
        eocd[16..20].copy_from_slice(
            &field32(central_dir_offset, "central directory offset")?.to_le_bytes(),
        );
        eocd[20..22].copy_from_slice(&comment_len.to_le_bytes());

        self.writer.write_all(&eocd)?;
        self.writer.write_all(comment)?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// 写入一条中央目录记录
fn write_central_record<W: Write>(writer: &mut W, record: &DirectoryRecord) -> Result<()> {
    let name_len: u16 = narrow(record.name.len() as u64, "entry name length")?;
    let extra_len: u16 = narrow(record.extra.len() as u64, "extra field length")?;
    let comment_len: u16 = narrow(record.comment.len() as u64, "entry comment length")?;

    let mut header = [0u8; CENTRAL_DIR_HEADER_SIZE];
    header[0..4].copy_from_slice(&CENTRAL_DIR_HEADER_SIG.to_le_bytes());
    header[4..6].copy_from_slice(&record.version_made_by.to_le_bytes());
    header[6..8].copy_from_slice(&record.version_needed.to_le_bytes());
    header[8..10].copy_from_slice(&record.flags.to_le_bytes());
    header[10..12].copy_from_slice(&record.method.to_le_bytes());
    header[12..14].copy_from_slice(&record.dos_time.to_le_bytes());
    header[14..16].copy_from_slice(&record.dos_date.to_le_bytes());
    header[16..20].copy_from_slice(&record.crc32.to_le_bytes());
    header[20..24]
        .copy_from_slice(&field32(record.compressed_size, "compressed size")?.to_le_bytes());
    header[24..28].copy_from_slice(
        &field32(record.uncompressed_size, "uncompressed size")?.to_le_bytes(),
    );
    header[28..30].copy_from_slice(&name_len.to_le_bytes());
    header[30..32].copy_from_slice(&extra_len.to_le_bytes());
    header[32..34].copy_from_slice(&comment_len.to_le_bytes());
    // 起始磁盘 34..36 为 0
    header[36..38].copy_from_slice(&record.internal_attr.to_le_bytes());
    header[38..42].copy_from_slice(&record.external_attr.to_le_bytes());
    header[42..46].copy_from_slice(
        &field32(record.local_header_offset, "local header offset")?.to_le_bytes(),
    );

    writer.write_all(&header)?;
    writer.write_all(&record.name)?;
    writer.write_all(&record.extra)?;
    writer.write_all(&record.comment)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ZipError;
    use crate::zip::format::{FLAG_UTF8, METHOD_STORE, VERSION_MADE_BY, VERSION_NEEDED};
    use crate::zip::reader::{read_central_directory, read_local_header};
    use std::io::{Cursor, Write};

    fn stored_record(name: &str, data: &[u8]) -> DirectoryRecord {
        DirectoryRecord {
            version_made_by: VERSION_MADE_BY,
            version_needed: VERSION_NEEDED,
            flags: FLAG_UTF8,
            method: METHOD_STORE,
            dos_time: 0,
            dos_date: (40 << 9) | (1 << 5) | 1,
            crc32: crc32fast::hash(data),
            compressed_size: data.len() as u64,
            uncompressed_size: data.len() as u64,
            name: name.as_bytes().to_vec(),
            extra: Vec::new(),
            comment: Vec::new(),
            internal_attr: 0,
            external_attr: 0o100644 << 16,
            local_header_offset: 0,
        }
    }

    #[test]
    fn test_write_then_read_back() {
        let mut writer = ContainerWriter::new(Cursor::new(Vec::new()));
        for (name, data) in [("a.txt", &b"alpha"[..]), ("dir/b.txt", &b"beta"[..])] {
            let mut record = stored_record(name, data);
            let offset = writer.write_local_header(&record, &[]).unwrap();
            writer.data().write_all(data).unwrap();
            record.local_header_offset = offset;
            writer.push_record(record);
        }
        let bytes = writer.finish(b"archive comment").unwrap().into_inner();

        let mut cursor = Cursor::new(bytes);
        let cdir = read_central_directory(&mut cursor).unwrap();
        assert_eq!(cdir.comment, b"archive comment");
        assert_eq!(cdir.records.len(), 2);
        assert_eq!(cdir.records[1].name, b"dir/b.txt");
        assert_eq!(cdir.records[1].crc32, crc32fast::hash(b"beta"));

        let local = read_local_header(&mut cursor, &cdir.records[1]).unwrap();
        assert_eq!(local.name, b"dir/b.txt");
        let start = local.data_offset as usize;
        assert_eq!(&cursor.get_ref()[start..start + 4], b"beta");
    }

    #[test]
    fn test_patch_local_header() {
        let mut writer = ContainerWriter::new(Cursor::new(Vec::new()));
        let record = stored_record("late.txt", b"");
        let offset = writer.write_local_header(&record, &[]).unwrap();
        writer.data().write_all(b"payload").unwrap();
        writer
            .patch_local_header(offset, 0xAABBCCDD, 7, 7)
            .unwrap();
        let bytes = writer.data().get_ref().clone();
        assert_eq!(&bytes[14..18], &0xAABBCCDDu32.to_le_bytes());
        assert_eq!(&bytes[18..22], &7u32.to_le_bytes());
        // 写入位置回到数据末尾
        assert_eq!(writer.data().position() as usize, bytes.len());
    }

    #[test]
    fn test_zip64_sentinels_rejected() {
        assert_eq!(field32(MAX_U32 - 1, "size").unwrap(), 0xFFFF_FFFE);
        assert!(matches!(
            field32(MAX_U32, "size"),
            Err(ZipError::IntegerOverflow { what: "size" })
        ));
        assert!(field16(MAX_U16, "entry count").is_err());
        assert_eq!(field16(MAX_U16 - 1, "entry count").unwrap(), 0xFFFE);

        let mut writer = ContainerWriter::new(Cursor::new(Vec::new()));
        let mut record = stored_record("big.bin", b"");
        record.compressed_size = MAX_U32;
        record.uncompressed_size = MAX_U32;
        assert!(matches!(
            writer.write_local_header(&record, &[]),
            Err(ZipError::IntegerOverflow { .. })
        ));
        let offset = writer.write_local_header(&stored_record("ok", b""), &[]).unwrap();
        assert!(writer.patch_local_header(offset, 0, MAX_U32, 0).is_err());
        assert!(writer.write_data_descriptor(0, 0, MAX_U32).is_err());
    }

    #[test]
    fn test_comment_too_long() {
        let writer = ContainerWriter::new(Cursor::new(Vec::new()));
        let comment = vec![b'x'; 70000];
        assert!(matches!(
            writer.finish(&comment),
            Err(ZipError::IntegerOverflow { .. })
        ));
    }
}
