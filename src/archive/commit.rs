//! Commit: write the resulting entry set into a temporary file beside the
//! archive, then move it over the original in one rename.
//!
//! Entries without content, compression or encryption changes are copied
//! with their stored bytes untouched. Everything else is decoded (or read
//! from its source) and encoded again.

use super::Archive;
use crate::entry::stat::is_directory;
use crate::error::{Result, ZipError};
use crate::platform::{current_platform, Platform};
use crate::progress::fraction;
use crate::types::{CompressionLevel, CompressionMethod, EncryptionMethod};
use crate::unzip::reader::open_stored;
use crate::zip::codec::{classify, Compressor, CountingWriter};
use crate::zip::crypto::{AesStrength, EntryEncryptor};
use crate::zip::extra::{self, AesExtra, AES_ID, EXTENDED_TIMESTAMP_ID, ZIP64_ID};
use crate::zip::format::{
    system_time_to_dos, DirectoryRecord, FLAG_DATA_DESCRIPTOR, FLAG_ENCRYPTED, FLAG_UTF8,
    METHOD_AES, VERSION_MADE_BY, VERSION_NEEDED,
    VERSION_NEEDED_AES,
};
use crate::zip::reader::read_local_header;
use crate::zip::writer::ContainerWriter;
use std::fs;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;

const COPY_BUFFER_SIZE: usize = 80 * 1024;

/// Seconds since the epoch, clamped to the extended timestamp field.
fn unix_seconds(time: SystemTime) -> i32 {
    let secs = match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_secs()).unwrap_or(i64::MAX),
    };
    secs.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

fn with_timestamp(extra_field: &[u8], modified: SystemTime) -> Vec<u8> {
    let mut out = extra::strip(extra_field, &[EXTENDED_TIMESTAMP_ID]);
    out.extend_from_slice(&extra::extended_timestamp(unix_seconds(modified)));
    out
}

/// Stream `reader` through compression and encryption into `sink`.
///
/// `expected` is the size the content announced, if any; a different byte
/// count fails with `Truncated`. Returns `(crc32, compressed_size,
/// uncompressed_size)`.
#[allow(clippy::too_many_arguments)]
fn encode_entry<R: Read + ?Sized, W: Write>(
    reader: &mut R,
    sink: &mut W,
    name: &str,
    expected: Option<u64>,
    method: CompressionMethod,
    level: CompressionLevel,
    encryption: EncryptionMethod,
    password: Option<&str>,
    check: u16,
) -> Result<(u32, u64, u64)> {
    let counter = CountingWriter::new(sink);
    let encryptor = EntryEncryptor::new(
        counter,
        encryption,
        password.unwrap_or_default().as_bytes(),
        check,
    )?;
    let mut compressor = Compressor::new(method, level, encryptor)?;

    let mut hasher = crc32fast::Hasher::new();
    let mut total = 0u64;
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(classify(e, name)),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
        compressor.write_all(&buf[..n])?;
    }
    if let Some(expected) = expected {
        if total != expected {
            return Err(ZipError::Truncated {
                name: name.to_string(),
                expected,
                actual: total,
            });
        }
    }

    let encryptor = compressor.finish()?;
    let counter = encryptor.finish()?;
    Ok((hasher.finalize(), counter.count(), total))
}

impl Archive {
    pub(super) fn commit(&mut self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| ZipError::file_write(&dir, e))?;
        log::debug!(
            "committing {} changes to '{}' via '{}'",
            self.changes.len(),
            self.path.display(),
            temp.path().display()
        );

        {
            let writer = self.write_entries(ContainerWriter::new(BufWriter::new(temp.as_file_mut())))?;
            writer.into_inner().map_err(|e| ZipError::from(e.into_error()))?;
        }
        temp.as_file().sync_all()?;
        self.copy_permissions(temp.path());

        // the original handle has to be closed before it can be replaced
        let had_file = self.file.take().is_some();
        if let Err(e) = temp.persist(&self.path) {
            if had_file {
                self.file = fs::File::open(&self.path).ok();
            }
            return Err(ZipError::file_write(&self.path, e.error));
        }
        log::debug!("committed '{}'", self.path.display());
        Ok(())
    }

    fn copy_permissions(&self, temp: &Path) {
        let platform = current_platform();
        let result = match fs::metadata(&self.path) {
            Ok(meta) => fs::set_permissions(temp, meta.permissions()),
            Err(_) if platform.has_posix_permissions() => platform.set_permissions(temp, 0o644),
            Err(_) => Ok(()),
        };
        if let Err(e) = result {
            log::warn!("cannot set permissions on '{}': {}", temp.display(), e);
        }
    }

    fn report(&mut self, value: f64) {
        if let Some(progress) = self.progress.as_mut() {
            progress.on_progress(value);
        }
    }

    fn committed_comment(&self) -> Vec<u8> {
        match &self.changes.comment {
            Some(Some(comment)) => comment.as_bytes().to_vec(),
            Some(None) => Vec::new(),
            None => self.base_comment.clone(),
        }
    }

    fn write_entries<W: Write + Seek>(&mut self, mut out: ContainerWriter<W>) -> Result<W> {
        let live = self.live_indices();
        let total = live.len() as u64;
        self.report(0.0);

        for (done, &index) in live.iter().enumerate() {
            let verbatim = index < self.base_len()
                && self
                    .changes
                    .get(index)
                    .map_or(true, |change| change.keeps_data());
            let record = if verbatim {
                self.copy_verbatim(&mut out, index)?
            } else {
                self.reencode(&mut out, index)?
            };
            out.push_record(record);
            self.report(fraction(done as u64 + 1, total));
        }
        if total == 0 {
            self.report(1.0);
        }

        let comment = self.committed_comment();
        out.finish(&comment)
    }

    /// Copy the stored bytes of a base entry, applying metadata changes to
    /// its headers.
    fn copy_verbatim<W: Write + Seek>(
        &mut self,
        out: &mut ContainerWriter<W>,
        index: u64,
    ) -> Result<DirectoryRecord> {
        let name = self.current_name(index).to_string();
        let mut record = self.base[index as usize].clone();
        // the ZipCrypto check byte comes from the DOS time in this layout
        let trad_descriptor = record.has_data_descriptor()
            && record.encryption_method() == EncryptionMethod::TradPkware;

        if let Some(change) = self.changes.get(index) {
            if change.name.is_some() {
                let (raw, utf8) = crate::entry::name::encode_name(&name);
                record.name = raw;
                record.flags = (record.flags & !FLAG_UTF8) | utf8;
            }
            if let Some(attributes) = change.attributes {
                record.version_made_by =
                    (u16::from(attributes.host.as_u8()) << 8) | (record.version_made_by & 0xff);
                record.external_attr = attributes.bits;
            }
            if let Some(modified) = change.modified {
                if !trad_descriptor {
                    let (dos_time, dos_date) = system_time_to_dos(modified);
                    record.dos_time = dos_time;
                    record.dos_date = dos_date;
                }
                record.extra = with_timestamp(&record.extra, modified);
            }
        }
        record.extra = extra::strip(&record.extra, &[ZIP64_ID]);
        if !trad_descriptor {
            record.flags &= !FLAG_DATA_DESCRIPTOR;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| ZipError::internal("archive file is not open"))?;
        let local = read_local_header(file, &self.base[index as usize])?;
        file.seek(SeekFrom::Start(local.data_offset))?;

        let offset = out.write_local_header(&record, &record.extra)?;
        let copied = io::copy(&mut Read::take(&mut *file, record.compressed_size), out.data())?;
        if copied < record.compressed_size {
            return Err(ZipError::Truncated {
                name,
                expected: record.compressed_size,
                actual: copied,
            });
        }
        if trad_descriptor {
            out.write_data_descriptor(record.crc32, record.compressed_size, record.uncompressed_size)?;
        }
        record.local_header_offset = offset;
        log::debug!("copied '{}' verbatim ({} bytes)", name, copied);
        Ok(record)
    }

    /// Write an entry from its pending source or from its decoded base data.
    fn reencode<W: Write + Seek>(
        &mut self,
        out: &mut ContainerWriter<W>,
        index: u64,
    ) -> Result<DirectoryRecord> {
        let stat = self.stat(index)?;
        let name = stat.name.clone();
        let base_record = self.base.get(index as usize).cloned();
        let is_dir = is_directory(&name, stat.external_attributes);

        let (pending, compression, encryption_change) = match self.changes.get(index) {
            Some(change) => (
                change.content.is_some(),
                change.compression,
                change
                    .encryption
                    .as_ref()
                    .map(|e| (e.method, e.password.clone())),
            ),
            None => (false, None, None),
        };

        let (method, level) = match (compression, &base_record) {
            (Some(pair), _) => pair,
            (None, Some(record)) => (
                record.compression_method(),
                CompressionLevel::from_flags(record.flags),
            ),
            (None, None) => self.default_compression,
        };
        let method = match method {
            _ if is_dir => CompressionMethod::Store,
            CompressionMethod::Default => CompressionMethod::Deflate,
            CompressionMethod::Store | CompressionMethod::Deflate => method,
            other => {
                return Err(ZipError::unsupported(format!(
                    "compression method {} for entry '{}'",
                    other, name
                )))
            }
        };

        let (encryption, explicit_password) = match encryption_change {
            Some((method, password)) => (method, password),
            None => (stat.encryption_method, None),
        };
        let password = explicit_password.or_else(|| self.default_password.clone());
        if encryption.is_encrypted() && password.is_none() {
            return Err(ZipError::MissingPassword { name });
        }
        let aes = AesStrength::from_method(encryption);
        let trad = encryption == EncryptionMethod::TradPkware;

        let method_id = method
            .as_u16()
            .ok_or_else(|| ZipError::internal("compression method left unresolved"))?;
        let mut flags = stat.flags & FLAG_UTF8;
        if encryption.is_encrypted() {
            flags |= FLAG_ENCRYPTED;
        }
        if method == CompressionMethod::Deflate {
            flags |= level.to_flags();
        }
        if trad {
            flags |= FLAG_DATA_DESCRIPTOR;
        }

        let mut extra_field = base_record
            .as_ref()
            .map(|r| extra::strip(&r.extra, &[ZIP64_ID, AES_ID, EXTENDED_TIMESTAMP_ID]))
            .unwrap_or_default();
        extra_field.extend_from_slice(&extra::extended_timestamp(unix_seconds(stat.modified)));
        if let Some(strength) = aes {
            let field = AesExtra {
                vendor_version: 1,
                strength: strength.code(),
                method: method_id,
            };
            extra_field.extend_from_slice(&field.to_bytes());
        }

        let (dos_time, dos_date) = system_time_to_dos(stat.modified);
        let attributes = stat.external_attributes;
        let mut record = DirectoryRecord {
            version_made_by: (u16::from(attributes.host.as_u8()) << 8) | (VERSION_MADE_BY & 0xff),
            version_needed: if aes.is_some() {
                VERSION_NEEDED_AES
            } else {
                VERSION_NEEDED
            },
            flags,
            method: if aes.is_some() { METHOD_AES } else { method_id },
            dos_time,
            dos_date,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            name: stat.raw_name.clone(),
            extra: extra_field,
            comment: base_record.as_ref().map(|r| r.comment.clone()).unwrap_or_default(),
            internal_attr: base_record.as_ref().map_or(0, |r| r.internal_attr),
            external_attr: attributes.bits,
            local_header_offset: 0,
        };

        let offset = out.write_local_header(&record, &record.extra)?;
        let password = password.as_ref().map(|p| p.as_str());
        let (crc32, compressed_size, uncompressed_size) = if pending {
            let content = self
                .changes
                .get_mut(index)
                .and_then(|change| change.content.as_mut())
                .ok_or_else(|| ZipError::internal("pending content vanished"))?;
            let expected = content.stat.size;
            let mut reader = content.source.open()?;
            encode_entry(
                &mut reader,
                out.data(),
                &name,
                expected,
                method,
                level,
                encryption,
                password,
                dos_time,
            )?
        } else {
            let base = base_record
                .as_ref()
                .ok_or_else(|| ZipError::internal("entry has neither content nor stored data"))?;
            let file = self
                .file
                .as_mut()
                .ok_or_else(|| ZipError::internal("archive file is not open"))?;
            let read_password = self.default_password.as_ref().map(|p| p.as_str());
            let mut reader = open_stored(file, base, &name, read_password)?;
            encode_entry(
                &mut reader,
                out.data(),
                &name,
                None,
                method,
                level,
                encryption,
                password,
                dos_time,
            )?
        };

        record.crc32 = crc32;
        record.compressed_size = compressed_size;
        record.uncompressed_size = uncompressed_size;
        if trad {
            out.write_data_descriptor(crc32, compressed_size, uncompressed_size)?;
        } else {
            out.patch_local_header(offset, crc32, compressed_size, uncompressed_size)?;
        }
        record.local_header_offset = offset;

        log::debug!(
            "encoded '{}': {} -> {} bytes ({}, {})",
            name,
            uncompressed_size,
            compressed_size,
            method,
            encryption
        );
        Ok(record)
    }
}
