// 解压测试

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use common::{make_zip, test_temp_dir};
use ziprw::{
    Archive, CompressionLevel, CompressionMethod, ExtractOptions, NoProgress, OpenMode, ZipError,
    ZipErrorCode,
};

#[test]
fn test_extract_all() {
    let tmp = test_temp_dir();
    let path = make_zip(
        tmp.path(),
        "t.zip",
        &[("dir/", b""), ("dir/a.txt", b"aaa"), ("b.txt", b"bbbb"), ("empty/", b"")],
    );
    let out = tmp.path().join("out");

    let mut calls = Vec::new();
    let mut archive = Archive::open(&path, OpenMode::NONE).unwrap();
    archive
        .extract_all(&out, &ExtractOptions::new(), |name: &str, _: f64, total: f64| {
            calls.push((name.to_string(), total));
            true
        })
        .unwrap();

    assert_eq!(fs::read(out.join("dir/a.txt")).unwrap(), b"aaa");
    assert_eq!(fs::read(out.join("b.txt")).unwrap(), b"bbbb");
    assert!(out.join("empty").is_dir());

    assert_eq!(calls.last(), Some(&(String::new(), 1.0)));
    assert!(calls.windows(2).all(|w| w[0].1 <= w[1].1));
    assert!(calls.iter().any(|(name, _)| name == "dir/a.txt"));
}

#[test]
fn test_extract_all_rejects_escaping_names() {
    let tmp = test_temp_dir();
    let path = make_zip(tmp.path(), "t.zip", &[("ok.txt", b"fine"), ("../evil.txt", b"bad")]);
    let out = tmp.path().join("out");

    let mut archive = Archive::open(&path, OpenMode::NONE).unwrap();
    let err = archive
        .extract_all(&out, &ExtractOptions::new(), NoProgress)
        .unwrap_err();
    assert!(matches!(err, ZipError::InvalidName { .. }));
    // 名称检查在写入任何文件之前完成
    assert!(!out.exists());
    assert!(!tmp.path().join("evil.txt").exists());
}

#[test]
fn test_extract_cancel() {
    let tmp = test_temp_dir();
    let big = vec![7u8; 300 * 1024];
    let path = make_zip(tmp.path(), "t.zip", &[("big.bin", &big), ("small", b"s")]);

    let mut archive = Archive::open(&path, OpenMode::NONE).unwrap();
    let target = tmp.path().join("big.bin");
    let mut seen = 0;
    let err = archive
        .read_entry(0)
        .unwrap()
        .extract_to_path(&target, &ExtractOptions::new(), |_: &str, f: f64| {
            seen += 1;
            f < 0.5
        })
        .unwrap_err();
    assert_eq!(err.code(), ZipErrorCode::Cancelled);
    assert!(seen >= 2);

    let out = tmp.path().join("all");
    let err = archive
        .extract_all(&out, &ExtractOptions::new(), |_: &str, _: f64, _: f64| false)
        .unwrap_err();
    assert!(matches!(err, ZipError::Cancelled));
}

#[test]
fn test_extract_to_writer_reports_bytes() {
    let tmp = test_temp_dir();
    let body = b"0123456789".repeat(20_000);
    let path = make_zip(tmp.path(), "t.zip", &[("digits.txt", &body)]);

    let mut archive = Archive::open(&path, OpenMode::NONE).unwrap();
    let mut fractions = Vec::new();
    let mut sink = Vec::new();
    let written = archive
        .read_entry_by_name("digits.txt", true)
        .unwrap()
        .extract_to_writer(&mut sink, None, |_: &str, f: f64| {
            fractions.push(f);
            true
        })
        .unwrap();

    assert_eq!(written, body.len() as u64);
    assert_eq!(sink, body);
    assert_eq!(fractions.first(), Some(&0.0));
    assert_eq!(fractions.last(), Some(&1.0));
}

#[test]
fn test_overwrite_conflict() {
    let tmp = test_temp_dir();
    let path = make_zip(tmp.path(), "t.zip", &[("a.txt", b"new")]);
    let target = tmp.path().join("a.txt");
    fs::write(&target, b"old").unwrap();

    let mut archive = Archive::open(&path, OpenMode::NONE).unwrap();
    let err = archive
        .read_entry(0)
        .unwrap()
        .extract_to_path(&target, &ExtractOptions::new().overwrite(false), NoProgress)
        .unwrap_err();
    assert!(matches!(err, ZipError::OverwriteConflict { .. }));
    assert_eq!(fs::read(&target).unwrap(), b"old");

    archive
        .read_entry(0)
        .unwrap()
        .extract_to_path(&target, &ExtractOptions::new(), NoProgress)
        .unwrap();
    assert_eq!(fs::read(&target).unwrap(), b"new");
}

#[test]
fn test_directory_entry_extracts_empty() {
    let tmp = test_temp_dir();
    let path = make_zip(tmp.path(), "t.zip", &[("folder/", b"")]);
    let mut archive = Archive::open(&path, OpenMode::NONE).unwrap();
    let mut entry = archive.read_entry(0).unwrap();
    assert!(entry.is_directory);
    assert!(entry.extract_to_vec(None).unwrap().is_empty());
}

/// 单个不压缩条目的归档
fn stored_zip(dir: &Path, body: &[u8]) -> PathBuf {
    let path = dir.join("stored.zip");
    let mut archive = Archive::open(&path, OpenMode::CREATE).unwrap();
    let index = archive.add_buffer("data.bin", body.to_vec(), false).unwrap();
    archive
        .set_entry_compression(index, CompressionMethod::Store, CompressionLevel::default())
        .unwrap();
    archive.close().unwrap();
    path
}

#[test]
fn test_corrupted_payload_is_detected() {
    let tmp = test_temp_dir();
    let body = b"integrity matters, every byte of it".repeat(10);
    let path = stored_zip(tmp.path(), &body);

    let mut bytes = fs::read(&path).unwrap();
    let at = bytes
        .windows(body.len())
        .position(|w| w == body.as_slice())
        .unwrap();
    bytes[at + 100] ^= 0x20;
    fs::write(&path, &bytes).unwrap();

    let mut archive = Archive::open(&path, OpenMode::NONE).unwrap();
    let err = archive.read_entry(0).unwrap().extract_to_vec(None).unwrap_err();
    assert_eq!(err.code(), ZipErrorCode::IntegrityError);

    // 校验失败时删除写了一半的文件
    let target = tmp.path().join("data.bin");
    let err = archive
        .read_entry(0)
        .unwrap()
        .extract_to_path(&target, &ExtractOptions::new(), NoProgress)
        .unwrap_err();
    assert_eq!(err.code(), ZipErrorCode::IntegrityError);
    assert!(!target.exists());
}

#[test]
fn test_short_stored_data_is_truncated() {
    let tmp = test_temp_dir();
    let body = vec![b'z'; 1000];
    let path = stored_zip(tmp.path(), &body);

    // 缩小中央目录记录中的压缩大小
    let mut bytes = fs::read(&path).unwrap();
    let eocd = bytes.len() - 22;
    let cdir = u32::from_le_bytes(bytes[eocd + 16..eocd + 20].try_into().unwrap()) as usize;
    bytes[cdir + 20..cdir + 24].copy_from_slice(&600u32.to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    let mut archive = Archive::open(&path, OpenMode::NONE).unwrap();
    let err = archive.read_entry(0).unwrap().extract_to_vec(None).unwrap_err();
    assert!(matches!(
        err,
        ZipError::Truncated {
            expected: 1000,
            actual: 600,
            ..
        }
    ));

    let target = tmp.path().join("data.bin");
    let err = archive
        .read_entry(0)
        .unwrap()
        .extract_to_path(&target, &ExtractOptions::new(), NoProgress)
        .unwrap_err();
    assert_eq!(err.code(), ZipErrorCode::Truncated);
    assert!(!target.exists());
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use ziprw::{ExternalAttributes, FileType};

    #[test]
    fn test_restores_mode_and_mtime() {
        let tmp = test_temp_dir();
        let path = tmp.path().join("t.zip");
        let when = UNIX_EPOCH + Duration::from_secs(1_234_567_890);

        let mut archive = Archive::open(&path, OpenMode::CREATE).unwrap();
        let index = archive.add_buffer("bin/tool", b"#!/bin/sh\n".to_vec(), false).unwrap();
        archive
            .set_entry_attributes(index, ExternalAttributes::unix(FileType::S_IFREG | 0o750))
            .unwrap();
        archive.set_entry_modified(index, when).unwrap();
        archive.close().unwrap();

        let out = tmp.path().join("out");
        let mut archive = Archive::open(&path, OpenMode::NONE).unwrap();
        archive
            .extract_all(&out, &ExtractOptions::new(), NoProgress)
            .unwrap();

        let meta = fs::metadata(out.join("bin/tool")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o7777, 0o750);
        assert_eq!(meta.modified().unwrap(), when);
    }

    #[test]
    fn test_symlink_entry() {
        let tmp = test_temp_dir();
        let path = tmp.path().join("t.zip");

        let mut archive = Archive::open(&path, OpenMode::CREATE).unwrap();
        archive.add_buffer("target.txt", b"pointed at".to_vec(), false).unwrap();
        let link = archive.add_buffer("link.txt", b"target.txt".to_vec(), false).unwrap();
        archive
            .set_entry_attributes(link, ExternalAttributes::unix(FileType::S_IFLNK | 0o777))
            .unwrap();
        archive.close().unwrap();

        let out = tmp.path().join("out");
        let mut archive = Archive::open(&path, OpenMode::NONE).unwrap();
        assert!(archive.stat(link).map(ziprw::EntryInfo::from).unwrap().is_symlink);
        archive
            .extract_all(&out, &ExtractOptions::new(), NoProgress)
            .unwrap();

        let link_path = out.join("link.txt");
        assert!(fs::symlink_metadata(&link_path).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link_path).unwrap(), std::path::Path::new("target.txt"));
        assert_eq!(fs::read(&link_path).unwrap(), b"pointed at");
    }
}
