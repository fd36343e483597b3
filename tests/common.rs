// 公共测试辅助函数

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use ziprw::{Archive, OpenMode};

/// 创建临时测试目录
pub fn test_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// 用给定条目创建一个 ZIP 文件
pub fn make_zip(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(name);
    let mut archive = Archive::open(&path, OpenMode::CREATE).expect("Failed to create archive");
    for (entry, data) in entries {
        if entry.ends_with('/') {
            archive.add_directory(entry).expect("Failed to add directory");
        } else {
            archive
                .add_buffer(entry, data.to_vec(), false)
                .expect("Failed to add entry");
        }
    }
    archive.close().expect("Failed to commit archive");
    path
}

/// 条目名列表，每行一个
pub fn listing(archive: &Archive) -> String {
    archive
        .get_entries()
        .expect("Failed to list entries")
        .iter()
        .map(|e| e.name.clone())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 按名称读取条目内容
pub fn read_named(archive: &mut Archive, name: &str) -> Vec<u8> {
    archive
        .read_entry_by_name(name, true)
        .expect("entry not found")
        .extract_to_vec(None)
        .expect("Failed to read entry")
}

/// 目录中的文件名（排序后）
pub fn dir_listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("Failed to read dir")
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
