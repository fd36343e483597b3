// 自定义数据源在提交、丢弃与替换时的通知测试

mod common;

use std::io::{self, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use common::{listing, make_zip, read_named, test_temp_dir};
use ziprw::{Archive, OpenMode, SourceCallback, SourceStat, ZipErrorCode, ZipSource};

#[derive(Default)]
struct Events {
    opens: AtomicUsize,
    closes: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// 内存数据源，记录生命周期回调
struct Recorder {
    data: Vec<u8>,
    pos: usize,
    events: Arc<Events>,
}

impl Recorder {
    fn source(data: &[u8], events: &Arc<Events>) -> ZipSource {
        ZipSource::callback(Recorder {
            data: data.to_vec(),
            pos: 0,
            events: Arc::clone(events),
        })
    }
}

impl SourceCallback for Recorder {
    fn open(&mut self) -> io::Result<()> {
        self.pos = 0;
        self.events.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let rest = &self.data[self.pos..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::Current(n) => self.pos as i64 + n,
            SeekFrom::End(n) => self.data.len() as i64 + n,
        };
        if target < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "negative position"));
        }
        self.pos = (target as usize).min(self.data.len());
        Ok(self.pos as u64)
    }

    fn stat(&mut self) -> io::Result<SourceStat> {
        Ok(SourceStat {
            size: Some(self.data.len() as u64),
            mtime: None,
        })
    }

    fn close(&mut self) -> io::Result<()> {
        self.events.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn commit(&mut self) {
        self.events.commits.fetch_add(1, Ordering::SeqCst);
    }

    fn rollback(&mut self) {
        self.events.rollbacks.fetch_add(1, Ordering::SeqCst);
    }
}

fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

#[test]
fn test_commit_notifies_source() {
    let tmp = test_temp_dir();
    let path = tmp.path().join("t.zip");
    let events = Arc::new(Events::default());

    let mut archive = Archive::open(&path, OpenMode::CREATE).unwrap();
    archive
        .add_source("log.txt", Recorder::source(b"line one\nline two\n", &events), false)
        .unwrap();
    // 提交前读取一次，提交时再读一次
    assert_eq!(read_named(&mut archive, "log.txt"), b"line one\nline two\n");
    archive.close().unwrap();

    assert_eq!(count(&events.opens), 2);
    assert_eq!(count(&events.closes), 2);
    assert_eq!(count(&events.commits), 1);
    assert_eq!(count(&events.rollbacks), 0);

    let mut archive = Archive::open(&path, OpenMode::NONE).unwrap();
    assert_eq!(read_named(&mut archive, "log.txt"), b"line one\nline two\n");
}

#[test]
fn test_discard_and_drop_roll_back() {
    let tmp = test_temp_dir();
    let events = Arc::new(Events::default());

    let mut archive = Archive::open(tmp.path().join("t.zip"), OpenMode::CREATE).unwrap();
    archive.add_source("a", Recorder::source(b"a", &events), false).unwrap();
    archive.discard().unwrap();
    assert_eq!(count(&events.rollbacks), 1);

    {
        let mut archive = Archive::open(tmp.path().join("t.zip"), OpenMode::CREATE).unwrap();
        archive.add_source("b", Recorder::source(b"b", &events), false).unwrap();
    }
    assert_eq!(count(&events.rollbacks), 2);
    assert_eq!(count(&events.commits), 0);
    assert!(!tmp.path().join("t.zip").exists());
}

#[test]
fn test_replaced_and_unchanged_sources_roll_back() {
    let tmp = test_temp_dir();
    let first = Arc::new(Events::default());
    let second = Arc::new(Events::default());
    let third = Arc::new(Events::default());

    let mut archive = Archive::open(tmp.path().join("t.zip"), OpenMode::CREATE).unwrap();
    let index = archive
        .add_source("data", Recorder::source(b"v1", &first), false)
        .unwrap();
    archive
        .replace_entry(index, Recorder::source(b"v2", &second))
        .unwrap();
    assert_eq!(count(&first.rollbacks), 1);

    let other = archive
        .add_source("other", Recorder::source(b"x", &third), false)
        .unwrap();
    archive.unchange(other).unwrap();
    assert_eq!(count(&third.rollbacks), 1);
    assert_eq!(listing(&archive), "data");

    archive.close().unwrap();
    assert_eq!(count(&second.commits), 1);
    assert_eq!(count(&second.rollbacks), 0);
    assert_eq!(count(&first.commits), 0);
}

#[test]
fn test_stream_and_range_sources() {
    let tmp = test_temp_dir();
    let disk = tmp.path().join("blob.bin");
    std::fs::write(&disk, b"HEADERpayloadTRAILER").unwrap();
    let path = tmp.path().join("t.zip");
    let when = UNIX_EPOCH + Duration::from_secs(1_500_000_000);

    let mut archive = Archive::open(&path, OpenMode::CREATE).unwrap();
    archive
        .add_source("range.bin", ZipSource::file_range(&disk, 6, Some(7)).unwrap(), false)
        .unwrap();
    let stream = ZipSource::stream(io::Cursor::new(b"streamed".to_vec()), 0, None).with_mtime(when);
    let index = archive.add_source("stream.bin", stream, false).unwrap();
    assert_eq!(archive.stat(index).unwrap().uncompressed_size, 8);
    assert_eq!(archive.stat(index).unwrap().modified, when);
    archive
        .add_source("shared.bin", ZipSource::shared_buffer(Arc::from(&b"shared"[..])), false)
        .unwrap();
    archive.close().unwrap();

    let mut archive = Archive::open(&path, OpenMode::NONE).unwrap();
    assert_eq!(read_named(&mut archive, "range.bin"), b"payload");
    assert_eq!(read_named(&mut archive, "stream.bin"), b"streamed");
    assert_eq!(read_named(&mut archive, "shared.bin"), b"shared");
    assert_eq!(archive.stat(1).unwrap().modified, when);
}

/// 只能顺序读取一次的数据源，可声明与实际不符的大小
struct Forward {
    data: &'static [u8],
    pos: usize,
    announced: u64,
}

impl SourceCallback for Forward {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let rest = &self.data[self.pos..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }

    fn stat(&mut self) -> io::Result<SourceStat> {
        Ok(SourceStat {
            size: Some(self.announced),
            mtime: None,
        })
    }
}

#[test]
fn test_seekable_callback_extracted_before_commit() {
    let tmp = test_temp_dir();
    let path = tmp.path().join("t.zip");
    let events = Arc::new(Events::default());

    let mut archive = Archive::open(&path, OpenMode::CREATE).unwrap();
    let index = archive
        .add_source("greeting.txt", Recorder::source(b"hello world", &events), false)
        .unwrap();
    for _ in 0..2 {
        let body = archive.read_entry(index).unwrap().extract_to_vec(None).unwrap();
        assert_eq!(body, b"hello world");
    }
    archive.close().unwrap();

    let mut archive = Archive::open(&path, OpenMode::CHECK_CONSISTENCY).unwrap();
    assert_eq!(archive.stat(0).unwrap().uncompressed_size, 11);
    assert_eq!(read_named(&mut archive, "greeting.txt"), b"hello world");
}

#[test]
fn test_forward_only_callback_cannot_be_read_twice() {
    let tmp = test_temp_dir();
    let path = make_zip(tmp.path(), "t.zip", &[("keep.txt", b"keep")]);
    let before = std::fs::read(&path).unwrap();

    let mut archive = Archive::open(&path, OpenMode::NONE).unwrap();
    let source = ZipSource::callback(Forward {
        data: b"hello world",
        pos: 0,
        announced: 11,
    });
    let index = archive.add_source("once.txt", source, false).unwrap();
    assert_eq!(
        archive.read_entry(index).unwrap().extract_to_vec(None).unwrap(),
        b"hello world"
    );

    let err = archive.close().unwrap_err();
    assert_eq!(err.code(), ZipErrorCode::Unsupported);
    assert_eq!(std::fs::read(&path).unwrap(), before);
    archive.discard().unwrap();
}

#[test]
fn test_short_callback_fails_commit() {
    let tmp = test_temp_dir();
    let path = make_zip(tmp.path(), "t.zip", &[("keep.txt", b"keep")]);
    let before = std::fs::read(&path).unwrap();

    let mut archive = Archive::open(&path, OpenMode::NONE).unwrap();
    let source = ZipSource::callback(Forward {
        data: b"short",
        pos: 0,
        announced: 64,
    });
    archive.add_source("short.txt", source, false).unwrap();

    let err = archive.close().unwrap_err();
    assert_eq!(err.code(), ZipErrorCode::Truncated);
    assert_eq!(std::fs::read(&path).unwrap(), before);
    archive.discard().unwrap();
}
