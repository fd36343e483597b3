//! Pending modifications, keyed by entry index.

use crate::source::{SourceStat, ZipSource};
use crate::types::{CompressionLevel, CompressionMethod, EncryptionMethod, ExternalAttributes};
use std::collections::BTreeMap;
use std::time::SystemTime;
use zeroize::Zeroizing;

/// New content for an entry together with the size and mtime reported by the
/// source when it was handed over.
pub(crate) struct PendingContent {
    pub source: ZipSource,
    pub stat: SourceStat,
}

pub(crate) struct EncryptionChange {
    pub method: EncryptionMethod,
    /// Falls back to the archive's default password when `None`
    pub password: Option<Zeroizing<String>>,
}

/// Everything recorded against one index.
#[derive(Default)]
pub(crate) struct EntryChange {
    pub added: bool,
    pub deleted: bool,
    pub content: Option<PendingContent>,
    pub name: Option<String>,
    pub attributes: Option<ExternalAttributes>,
    pub modified: Option<SystemTime>,
    pub compression: Option<(CompressionMethod, CompressionLevel)>,
    pub encryption: Option<EncryptionChange>,
}

impl EntryChange {
    /// The stored bytes of the entry can be copied as they are.
    pub fn keeps_data(&self) -> bool {
        self.content.is_none() && self.compression.is_none() && self.encryption.is_none()
    }

    /// Drop pending content, rolling its source back.
    pub fn drop_content(&mut self) {
        if let Some(mut old) = self.content.take() {
            old.source.rollback();
            log::debug!("released replaced source {:?}", old.source);
        }
    }

    pub fn set_content(&mut self, content: PendingContent) {
        self.drop_content();
        self.content = Some(content);
    }
}

/// The archive's change log.
#[derive(Default)]
pub(crate) struct ChangeLog {
    entries: BTreeMap<u64, EntryChange>,
    /// `Some(None)` deletes the comment
    pub comment: Option<Option<String>>,
}

impl ChangeLog {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.comment.is_none()
    }

    pub fn len(&self) -> usize {
        self.entries.len() + usize::from(self.comment.is_some())
    }

    pub fn get(&self, index: u64) -> Option<&EntryChange> {
        self.entries.get(&index)
    }

    pub fn get_mut(&mut self, index: u64) -> Option<&mut EntryChange> {
        self.entries.get_mut(&index)
    }

    /// Change record for `index`, created empty if absent.
    pub fn entry(&mut self, index: u64) -> &mut EntryChange {
        self.entries.entry(index).or_default()
    }

    pub fn insert(&mut self, index: u64, change: EntryChange) {
        if let Some(mut old) = self.entries.insert(index, change) {
            old.drop_content();
        }
    }

    /// Forget every change for `index`.
    pub fn remove(&mut self, index: u64) -> bool {
        match self.entries.remove(&index) {
            Some(mut change) => {
                change.drop_content();
                true
            }
            None => false,
        }
    }

    pub fn added_indices(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries
            .iter()
            .filter(|(_, c)| c.added)
            .map(|(&i, _)| i)
    }

    /// Roll back every pending source and clear the log.
    pub fn rollback_all(&mut self) {
        for change in self.entries.values_mut() {
            change.drop_content();
        }
        self.entries.clear();
        self.comment = None;
    }

    /// Tell every consumed source that its content was written, then clear.
    pub fn commit_all(&mut self) {
        for change in self.entries.values_mut() {
            if let Some(content) = change.content.as_mut() {
                content.source.commit();
            }
        }
        self.entries.clear();
        self.comment = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceCallback;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Tally {
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
    }

    struct Tracked(Arc<Tally>);

    impl SourceCallback for Tracked {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn commit(&mut self) {
            self.0.commits.fetch_add(1, Ordering::SeqCst);
        }

        fn rollback(&mut self) {
            self.0.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn content(tally: &Arc<Tally>) -> PendingContent {
        PendingContent {
            source: ZipSource::callback(Tracked(Arc::clone(tally))),
            stat: SourceStat::default(),
        }
    }

    #[test]
    fn test_replacing_content_rolls_back_previous() {
        let tally = Arc::new(Tally::default());
        let mut log = ChangeLog::default();
        log.entry(0).set_content(content(&tally));
        log.entry(0).set_content(content(&tally));
        assert_eq!(tally.rollbacks.load(Ordering::SeqCst), 1);

        log.commit_all();
        assert_eq!(tally.commits.load(Ordering::SeqCst), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn test_remove_and_rollback_all() {
        let tally = Arc::new(Tally::default());
        let mut log = ChangeLog::default();
        log.insert(
            3,
            EntryChange {
                added: true,
                content: Some(content(&tally)),
                ..Default::default()
            },
        );
        log.entry(1).deleted = true;
        log.comment = Some(None);
        assert_eq!(log.len(), 3);
        assert_eq!(log.added_indices().collect::<Vec<_>>(), vec![3]);

        assert!(log.remove(3));
        assert!(!log.remove(3));
        assert_eq!(tally.rollbacks.load(Ordering::SeqCst), 1);

        log.rollback_all();
        assert!(log.is_empty());
    }

    #[test]
    fn test_keeps_data() {
        let mut change = EntryChange {
            name: Some("renamed".into()),
            ..Default::default()
        };
        assert!(change.keeps_data());
        change.compression = Some((CompressionMethod::Store, CompressionLevel::default()));
        assert!(!change.keeps_data());
    }
}
