//! Dump archive hand-out.
//!
//! A full-history export ships as many archive files. Producer threads
//! pull the next unclaimed archive here; when the last one is handed out
//! the manager flips into shutdown so idle producers can exit instead of
//! polling forever.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use revarc_types::ArchiveDescription;

/// Shared hand-out list of pending archives.
#[derive(Debug)]
pub struct ArchiveManager {
    pending: Mutex<VecDeque<ArchiveDescription>>,
    shutdown: AtomicBool,
}

impl ArchiveManager {
    pub fn new(archives: Vec<ArchiveDescription>) -> Self {
        let shutdown = archives.is_empty();
        Self {
            pending: Mutex::new(archives.into()),
            shutdown: AtomicBool::new(shutdown),
        }
    }

    /// Claims the next archive. Returns `None` once every archive has
    /// been handed out; handing out the last one triggers shutdown.
    pub fn next(&self) -> Option<ArchiveDescription> {
        let mut pending = self.pending.lock().expect("archive list poisoned");
        let archive = pending.pop_front()?;
        if pending.is_empty() {
            drop(pending);
            info!(archive = %archive.path.display(), "last archive handed out");
            self.shutdown.store(true, Ordering::Release);
        }
        Some(archive)
    }

    /// Number of archives not yet claimed.
    pub fn remaining(&self) -> usize {
        self.pending.lock().expect("archive list poisoned").len()
    }

    /// True once the final archive has been claimed.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use revarc_types::ArchiveKind;

    use super::*;

    fn archive(name: &str) -> ArchiveDescription {
        ArchiveDescription {
            kind: ArchiveKind::Xml,
            path: PathBuf::from(name),
            start_offset: 0,
        }
    }

    #[test]
    fn hands_out_in_order_then_shuts_down() {
        let manager = ArchiveManager::new(vec![archive("a.xml"), archive("b.xml")]);
        assert_eq!(manager.remaining(), 2);
        assert!(!manager.is_shutdown());

        assert_eq!(manager.next().unwrap().path, PathBuf::from("a.xml"));
        assert!(!manager.is_shutdown());

        assert_eq!(manager.next().unwrap().path, PathBuf::from("b.xml"));
        assert!(manager.is_shutdown());
        assert!(manager.next().is_none());
    }

    #[test]
    fn empty_list_starts_shut_down() {
        let manager = ArchiveManager::new(Vec::new());
        assert!(manager.is_shutdown());
        assert!(manager.next().is_none());
    }
}
