//! store::document
//!
//! [`DocFile`] is one reference to a shared document. References to the
//! same path share content; each carries its own change throttle.
//!
//! # Lifecycle
//!
//! ```text
//! open ──► content()/update()/commit() ──► release() ──► inert
//!                                    └──► discard_all() ──► inert
//! ```
//!
//! Dropping a live reference releases it. Errors during that implicit
//! release are logged, not raised; call [`DocFile::release`] to see them.
//! A reference dropped on a thread other than the owner cannot release, so
//! its registry entry keeps that count until the document is discarded or
//! the store shuts down.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::format::{Codec, Format, SerdeCodec};
use crate::core::paths::NormalizedPath;

use super::errors::StoreError;
use super::handle::{CommitOutcome, ContentGuard, Handle};
use super::registry::DocumentStore;
use super::throttle::ChangeThrottle;

/// A reference to an open document.
pub struct DocFile<T: Send + 'static> {
    store: DocumentStore,
    key: NormalizedPath,
    handle: Option<Arc<Handle<T>>>,
    throttle: ChangeThrottle,
}

impl<T: Send + 'static> fmt::Debug for DocFile<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocFile")
            .field("path", &self.key.as_path())
            .field("released", &self.is_released())
            .field("throttle", &self.throttle)
            .finish()
    }
}

impl<T: Send + 'static> DocFile<T> {
    pub(crate) fn new(
        store: DocumentStore,
        key: NormalizedPath,
        handle: Arc<Handle<T>>,
        max_uncommitted_changes: u64,
    ) -> Self {
        Self {
            store,
            key,
            handle: Some(handle),
            throttle: ChangeThrottle::new(max_uncommitted_changes),
        }
    }

    /// Normalized path of the document.
    pub fn path(&self) -> &Path {
        self.key.as_path()
    }

    fn handle(&self) -> Result<&Arc<Handle<T>>, StoreError> {
        self.handle
            .as_ref()
            .ok_or_else(|| StoreError::AccessAfterRelease(self.key.as_path().to_path_buf()))
    }

    /// Whether this reference, or the shared document behind it, is released.
    pub fn is_released(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_released())
    }

    // =========================================================================
    // Content
    // =========================================================================

    /// Borrow the shared content.
    ///
    /// Mutations through the guard are not counted; pair them with
    /// [`report_change`](Self::report_change) or use [`update`](Self::update).
    ///
    /// # Errors
    ///
    /// - [`StoreError::AccessAfterRelease`] once released
    /// - [`StoreError::ThreadAffinity`] from a non-owner thread
    /// - [`StoreError::ContentBusy`] while another guard for the same
    ///   document is alive
    pub fn content(&self) -> Result<ContentGuard<'_, T>, StoreError> {
        self.handle()?.content()
    }

    /// Run a closure against a shared borrow of the content.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, StoreError> {
        let guard = self.content()?;
        Ok(f(&*guard))
    }

    /// Mutate the content, count one change, and commit if the throttle
    /// is due.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        let result = {
            let mut guard = self.content()?;
            f(&mut *guard)
        };
        self.report_change_and_maybe_commit()?;
        Ok(result)
    }

    /// Replace the content wholesale. Counts as one change.
    pub fn set_content(&mut self, value: T) -> Result<T, StoreError> {
        let previous = self.handle()?.replace_content(value)?;
        self.report_change_and_maybe_commit()?;
        Ok(previous)
    }

    // =========================================================================
    // Throttle
    // =========================================================================

    /// Count one change without committing.
    pub fn report_change(&mut self) -> Result<(), StoreError> {
        self.handle()?.check_access()?;
        self.throttle.record();
        Ok(())
    }

    /// Count one change and commit if the threshold is reached.
    ///
    /// Returns whether a commit ran.
    pub fn report_change_and_maybe_commit(&mut self) -> Result<bool, StoreError> {
        self.report_change()?;
        self.maybe_commit()
    }

    /// Commit if the threshold is reached, without counting a change.
    pub fn maybe_commit(&mut self) -> Result<bool, StoreError> {
        self.handle()?.check_access()?;
        if !self.throttle.is_due() {
            return Ok(false);
        }
        self.commit()?;
        Ok(true)
    }

    /// Changes counted since this reference last committed.
    pub fn change_count(&self) -> u64 {
        self.throttle.count()
    }

    pub fn max_uncommitted_changes(&self) -> u64 {
        self.throttle.threshold()
    }

    /// Values below 1 are treated as 1.
    pub fn set_max_uncommitted_changes(&mut self, threshold: u64) {
        self.throttle.set_threshold(threshold.max(1));
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Serialize and atomically write the content.
    ///
    /// Resets this reference's change count before writing. Nothing is
    /// written when the bytes match the last commit.
    pub fn commit(&mut self) -> Result<CommitOutcome, StoreError> {
        let handle = Arc::clone(self.handle()?);
        self.throttle.reset();
        handle.commit()
    }

    /// Switch the shared document to another codec and rewrite it.
    ///
    /// Always writes, even when the new encoding is byte-identical.
    pub fn migrate_to(&mut self, codec: Arc<dyn Codec<T>>) -> Result<CommitOutcome, StoreError> {
        let handle = Arc::clone(self.handle()?);
        self.throttle.reset();
        handle.migrate(codec)
    }

    /// Drop this reference. The last reference commits and closes the
    /// document.
    ///
    /// A failed final commit leaves this reference live so the caller can
    /// retry or [`discard_all`](Self::discard_all).
    pub fn release(&mut self) -> Result<(), StoreError> {
        let handle = Arc::clone(self.handle()?);
        match self.store.release(&self.key, &handle) {
            Ok(()) => {
                self.handle = None;
                Ok(())
            }
            Err(err @ StoreError::AccessAfterRelease(_)) => {
                self.handle = None;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Close the shared document immediately without writing.
    ///
    /// Every other reference to it becomes inert.
    pub fn discard_all(&mut self) -> Result<(), StoreError> {
        let handle = Arc::clone(self.handle()?);
        let result = self.store.discard(&self.key, &handle);
        self.handle = None;
        result
    }
}

impl<T> DocFile<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Rewrite the document in another serde format.
    ///
    /// [`Format::Automatic`] picks the format from the path's extension.
    pub fn migrate_to_format(&mut self, format: Format) -> Result<CommitOutcome, StoreError> {
        let format = self.store.resolve_format(self.path(), format)?;
        self.migrate_to(Arc::new(SerdeCodec::new(format)?))
    }
}

impl<T: Send + 'static> Drop for DocFile<T> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.is_released() {
            return;
        }
        if let Err(err) = self.store.release(&self.key, &handle) {
            tracing::warn!(
                path = %self.key,
                error = %err,
                "failed to release document; entry kept until discard or shutdown"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    type Counters = BTreeMap<String, u64>;

    fn setup() -> (TempDir, DocumentStore) {
        let temp = TempDir::new().expect("create temp dir");
        let store = DocumentStore::in_dir(temp.path()).expect("store");
        (temp, store)
    }

    fn bump(doc: &mut DocFile<Counters>) {
        doc.update(|c| *c.entry("n".into()).or_default() += 1)
            .expect("update");
    }

    fn on_disk(temp: &TempDir, name: &str) -> Counters {
        let text = fs::read_to_string(temp.path().join(name)).expect("read");
        serde_json::from_str(&text).expect("parse")
    }

    mod throttle {
        use super::*;

        #[test]
        fn commits_at_threshold() {
            let (temp, store) = setup();
            let mut doc = store.open::<Counters>("c.json").expect("open");
            doc.set_max_uncommitted_changes(3);

            bump(&mut doc);
            bump(&mut doc);
            assert_eq!(doc.change_count(), 2);
            assert!(on_disk(&temp, "c.json").is_empty());

            bump(&mut doc);
            assert_eq!(doc.change_count(), 0);
            assert_eq!(on_disk(&temp, "c.json").get("n"), Some(&3));
        }

        #[test]
        fn report_change_alone_never_commits() {
            let (temp, store) = setup();
            let mut doc = store.open::<Counters>("c.json").expect("open");
            doc.set_max_uncommitted_changes(1);

            doc.content().expect("content").insert("x".into(), 1);
            doc.report_change().expect("report");
            assert_eq!(doc.change_count(), 1);
            assert!(on_disk(&temp, "c.json").is_empty());

            assert!(doc.maybe_commit().expect("maybe commit"));
            assert_eq!(on_disk(&temp, "c.json").get("x"), Some(&1));
        }

        #[test]
        fn counts_are_per_reference() {
            let (_temp, store) = setup();
            let mut a = store.open::<Counters>("c.json").expect("open");
            let mut b = store.open::<Counters>("c.json").expect("open");

            bump(&mut a);
            bump(&mut a);
            bump(&mut b);

            assert_eq!(a.change_count(), 2);
            assert_eq!(b.change_count(), 1);
            assert_eq!(a.read(|c| c["n"]).expect("read"), 3);
        }

        #[test]
        fn zero_threshold_is_clamped() {
            let (_temp, store) = setup();
            let mut doc = store.open::<Counters>("c.json").expect("open");
            doc.set_max_uncommitted_changes(0);
            assert_eq!(doc.max_uncommitted_changes(), 1);
        }
    }

    mod commit {
        use super::*;

        #[test]
        fn explicit_commit_resets_count() {
            let (temp, store) = setup();
            let mut doc = store.open::<Counters>("c.json").expect("open");

            bump(&mut doc);
            assert_eq!(doc.commit().expect("commit"), CommitOutcome::Written);
            assert_eq!(doc.change_count(), 0);
            assert_eq!(on_disk(&temp, "c.json").get("n"), Some(&1));

            assert_eq!(doc.commit().expect("commit"), CommitOutcome::Unchanged);
        }

        #[test]
        fn set_content_returns_previous() {
            let (_temp, store) = setup();
            let mut doc = store.open::<Counters>("c.json").expect("open");
            bump(&mut doc);

            let previous = doc.set_content(Counters::new()).expect("set");
            assert_eq!(previous.get("n"), Some(&1));
            assert_eq!(doc.change_count(), 2);
        }

        #[test]
        fn migrate_to_toml() {
            let (temp, store) = setup();
            let mut doc = store.open::<Counters>("c.json").expect("open");
            bump(&mut doc);

            let outcome = doc.migrate_to_format(Format::Toml).expect("migrate");
            assert!(outcome.was_written());

            let text = fs::read_to_string(temp.path().join("c.json")).expect("read");
            assert_eq!(text.trim(), "n = 1");
        }
    }

    mod release {
        use super::*;

        #[test]
        fn released_reference_is_inert() {
            let (_temp, store) = setup();
            let mut doc = store.open::<Counters>("c.json").expect("open");

            doc.release().expect("release");

            assert!(doc.is_released());
            assert!(matches!(doc.content(), Err(StoreError::AccessAfterRelease(_))));
            assert!(matches!(doc.commit(), Err(StoreError::AccessAfterRelease(_))));
            assert!(matches!(doc.release(), Err(StoreError::AccessAfterRelease(_))));
            assert!(matches!(doc.discard_all(), Err(StoreError::AccessAfterRelease(_))));
            assert!(matches!(doc.report_change(), Err(StoreError::AccessAfterRelease(_))));
            assert!(matches!(
                doc.report_change_and_maybe_commit(),
                Err(StoreError::AccessAfterRelease(_))
            ));
            assert!(matches!(doc.maybe_commit(), Err(StoreError::AccessAfterRelease(_))));
            assert_eq!(doc.change_count(), 0);
        }

        #[test]
        fn reference_of_discarded_document_rejects_reports() {
            let (_temp, store) = setup();
            let mut a = store.open::<Counters>("c.json").expect("open");
            let mut b = store.open::<Counters>("c.json").expect("open");

            a.discard_all().expect("discard");

            assert!(matches!(b.report_change(), Err(StoreError::AccessAfterRelease(_))));
            assert!(matches!(b.maybe_commit(), Err(StoreError::AccessAfterRelease(_))));
        }

        #[test]
        fn drop_on_other_thread_keeps_entry_until_discard() {
            let (_temp, store) = setup();
            let doc = store.open::<Counters>("c.json").expect("open");

            std::thread::spawn(move || drop(doc)).join().expect("join");
            assert_eq!(store.refcount("c.json").expect("refcount"), Some(1));

            let mut owner = store.open::<Counters>("c.json").expect("reopen");
            assert_eq!(store.refcount("c.json").expect("refcount"), Some(2));
            owner.discard_all().expect("discard");
            assert!(store.open_paths().is_empty());
        }

        #[test]
        fn drop_releases() {
            let (temp, store) = setup();
            {
                let doc = store.open::<Counters>("c.json").expect("open");
                doc.content().expect("content").insert("d".into(), 5);
            }

            assert!(store.open_paths().is_empty());
            assert_eq!(on_disk(&temp, "c.json").get("d"), Some(&5));
        }

        #[test]
        fn release_from_other_thread_is_rejected() {
            let (_temp, store) = setup();
            let doc = store.open::<Counters>("c.json").expect("open");

            let result = std::thread::spawn(move || {
                let mut doc = doc;
                let result = doc.release();
                // hand the live reference back to its owner
                (result, doc)
            })
            .join()
            .expect("join");

            let (result, mut doc) = result;
            assert!(matches!(result, Err(StoreError::ThreadAffinity { .. })));
            assert_eq!(store.refcount("c.json").expect("refcount"), Some(1));
            doc.release().expect("owner release");
        }
    }
}
