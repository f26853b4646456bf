//! Integration tests: SyncEngine -> LocalFileSystemMover + SQLite
//!
//! Every test gets a fresh temp directory (managed root + recycle root) and
//! an in-memory database. `FlakyStore` and `FlakyMover` inject commit and
//! rollback failures.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fsmgr_audit::{CODE_ROLLBACK_FAILED, CODE_ROLLED_BACK};
use fsmgr_cache::{DatabasePool, SqliteMetadataStore};
use fsmgr_conflict::NameConflictResolver;
use fsmgr_core::domain::{
    Actor, AuditEntry, AuditId, AuditResult, CanonicalPath, Item, ItemId, PathResolver,
};
use fsmgr_core::ports::{
    CommitOutcome, EntryState, IFileSystemMover, IMetadataStore, MoveReceipt, MoverError,
    Mutation, WriteReceipt,
};
use fsmgr_sync::{FileUpload, LocalFileSystemMover, SyncEngine, SyncError};
use tempfile::TempDir;

// ============================================================================
// Failure-injecting ports
// ============================================================================

struct FlakyStore {
    inner: SqliteMetadataStore,
    fail_commits: AtomicBool,
}

#[async_trait::async_trait]
impl IMetadataStore for FlakyStore {
    async fn get(&self, path: &CanonicalPath) -> anyhow::Result<Option<Item>> {
        self.inner.get(path).await
    }

    async fn get_by_id(&self, id: ItemId) -> anyhow::Result<Option<Item>> {
        self.inner.get_by_id(id).await
    }

    async fn find_by_prefix(&self, path: &CanonicalPath) -> anyhow::Result<Vec<Item>> {
        self.inner.find_by_prefix(path).await
    }

    async fn find_deleted_under(&self, deleted_path: &Path) -> anyhow::Result<Vec<Item>> {
        self.inner.find_deleted_under(deleted_path).await
    }

    async fn list_deleted(&self) -> anyhow::Result<Vec<Item>> {
        self.inner.list_deleted().await
    }

    async fn commit(&self, mutations: Vec<Mutation>) -> anyhow::Result<CommitOutcome> {
        if self.fail_commits.load(Ordering::SeqCst) {
            anyhow::bail!("injected commit failure");
        }
        self.inner.commit(mutations).await
    }

    async fn save_audit(&self, entry: &AuditEntry) -> anyhow::Result<AuditId> {
        self.inner.save_audit(entry).await
    }

    async fn get_audit_trail(&self, item_id: ItemId) -> anyhow::Result<Vec<AuditEntry>> {
        self.inner.get_audit_trail(item_id).await
    }

    async fn get_audit_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<AuditEntry>> {
        self.inner.get_audit_since(since, limit).await
    }
}

struct FlakyMover {
    inner: LocalFileSystemMover,
    fail_reverts: AtomicBool,
}

impl FlakyMover {
    fn injected(path: &Path) -> MoverError {
        MoverError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "injected revert failure"),
        )
    }
}

#[async_trait::async_trait]
impl IFileSystemMover for FlakyMover {
    async fn stat(&self, path: &Path) -> Result<EntryState, MoverError> {
        self.inner.stat(path).await
    }

    async fn create_dir(&self, path: &Path) -> Result<(), MoverError> {
        self.inner.create_dir(path).await
    }

    async fn write_file(
        &self,
        path: &Path,
        data: &[u8],
        overwrite: bool,
    ) -> Result<WriteReceipt, MoverError> {
        self.inner.write_file(path, data, overwrite).await
    }

    async fn move_entry(
        &self,
        source: &Path,
        destination: &Path,
        overwrite: bool,
    ) -> Result<MoveReceipt, MoverError> {
        self.inner.move_entry(source, destination, overwrite).await
    }

    async fn delete(&self, path: &Path, recursive: bool) -> Result<(), MoverError> {
        self.inner.delete(path, recursive).await
    }

    async fn dir_size(&self, path: &Path) -> Result<u64, MoverError> {
        self.inner.dir_size(path).await
    }

    async fn revert_move(&self, receipt: &MoveReceipt) -> Result<(), MoverError> {
        if self.fail_reverts.load(Ordering::SeqCst) {
            return Err(Self::injected(&receipt.destination));
        }
        self.inner.revert_move(receipt).await
    }

    async fn revert_write(&self, receipt: &WriteReceipt) -> Result<(), MoverError> {
        if self.fail_reverts.load(Ordering::SeqCst) {
            return Err(Self::injected(&receipt.path));
        }
        self.inner.revert_write(receipt).await
    }

    async fn discard_displaced(&self, displaced: &Path) -> Result<(), MoverError> {
        self.inner.discard_displaced(displaced).await
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    recycle: PathBuf,
    store: Arc<FlakyStore>,
    mover: Arc<FlakyMover>,
    engine: SyncEngine,
    actor: Actor,
}

impl Fixture {
    async fn new() -> Self {
        Self::with_namer(NameConflictResolver::default()).await
    }

    async fn with_namer(namer: NameConflictResolver) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("files");
        let recycle = dir.path().join("recycle");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&recycle).unwrap();

        let pool = DatabasePool::in_memory()
            .await
            .expect("Failed to create in-memory database");
        let store = Arc::new(FlakyStore {
            inner: SqliteMetadataStore::new(pool.pool().clone()),
            fail_commits: AtomicBool::new(false),
        });
        let mover = Arc::new(FlakyMover {
            inner: LocalFileSystemMover::new(),
            fail_reverts: AtomicBool::new(false),
        });
        let engine = SyncEngine::with_namer(
            PathResolver::new(&root, &recycle),
            Arc::clone(&store) as Arc<dyn IMetadataStore>,
            Arc::clone(&mover) as Arc<dyn IFileSystemMover>,
            namer,
        );

        Self {
            _dir: dir,
            root,
            recycle,
            store,
            mover,
            engine,
            actor: Actor::new("alice").unwrap(),
        }
    }

    fn fail_commits(&self, on: bool) {
        self.store.fail_commits.store(on, Ordering::SeqCst);
    }

    fn fail_reverts(&self, on: bool) {
        self.mover.fail_reverts.store(on, Ordering::SeqCst);
    }

    async fn mkdir(&self, parent: &str, name: &str) -> Item {
        self.engine
            .create_directory(&self.actor, parent, name)
            .await
            .unwrap()
    }

    async fn put(&self, dir: &str, name: &str, data: &[u8]) -> Item {
        self.engine
            .upload(&self.actor, dir, FileUpload::new(name, data.to_vec()))
            .await
            .unwrap()
    }

    async fn record(&self, path: &str) -> Option<Item> {
        self.engine.get_item(path).await.unwrap()
    }

    async fn by_id(&self, id: ItemId) -> Item {
        self.engine.get_item_by_id(id).await.unwrap().unwrap()
    }

    fn live(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn binned(&self, rel: &str) -> PathBuf {
        self.recycle.join(rel)
    }
}

// ============================================================================
// Create / upload
// ============================================================================

#[tokio::test]
async fn test_create_directory_and_conflict_suggestion() {
    let fx = Fixture::new().await;
    let docs = fx.mkdir("", "docs").await;

    assert!(docs.is_folder());
    assert_eq!(docs.size(), 0);
    assert_eq!(docs.owner(), "alice");
    assert!(fx.live("docs").is_dir());

    let err = fx
        .engine
        .create_directory(&fx.actor, "", "docs")
        .await
        .unwrap_err();
    match err {
        SyncError::Conflict { suggested_name, .. } => {
            assert_eq!(suggested_name.as_deref(), Some("docs(1)"));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_directory_requires_parent() {
    let fx = Fixture::new().await;
    let err = fx
        .engine
        .create_directory(&fx.actor, "missing", "child")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn test_upload_conflict_suggests_numbered_name() {
    let fx = Fixture::new().await;
    fx.mkdir("", "docs").await;
    fx.put("docs", "report.pdf", b"v1").await;

    let err = fx
        .engine
        .upload(&fx.actor, "docs", FileUpload::new("report.pdf", b"v2".to_vec()))
        .await
        .unwrap_err();
    match err {
        SyncError::Conflict { suggested_name, .. } => {
            assert_eq!(suggested_name.as_deref(), Some("report(1).pdf"));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(std::fs::read(fx.live("docs/report.pdf")).unwrap(), b"v1");
}

#[tokio::test]
async fn test_suggestion_skips_taken_candidates_and_respects_cap() {
    let fx = Fixture::with_namer(NameConflictResolver::new(2)).await;
    fx.put("", "a.txt", b"1").await;
    fx.put("", "a(1).txt", b"1").await;

    let err = fx
        .engine
        .upload(&fx.actor, "", FileUpload::new("a.txt", b"x".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Conflict { suggested_name: Some(ref s), .. } if s == "a(2).txt"
    ));

    fx.put("", "a(2).txt", b"1").await;
    let err = fx
        .engine
        .upload(&fx.actor, "", FileUpload::new("a.txt", b"x".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::TooManyConflicts { max: 2, .. }));
}

#[tokio::test]
async fn test_upload_validation() {
    let fx = Fixture::new().await;

    let err = fx
        .engine
        .upload(&fx.actor, "", FileUpload::new("empty.txt", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::EmptyFile(_)));

    let err = fx
        .engine
        .upload(&fx.actor, "nowhere", FileUpload::new("a.txt", b"x".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));

    let err = fx
        .engine
        .upload(&fx.actor, "../outside", FileUpload::new("a.txt", b"x".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidPath(_)));

    let err = fx
        .engine
        .upload(&fx.actor, "", FileUpload::new("a/b.txt", b"x".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidName(_)));
}

#[tokio::test]
async fn test_upload_records_descriptive_fields_and_sizes() {
    let fx = Fixture::new().await;
    let docs = fx.mkdir("", "docs").await;
    let sub = fx.mkdir("docs", "sub").await;
    let expiry = Utc::now() + chrono::Duration::days(30);

    let item = fx
        .engine
        .upload(
            &fx.actor,
            "docs/sub",
            FileUpload::new("a.txt", b"12345".to_vec())
                .with_issued_by("registry")
                .with_expiry(expiry),
        )
        .await
        .unwrap();

    assert_eq!(item.size(), 5);
    assert_eq!(item.issued_by(), "registry");
    assert_eq!(
        item.expiry_date().map(|d| d.timestamp()),
        Some(expiry.timestamp())
    );
    assert_eq!(fx.by_id(sub.id()).await.size(), 5);
    assert_eq!(fx.by_id(docs.id()).await.size(), 5);
}

#[tokio::test]
async fn test_concurrent_uploads_accumulate_directory_size() {
    let fx = Fixture::new().await;
    let docs = fx.mkdir("", "docs").await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let engine = fx.engine.clone();
        let actor = fx.actor.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .upload(&actor, "docs", FileUpload::new(format!("f{i}.bin"), vec![0u8; 10]))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(fx.by_id(docs.id()).await.size(), 80);
}

#[tokio::test]
async fn test_upload_many_stops_at_first_conflict() {
    let fx = Fixture::new().await;
    fx.put("", "b.txt", b"old").await;

    let batch = fx
        .engine
        .upload_many(
            &fx.actor,
            "",
            vec![
                FileUpload::new("a.txt", b"a".to_vec()),
                FileUpload::new("b.txt", b"b".to_vec()),
                FileUpload::new("c.txt", b"c".to_vec()),
            ],
        )
        .await
        .unwrap();

    assert_eq!(batch.uploaded.len(), 1);
    assert_eq!(batch.uploaded[0].name(), "a.txt");
    let conflict = batch.conflict.unwrap();
    assert_eq!(conflict.index, 1);
    assert_eq!(conflict.file_name, "b.txt");
    assert_eq!(conflict.suggested_name.as_deref(), Some("b(1).txt"));
    assert!(!fx.live("c.txt").exists());
}

// ============================================================================
// Replace
// ============================================================================

#[tokio::test]
async fn test_replace_updates_record_and_ancestor_size() {
    let fx = Fixture::new().await;
    let docs = fx.mkdir("", "docs").await;
    let original = fx.put("docs", "a.txt", b"12345").await;

    let replaced = fx
        .engine
        .replace(&fx.actor, "docs", FileUpload::new("a.txt", b"12".to_vec()))
        .await
        .unwrap();

    assert_eq!(replaced.id(), original.id());
    assert_eq!(replaced.size(), 2);
    assert_eq!(std::fs::read(fx.live("docs/a.txt")).unwrap(), b"12");
    assert_eq!(fx.by_id(docs.id()).await.size(), 2);

    // displaced copy is gone after commit
    let leftovers: Vec<_> = std::fs::read_dir(fx.live("docs"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1);
}

#[tokio::test]
async fn test_replace_rollback_restores_previous_content() {
    let fx = Fixture::new().await;
    fx.put("", "a.txt", b"old").await;

    fx.fail_commits(true);
    let err = fx
        .engine
        .replace(&fx.actor, "", FileUpload::new("a.txt", b"new".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Storage(_)));

    assert_eq!(std::fs::read(fx.live("a.txt")).unwrap(), b"old");
    assert_eq!(std::fs::read_dir(&fx.root).unwrap().count(), 1);
    fx.fail_commits(false);
    assert_eq!(fx.record("a.txt").await.unwrap().size(), 3);
}

// ============================================================================
// Rename
// ============================================================================

#[tokio::test]
async fn test_rename_directory_rebases_descendants() {
    let fx = Fixture::new().await;
    let docs = fx.mkdir("", "docs").await;
    let a = fx.put("docs", "a.txt", b"a").await;

    let renamed = fx.engine.rename(&fx.actor, "docs", "archive").await.unwrap();

    assert_eq!(renamed.id(), docs.id());
    assert_eq!(renamed.canonical_path().as_str(), "archive");
    let moved = fx.record("archive/a.txt").await.unwrap();
    assert_eq!(moved.id(), a.id());
    assert!(fx.live("archive/a.txt").is_file());
    assert!(!fx.live("docs").exists());
    assert!(fx.record("docs/a.txt").await.is_none());
}

#[tokio::test]
async fn test_rename_file_keeps_extension() {
    let fx = Fixture::new().await;
    fx.put("", "report.pdf", b"pdf").await;

    let renamed = fx.engine.rename(&fx.actor, "report.pdf", "summary").await.unwrap();
    assert_eq!(renamed.name(), "summary.pdf");
    assert!(fx.live("summary.pdf").is_file());

    let renamed = fx
        .engine
        .rename(&fx.actor, "summary.pdf", "final.txt")
        .await
        .unwrap();
    assert_eq!(renamed.name(), "final.txt.pdf");
}

#[tokio::test]
async fn test_rename_to_same_name_is_a_no_op() {
    let fx = Fixture::new().await;
    let item = fx.put("", "a.txt", b"a").await;

    let same = fx.engine.rename(&fx.actor, "a.txt", "a.txt").await.unwrap();
    assert_eq!(same, item);
}

#[tokio::test]
async fn test_rename_errors() {
    let fx = Fixture::new().await;
    fx.put("", "a.txt", b"a").await;
    fx.put("", "b.txt", b"b").await;

    let err = fx.engine.rename(&fx.actor, "a.txt", "b").await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Conflict { suggested_name: Some(ref s), .. } if s == "b(1).txt"
    ));

    let err = fx.engine.rename(&fx.actor, "zzz.txt", "y").await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));

    let err = fx.engine.rename(&fx.actor, "a.txt", "x/y").await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidName(_)));
}

#[tokio::test]
async fn test_rename_without_record_is_reversed() {
    let fx = Fixture::new().await;
    std::fs::write(fx.live("stray.txt"), b"x").unwrap();

    let err = fx.engine.rename(&fx.actor, "stray.txt", "kept").await.unwrap_err();
    assert!(matches!(err, SyncError::MetadataMissing(_)));
    assert!(fx.live("stray.txt").is_file());
    assert!(!fx.live("kept.txt").exists());
}

#[tokio::test]
async fn test_rename_commit_failure_rolls_back_and_audits() {
    let fx = Fixture::new().await;
    let docs = fx.mkdir("", "docs").await;
    fx.put("docs", "a.txt", b"a").await;

    fx.fail_commits(true);
    let err = fx.engine.rename(&fx.actor, "docs", "archive").await.unwrap_err();
    fx.fail_commits(false);

    assert!(matches!(err, SyncError::Storage(_)));
    assert!(fx.live("docs/a.txt").is_file());
    assert!(!fx.live("archive").exists());
    assert!(fx.record("docs/a.txt").await.is_some());

    let trail = fx.engine.audit_trail(docs.id()).await.unwrap();
    let last = trail.last().unwrap();
    assert!(matches!(
        last.result(),
        AuditResult::Failed { code, .. } if code == CODE_ROLLED_BACK
    ));
}

#[tokio::test]
async fn test_rename_rollback_failure_is_reported() {
    let fx = Fixture::new().await;
    let docs = fx.mkdir("", "docs").await;

    fx.fail_commits(true);
    fx.fail_reverts(true);
    let err = fx.engine.rename(&fx.actor, "docs", "archive").await.unwrap_err();

    match err {
        SyncError::RollbackFailed {
            item_id,
            from_path,
            to_path,
            cause,
            rollback_error,
            ..
        } => {
            assert_eq!(item_id, Some(docs.id()));
            assert_eq!(from_path, fx.live("docs"));
            assert_eq!(to_path, fx.live("archive"));
            assert!(cause.contains("injected commit failure"));
            assert!(rollback_error.contains("injected revert failure"));
        }
        other => panic!("expected RollbackFailed, got {other:?}"),
    }

    let trail = fx.engine.audit_trail(docs.id()).await.unwrap();
    assert!(matches!(
        trail.last().unwrap().result(),
        AuditResult::Failed { code, .. } if code == CODE_ROLLBACK_FAILED
    ));
}

// ============================================================================
// Soft delete / restore
// ============================================================================

#[tokio::test]
async fn test_soft_delete_directory_flips_every_descendant() {
    let fx = Fixture::new().await;
    let top = fx.mkdir("", "top").await;
    let docs = fx.mkdir("top", "docs").await;
    let a = fx.put("top/docs", "a.txt", b"aaa").await;
    fx.mkdir("top/docs", "x").await;
    let b = fx.put("top/docs/x", "b.txt", b"bb").await;
    assert_eq!(fx.by_id(top.id()).await.size(), 5);

    let deleted = fx.engine.soft_delete(&fx.actor, "top/docs").await.unwrap();

    assert_eq!(deleted.id(), docs.id());
    assert_eq!(deleted.deleted_path(), Some(fx.binned("docs").as_path()));
    assert!(!fx.live("top/docs").exists());
    assert!(fx.binned("docs/x/b.txt").is_file());

    let a = fx.by_id(a.id()).await;
    assert!(a.is_deleted());
    assert_eq!(a.deleted_path(), Some(fx.binned("docs/a.txt").as_path()));
    assert_eq!(a.canonical_path().as_str(), "top/docs/a.txt");
    let b = fx.by_id(b.id()).await;
    assert_eq!(b.deleted_path(), Some(fx.binned("docs/x/b.txt").as_path()));

    assert_eq!(fx.engine.recycle_bin().await.unwrap().len(), 4);
    assert_eq!(fx.by_id(top.id()).await.size(), 0);
}

#[tokio::test]
async fn test_soft_delete_child_then_parent() {
    let fx = Fixture::new().await;
    fx.mkdir("", "docs").await;
    let a = fx.put("docs", "a.txt", b"a").await;

    fx.engine.soft_delete(&fx.actor, "docs/a.txt").await.unwrap();
    fx.engine.soft_delete(&fx.actor, "docs").await.unwrap();

    let a = fx.by_id(a.id()).await;
    assert_eq!(a.deleted_path(), Some(fx.binned("a.txt").as_path()));
    assert!(fx.binned("a.txt").is_file());
    assert!(fx.binned("docs").is_dir());
}

#[tokio::test]
async fn test_soft_delete_overwrites_stale_bin_entry() {
    let fx = Fixture::new().await;
    fx.mkdir("", "one").await;
    fx.mkdir("", "two").await;
    let first = fx.put("one", "a.txt", b"first").await;
    let second = fx.put("two", "a.txt", b"second").await;

    fx.engine.soft_delete(&fx.actor, "one/a.txt").await.unwrap();
    fx.engine.soft_delete(&fx.actor, "two/a.txt").await.unwrap();

    assert!(fx.engine.get_item_by_id(first.id()).await.unwrap().is_none());
    assert!(fx.by_id(second.id()).await.is_deleted());
    assert_eq!(std::fs::read(fx.binned("a.txt")).unwrap(), b"second");
    assert_eq!(std::fs::read_dir(&fx.recycle).unwrap().count(), 1);
}

#[tokio::test]
async fn test_soft_delete_errors() {
    let fx = Fixture::new().await;

    let err = fx.engine.soft_delete(&fx.actor, "/").await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidPath(_)));

    let err = fx.engine.soft_delete(&fx.actor, "ghost").await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));

    std::fs::write(fx.live("stray.txt"), b"x").unwrap();
    let err = fx.engine.soft_delete(&fx.actor, "stray.txt").await.unwrap_err();
    assert!(matches!(err, SyncError::MetadataMissing(_)));
    assert!(fx.live("stray.txt").is_file());
    assert!(!fx.binned("stray.txt").exists());
}

#[tokio::test]
async fn test_soft_delete_rollback_restores_stale_entry() {
    let fx = Fixture::new().await;
    fx.mkdir("", "one").await;
    fx.mkdir("", "two").await;
    let first = fx.put("one", "a.txt", b"first").await;
    fx.put("two", "a.txt", b"second").await;
    fx.engine.soft_delete(&fx.actor, "one/a.txt").await.unwrap();

    fx.fail_commits(true);
    let err = fx.engine.soft_delete(&fx.actor, "two/a.txt").await.unwrap_err();
    fx.fail_commits(false);

    assert!(matches!(err, SyncError::Storage(_)));
    assert_eq!(std::fs::read(fx.live("two/a.txt")).unwrap(), b"second");
    assert_eq!(std::fs::read(fx.binned("a.txt")).unwrap(), b"first");
    assert!(fx.by_id(first.id()).await.is_deleted());
}

#[tokio::test]
async fn test_soft_delete_many_reports_each_path() {
    let fx = Fixture::new().await;
    fx.put("", "a.txt", b"a").await;
    fx.put("", "b.txt", b"b").await;

    let outcomes = fx
        .engine
        .soft_delete_many(
            &fx.actor,
            &["a.txt".to_string(), "missing".to_string(), "b.txt".to_string()],
        )
        .await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].1.is_ok());
    assert!(matches!(outcomes[1].1, Err(SyncError::NotFound(_))));
    assert!(outcomes[2].1.is_ok());
}

#[tokio::test]
async fn test_restore_round_trip() {
    let fx = Fixture::new().await;
    let docs = fx.mkdir("", "docs").await;
    fx.put("docs", "a.txt", b"abc").await;

    fx.engine.soft_delete(&fx.actor, "docs").await.unwrap();
    let restored = fx.engine.restore(&fx.actor, docs.id()).await.unwrap();

    assert_eq!(restored.id(), docs.id());
    assert_eq!(restored.canonical_path(), docs.canonical_path());
    assert_eq!(restored.name(), "docs");
    assert!(!restored.is_deleted());
    assert!(fx.live("docs/a.txt").is_file());
    assert!(!fx.binned("docs").exists());

    let a = fx.record("docs/a.txt").await.unwrap();
    assert!(!a.is_deleted());
    assert_eq!(a.size(), 3);
    assert!(fx.engine.recycle_bin().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_restore_recreates_missing_parents() {
    let fx = Fixture::new().await;
    fx.mkdir("", "docs").await;
    let a = fx.put("docs", "a.txt", b"abc").await;

    fx.engine.soft_delete(&fx.actor, "docs").await.unwrap();
    let restored = fx.engine.restore(&fx.actor, a.id()).await.unwrap();

    assert_eq!(restored.canonical_path().as_str(), "docs/a.txt");
    assert!(fx.live("docs/a.txt").is_file());
    assert!(!fx.binned("docs/a.txt").exists());
}

#[tokio::test]
async fn test_restore_records_recreated_parents() {
    let fx = Fixture::new().await;
    fx.mkdir("", "docs").await;
    fx.mkdir("docs", "sub").await;
    let a = fx.put("docs/sub", "a.txt", b"abc").await;

    fx.engine.soft_delete(&fx.actor, "docs").await.unwrap();
    fx.engine.restore(&fx.actor, a.id()).await.unwrap();

    for path in ["docs", "docs/sub"] {
        let dir = fx.record(path).await.expect("recreated parent has a record");
        assert!(dir.is_folder());
        assert!(!dir.is_deleted());
        assert_eq!(dir.size(), 3);
    }

    // The recreated directory behaves like any other managed directory.
    let renamed = fx.engine.rename(&fx.actor, "docs", "archive").await.unwrap();
    assert_eq!(renamed.canonical_path().as_str(), "archive");
    assert_eq!(
        fx.record("archive/sub/a.txt").await.unwrap().id(),
        a.id()
    );
    fx.engine.soft_delete(&fx.actor, "archive").await.unwrap();
    assert!(!fx.live("archive").exists());
    assert!(fx.record("archive/sub").await.is_none());
}

#[tokio::test]
async fn test_restore_rollback_removes_recreated_parents() {
    let fx = Fixture::new().await;
    fx.mkdir("", "docs").await;
    let a = fx.put("docs", "a.txt", b"abc").await;
    fx.engine.soft_delete(&fx.actor, "docs").await.unwrap();

    fx.fail_commits(true);
    let err = fx.engine.restore(&fx.actor, a.id()).await.unwrap_err();
    fx.fail_commits(false);

    assert!(matches!(err, SyncError::Storage(_)));
    assert!(!fx.live("docs").exists());
    assert!(fx.record("docs").await.is_none());
    assert!(fx.binned("docs/a.txt").is_file());
}

#[tokio::test]
async fn test_restore_conflict_and_state_errors() {
    let fx = Fixture::new().await;
    let a = fx.put("", "a.txt", b"old").await;

    let err = fx.engine.restore(&fx.actor, a.id()).await.unwrap_err();
    assert!(matches!(err, SyncError::NotInRecycleBin(_)));

    fx.engine.soft_delete(&fx.actor, "a.txt").await.unwrap();
    fx.put("", "a.txt", b"new").await;
    let err = fx.engine.restore(&fx.actor, a.id()).await.unwrap_err();
    assert!(matches!(err, SyncError::Conflict { .. }));
    assert!(fx.binned("a.txt").is_file());

    let err = fx.engine.restore(&fx.actor, ItemId::new(9999)).await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn test_restore_rollback_moves_entry_back_to_bin() {
    let fx = Fixture::new().await;
    let a = fx.put("", "a.txt", b"abc").await;
    fx.engine.soft_delete(&fx.actor, "a.txt").await.unwrap();

    fx.fail_commits(true);
    let err = fx.engine.restore(&fx.actor, a.id()).await.unwrap_err();
    fx.fail_commits(false);

    assert!(matches!(err, SyncError::Storage(_)));
    assert!(fx.binned("a.txt").is_file());
    assert!(!fx.live("a.txt").exists());
    assert!(fx.by_id(a.id()).await.is_deleted());
}

// ============================================================================
// Permanent delete
// ============================================================================

#[tokio::test]
async fn test_permanent_delete_removes_object_and_records() {
    let fx = Fixture::new().await;
    let docs = fx.mkdir("", "docs").await;
    let a = fx.put("docs", "a.txt", b"a").await;
    fx.engine.soft_delete(&fx.actor, "docs").await.unwrap();

    let removed = fx.engine.permanent_delete(&fx.actor, docs.id()).await.unwrap();

    assert_eq!(removed.id(), docs.id());
    assert!(!fx.binned("docs").exists());
    assert!(fx.engine.get_item_by_id(docs.id()).await.unwrap().is_none());
    assert!(fx.engine.get_item_by_id(a.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_permanent_delete_requires_recycled_item() {
    let fx = Fixture::new().await;
    let a = fx.put("", "a.txt", b"a").await;

    let err = fx.engine.permanent_delete(&fx.actor, a.id()).await.unwrap_err();
    assert!(matches!(err, SyncError::NotInRecycleBin(_)));

    let err = fx
        .engine
        .permanent_delete(&fx.actor, ItemId::new(424242))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn test_permanent_delete_tolerates_absent_object() {
    let fx = Fixture::new().await;
    let a = fx.put("", "a.txt", b"a").await;
    fx.engine.soft_delete(&fx.actor, "a.txt").await.unwrap();
    std::fs::remove_file(fx.binned("a.txt")).unwrap();

    fx.engine.permanent_delete(&fx.actor, a.id()).await.unwrap();
    assert!(fx.engine.get_item_by_id(a.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_permanent_delete_commit_failure_is_irreversible() {
    let fx = Fixture::new().await;
    let a = fx.put("", "a.txt", b"a").await;
    fx.engine.soft_delete(&fx.actor, "a.txt").await.unwrap();

    fx.fail_commits(true);
    let err = fx.engine.permanent_delete(&fx.actor, a.id()).await.unwrap_err();
    fx.fail_commits(false);

    assert!(matches!(err, SyncError::RollbackFailed { .. }));
    assert!(!fx.binned("a.txt").exists());
    assert!(fx.by_id(a.id()).await.is_deleted());
}

#[tokio::test]
async fn test_permanent_delete_of_absent_object_reports_plain_failure() {
    let fx = Fixture::new().await;
    let a = fx.put("", "a.txt", b"a").await;
    fx.engine.soft_delete(&fx.actor, "a.txt").await.unwrap();
    std::fs::remove_file(fx.binned("a.txt")).unwrap();

    fx.fail_commits(true);
    let err = fx.engine.permanent_delete(&fx.actor, a.id()).await.unwrap_err();
    fx.fail_commits(false);

    assert!(matches!(err, SyncError::Storage(_)));
}

// ============================================================================
// Rollback of creations
// ============================================================================

#[tokio::test]
async fn test_upload_commit_failure_removes_written_file() {
    let fx = Fixture::new().await;

    fx.fail_commits(true);
    let err = fx
        .engine
        .upload(&fx.actor, "", FileUpload::new("a.txt", b"a".to_vec()))
        .await
        .unwrap_err();
    fx.fail_commits(false);

    assert!(matches!(err, SyncError::Storage(_)));
    assert!(!fx.live("a.txt").exists());
    assert!(fx.record("a.txt").await.is_none());
}

#[tokio::test]
async fn test_create_directory_commit_failure_removes_directory() {
    let fx = Fixture::new().await;

    fx.fail_commits(true);
    let err = fx
        .engine
        .create_directory(&fx.actor, "", "docs")
        .await
        .unwrap_err();
    fx.fail_commits(false);

    assert!(matches!(err, SyncError::Storage(_)));
    assert!(!fx.live("docs").exists());
}

#[tokio::test]
async fn test_upload_rollback_failure_is_reported() {
    let fx = Fixture::new().await;

    fx.fail_commits(true);
    fx.fail_reverts(true);
    let err = fx
        .engine
        .upload(&fx.actor, "", FileUpload::new("a.txt", b"a".to_vec()))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::RollbackFailed { item_id: None, .. }));
    // the file stays behind without a record
    assert!(fx.live("a.txt").is_file());
}

// ============================================================================
// Read-only views
// ============================================================================

#[tokio::test]
async fn test_item_info_with_and_without_record() {
    let fx = Fixture::new().await;
    fx.mkdir("", "docs").await;
    fx.engine
        .upload(
            &fx.actor,
            "docs",
            FileUpload::new("a.txt", vec![1u8; 1536]).with_issued_by("registry"),
        )
        .await
        .unwrap();

    let info = fx.engine.item_info("docs/a.txt").await.unwrap();
    assert_eq!(info.name, "a.txt");
    assert_eq!(info.location, "docs/a.txt");
    assert_eq!(info.created_by, "alice");
    assert_eq!(info.issued_by, "registry");
    assert_eq!(info.size_display, "1.50 KB");
    assert!(info.modified.is_some());

    std::fs::create_dir(fx.live("raw")).unwrap();
    std::fs::write(fx.live("raw/x"), vec![0u8; 100]).unwrap();
    let info = fx.engine.item_info("raw").await.unwrap();
    assert!(info.is_folder);
    assert_eq!(info.created_by, "Unknown");
    assert_eq!(info.size, 100);
    assert_eq!(info.expiry_date, None);

    let err = fx.engine.item_info("nope").await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn test_audit_trail_records_lifecycle() {
    let fx = Fixture::new().await;
    let a = fx.put("", "a.txt", b"a").await;
    fx.engine.rename(&fx.actor, "a.txt", "b").await.unwrap();
    fx.engine.soft_delete(&fx.actor, "b.txt").await.unwrap();
    fx.engine.restore(&fx.actor, a.id()).await.unwrap();

    let trail = fx.engine.audit_trail(a.id()).await.unwrap();
    let actions: Vec<_> = trail.iter().map(|e| e.action().as_str()).collect();
    assert_eq!(actions, vec!["file_upload", "rename", "soft_delete", "restore"]);
    assert!(trail.iter().all(|e| e.result().is_success()));
    assert!(trail.iter().all(|e| e.actor() == Some("alice")));
}
