//! Sync engine - two-phase filesystem/metadata operations
//!
//! Every mutating operation runs as:
//!
//! 1. **Lock** the affected subtrees ([`SubtreeLocks`])
//! 2. **Phase F**: apply the filesystem change, keeping a receipt
//! 3. **Phase M**: build the mutation set and commit it atomically
//! 4. **Settle**: on commit, finalize the receipt; on failure, undo Phase F
//!
//! If undoing Phase F fails as well the operation ends `Diverged` and the
//! caller receives [`SyncError::RollbackFailed`].
//!
//! Operations are spawned onto the runtime and awaited through their
//! `JoinHandle`, so a caller that stops waiting never interrupts a Phase F /
//! Phase M pair half-way.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use fsmgr_audit::{AuditLogger, OperationRecord};
use fsmgr_conflict::{force_extension, NameConflictResolver, NameKind};
use fsmgr_core::{
    domain::{
        format_size, validate_name, Actor, AuditEntry, CanonicalPath, Item, ItemId, NewItem,
        OperationId, OperationKind, OperationPhase, PathResolver,
    },
    ports::{IFileSystemMover, IMetadataStore, MoveReceipt, MoverError, Mutation, WriteReceipt},
};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::locks::{LockKey, LockScope, SubtreeGuard, SubtreeLocks};
use crate::SyncError;

// ============================================================================
// Public value types
// ============================================================================

/// One file handed to [`SyncEngine::upload`]
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub data: Vec<u8>,
    /// Issuer recorded on the item; defaults to the uploading actor
    pub issued_by: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
            issued_by: None,
            expiry_date: None,
        }
    }

    pub fn with_issued_by(mut self, issued_by: impl Into<String>) -> Self {
        self.issued_by = Some(issued_by.into());
        self
    }

    pub fn with_expiry(mut self, expiry_date: DateTime<Utc>) -> Self {
        self.expiry_date = Some(expiry_date);
        self
    }
}

/// The upload that stopped a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchConflict {
    /// Position of the conflicting file in the batch
    pub index: usize,
    pub file_name: String,
    pub suggested_name: Option<String>,
}

/// Result of [`SyncEngine::upload_many`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchUpload {
    /// Items committed before the batch stopped
    pub uploaded: Vec<Item>,
    pub conflict: Option<BatchConflict>,
}

/// Descriptive view of a managed file or directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemInfo {
    pub name: String,
    /// Canonical path relative to the managed root
    pub location: String,
    pub is_folder: bool,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub created_by: String,
    pub modified_by: String,
    pub size: u64,
    pub size_display: String,
    pub issued_by: String,
    pub expiry_date: Option<DateTime<Utc>>,
}

const UNKNOWN: &str = "Unknown";

// ============================================================================
// Operation bookkeeping
// ============================================================================

/// What Phase F changed, and how to take it back
#[derive(Debug)]
enum Applied {
    Created(PathBuf),
    Written(WriteReceipt),
    Moved(MoveReceipt),
    /// Removed for good; cannot be undone
    Removed(PathBuf),
    Nothing,
}

/// Paths and item recorded for audit and `RollbackFailed`
#[derive(Debug, Clone)]
struct Trail {
    item_id: Option<ItemId>,
    from: PathBuf,
    to: PathBuf,
}

impl Trail {
    fn new(item_id: Option<ItemId>, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            item_id,
            from: from.into(),
            to: to.into(),
        }
    }
}

struct OpContext<'a> {
    id: OperationId,
    kind: OperationKind,
    actor: &'a Actor,
    phase: OperationPhase,
    started: Instant,
}

impl<'a> OpContext<'a> {
    fn begin(kind: OperationKind, actor: &'a Actor) -> Self {
        let id = OperationId::new();
        tracing::Span::current().record("operation", tracing::field::display(id));
        debug!(kind = %kind, "operation started");
        Self {
            id,
            kind,
            actor,
            phase: OperationPhase::Pending,
            started: Instant::now(),
        }
    }

    fn enter(&mut self, phase: OperationPhase) -> Result<(), SyncError> {
        self.phase.transition_to(phase)?;
        debug!(phase = %phase, "phase");
        Ok(())
    }

    /// Phase F failed: nothing to undo, nothing to audit
    fn abort(&mut self, err: SyncError) -> SyncError {
        if let Err(e) = self.enter(OperationPhase::Failed) {
            warn!(error = %e, "unexpected phase");
        }
        debug!(error = %err, "filesystem phase failed");
        err
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn record(&self, trail: &Trail) -> OperationRecord<'a> {
        OperationRecord {
            operation: self.id,
            kind: self.kind,
            actor: self.actor,
            item_id: trail.item_id,
            from: Some(trail.from.display().to_string()),
            to: Some(trail.to.display().to_string()),
            duration_ms: self.elapsed_ms(),
        }
    }
}

fn signed(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

/// Map a Phase F mover error onto the engine taxonomy
fn fs_error(err: MoverError) -> SyncError {
    match err {
        MoverError::SourceNotFound(p) | MoverError::NotFound(p) => {
            SyncError::NotFound(p.display().to_string())
        }
        MoverError::DestinationOccupied(p) | MoverError::AlreadyExists(p) => SyncError::Conflict {
            path: p.display().to_string(),
            suggested_name: None,
        },
        other => SyncError::Io(other),
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Orchestrates filesystem and metadata changes so they commit together.
///
/// Cheap to clone; clones share the lock table.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    resolver: PathResolver,
    store: Arc<dyn IMetadataStore>,
    mover: Arc<dyn IFileSystemMover>,
    namer: NameConflictResolver,
    locks: Arc<SubtreeLocks>,
    audit: AuditLogger,
}

impl SyncEngine {
    pub fn new(
        resolver: PathResolver,
        store: Arc<dyn IMetadataStore>,
        mover: Arc<dyn IFileSystemMover>,
    ) -> Self {
        Self::with_namer(resolver, store, mover, NameConflictResolver::default())
    }

    pub fn with_namer(
        resolver: PathResolver,
        store: Arc<dyn IMetadataStore>,
        mover: Arc<dyn IFileSystemMover>,
        namer: NameConflictResolver,
    ) -> Self {
        let audit = AuditLogger::new(Arc::clone(&store));
        Self {
            inner: Arc::new(EngineInner {
                resolver,
                store,
                mover,
                namer,
                locks: Arc::new(SubtreeLocks::new()),
                audit,
            }),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.inner.resolver
    }

    /// Drive `fut` to completion on its own task.
    async fn run<T, F>(fut: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, SyncError>> + Send + 'static,
        T: Send + 'static,
    {
        tokio::spawn(fut)
            .await
            .map_err(|e| SyncError::Internal(format!("operation task failed: {e}")))?
    }

    /// Create directory `name` inside `path`.
    pub async fn create_directory(
        &self,
        actor: &Actor,
        path: &str,
        name: &str,
    ) -> Result<Item, SyncError> {
        let (inner, actor, path, name) = (
            Arc::clone(&self.inner),
            actor.clone(),
            path.to_string(),
            name.to_string(),
        );
        Self::run(async move { inner.create_directory(&actor, &path, &name).await }).await
    }

    /// Store a new file inside directory `path`.
    pub async fn upload(
        &self,
        actor: &Actor,
        path: &str,
        file: FileUpload,
    ) -> Result<Item, SyncError> {
        let (inner, actor, path) = (Arc::clone(&self.inner), actor.clone(), path.to_string());
        Self::run(async move { inner.upload(&actor, &path, file).await }).await
    }

    /// Upload files one by one, stopping at the first name conflict.
    ///
    /// Each file commits on its own; errors other than a conflict are
    /// returned as-is, leaving earlier uploads in place.
    pub async fn upload_many(
        &self,
        actor: &Actor,
        path: &str,
        files: Vec<FileUpload>,
    ) -> Result<BatchUpload, SyncError> {
        let mut batch = BatchUpload::default();
        for (index, file) in files.into_iter().enumerate() {
            let file_name = file.file_name.clone();
            match self.upload(actor, path, file).await {
                Ok(item) => batch.uploaded.push(item),
                Err(SyncError::Conflict { suggested_name, .. }) => {
                    batch.conflict = Some(BatchConflict {
                        index,
                        file_name,
                        suggested_name,
                    });
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(batch)
    }

    /// Write a file inside `path`, overwriting any file of the same name.
    pub async fn replace(
        &self,
        actor: &Actor,
        path: &str,
        file: FileUpload,
    ) -> Result<Item, SyncError> {
        let (inner, actor, path) = (Arc::clone(&self.inner), actor.clone(), path.to_string());
        Self::run(async move { inner.replace(&actor, &path, file).await }).await
    }

    /// Move the entry at `path` into the recycle bin.
    pub async fn soft_delete(&self, actor: &Actor, path: &str) -> Result<Item, SyncError> {
        let (inner, actor, path) = (Arc::clone(&self.inner), actor.clone(), path.to_string());
        Self::run(async move { inner.soft_delete(&actor, &path).await }).await
    }

    /// Soft-delete each path independently.
    pub async fn soft_delete_many(
        &self,
        actor: &Actor,
        paths: &[String],
    ) -> Vec<(String, Result<Item, SyncError>)> {
        let mut outcomes = Vec::with_capacity(paths.len());
        for path in paths {
            let outcome = self.soft_delete(actor, path).await;
            outcomes.push((path.clone(), outcome));
        }
        outcomes
    }

    /// Remove a recycled item for good. Returns the removed record.
    pub async fn permanent_delete(&self, actor: &Actor, id: ItemId) -> Result<Item, SyncError> {
        let (inner, actor) = (Arc::clone(&self.inner), actor.clone());
        Self::run(async move { inner.permanent_delete(&actor, id).await }).await
    }

    /// Bring a recycled item back to its canonical path.
    pub async fn restore(&self, actor: &Actor, id: ItemId) -> Result<Item, SyncError> {
        let (inner, actor) = (Arc::clone(&self.inner), actor.clone());
        Self::run(async move { inner.restore(&actor, id).await }).await
    }

    /// Rename the entry at `path`. File extensions are preserved.
    pub async fn rename(
        &self,
        actor: &Actor,
        path: &str,
        new_name: &str,
    ) -> Result<Item, SyncError> {
        let (inner, actor, path, new_name) = (
            Arc::clone(&self.inner),
            actor.clone(),
            path.to_string(),
            new_name.to_string(),
        );
        Self::run(async move { inner.rename(&actor, &path, &new_name).await }).await
    }

    pub async fn item_info(&self, path: &str) -> Result<ItemInfo, SyncError> {
        self.inner.item_info(path).await
    }

    /// The live record at `path`, if any
    pub async fn get_item(&self, path: &str) -> Result<Option<Item>, SyncError> {
        let resolved = self.inner.resolver.resolve(path)?;
        let _guard = self
            .inner
            .locks
            .acquire(vec![LockKey::shared(LockScope::Managed, resolved.canonical.clone())])
            .await;
        Ok(self.inner.store.get(&resolved.canonical).await?)
    }

    pub async fn get_item_by_id(&self, id: ItemId) -> Result<Option<Item>, SyncError> {
        Ok(self.inner.store.get_by_id(id).await?)
    }

    /// Every soft-deleted record, most recent first
    pub async fn recycle_bin(&self) -> Result<Vec<Item>, SyncError> {
        Ok(self.inner.store.list_deleted().await?)
    }

    pub async fn audit_trail(&self, id: ItemId) -> Result<Vec<AuditEntry>, SyncError> {
        Ok(self.inner.store.get_audit_trail(id).await?)
    }

    pub async fn recent_audit(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, SyncError> {
        Ok(self.inner.store.get_audit_since(since, limit).await?)
    }
}

// ============================================================================
// Operations
// ============================================================================

impl EngineInner {
    #[instrument(skip(self, actor), fields(actor = actor.name(), operation = tracing::field::Empty))]
    async fn create_directory(
        &self,
        actor: &Actor,
        path: &str,
        name: &str,
    ) -> Result<Item, SyncError> {
        validate_name(name)?;
        let parent = self.resolver.resolve(path)?;
        let target = parent.canonical.join(name)?;
        let absolute = self.resolver.absolute(&target);

        let _guard = self.lock(vec![managed(&target)]).await;
        if !self.mover.stat(&parent.absolute).await?.is_directory() {
            return Err(SyncError::NotFound(parent.canonical.to_string()));
        }
        if self.occupied(&target).await? {
            return Err(self.conflict(&target, NameKind::Directory).await);
        }

        let mut ctx = OpContext::begin(OperationKind::CreateDirectory, actor);
        if let Err(e) = self.mover.create_dir(&absolute).await {
            return Err(ctx.abort(fs_error(e)));
        }
        ctx.enter(OperationPhase::FilesystemApplied)?;

        let outcome = self
            .insert_one(NewItem::folder(target.clone(), actor), Vec::new())
            .await;
        let trail = Trail::new(None, &absolute, &absolute);
        self.settle(ctx, Applied::Created(absolute), outcome, trail)
            .await
    }

    #[instrument(skip(self, actor, file), fields(actor = actor.name(), file = %file.file_name, operation = tracing::field::Empty))]
    async fn upload(&self, actor: &Actor, path: &str, file: FileUpload) -> Result<Item, SyncError> {
        if file.data.is_empty() {
            return Err(SyncError::EmptyFile(file.file_name));
        }
        validate_name(&file.file_name)?;
        let dir = self.resolver.resolve(path)?;
        let target = dir.canonical.join(&file.file_name)?;
        let absolute = self.resolver.absolute(&target);

        let _guard = self.lock(vec![managed(&target)]).await;
        if !self.mover.stat(&dir.absolute).await?.is_directory() {
            return Err(SyncError::NotFound(dir.canonical.to_string()));
        }
        if self.occupied(&target).await? {
            return Err(self.conflict(&target, NameKind::File).await);
        }

        let mut ctx = OpContext::begin(OperationKind::Upload, actor);
        let receipt = match self.mover.write_file(&absolute, &file.data, false).await {
            Ok(r) => r,
            Err(e) => return Err(ctx.abort(fs_error(e))),
        };
        ctx.enter(OperationPhase::FilesystemApplied)?;

        let size = file.data.len() as u64;
        let outcome = async {
            let ancestors = self.ancestor_adjustments(&target, signed(size)).await?;
            let new_item = NewItem::file(target.clone(), size, actor)
                .with_issued_by(file.issued_by.clone())
                .with_expiry(file.expiry_date);
            self.insert_one(new_item, ancestors).await
        }
        .await;
        let trail = Trail::new(None, &absolute, &absolute);
        self.settle(ctx, Applied::Written(receipt), outcome, trail)
            .await
    }

    #[instrument(skip(self, actor, file), fields(actor = actor.name(), file = %file.file_name, operation = tracing::field::Empty))]
    async fn replace(&self, actor: &Actor, path: &str, file: FileUpload) -> Result<Item, SyncError> {
        if file.data.is_empty() {
            return Err(SyncError::EmptyFile(file.file_name));
        }
        validate_name(&file.file_name)?;
        let dir = self.resolver.resolve(path)?;
        let target = dir.canonical.join(&file.file_name)?;
        let absolute = self.resolver.absolute(&target);

        let _guard = self.lock(vec![managed(&target)]).await;
        if !self.mover.stat(&dir.absolute).await?.is_directory() {
            return Err(SyncError::NotFound(dir.canonical.to_string()));
        }

        let mut ctx = OpContext::begin(OperationKind::Replace, actor);
        let receipt = match self.mover.write_file(&absolute, &file.data, true).await {
            Ok(r) => r,
            Err(e) => return Err(ctx.abort(fs_error(e))),
        };
        ctx.enter(OperationPhase::FilesystemApplied)?;

        let size = file.data.len() as u64;
        let outcome = async {
            match self.store.get(&target).await? {
                Some(mut item) => {
                    let delta = signed(size) - signed(item.size());
                    item.record_content(
                        size,
                        actor,
                        file.issued_by.clone(),
                        file.expiry_date,
                    );
                    let mut mutations = vec![Mutation::Update(item.clone())];
                    mutations.extend(self.ancestor_adjustments(&target, delta).await?);
                    self.store.commit(mutations).await?;
                    Ok(item)
                }
                None => {
                    let ancestors = self.ancestor_adjustments(&target, signed(size)).await?;
                    let new_item = NewItem::file(target.clone(), size, actor)
                        .with_issued_by(file.issued_by.clone())
                        .with_expiry(file.expiry_date);
                    self.insert_one(new_item, ancestors).await
                }
            }
        }
        .await;
        let trail = Trail::new(None, &absolute, &absolute);
        self.settle(ctx, Applied::Written(receipt), outcome, trail)
            .await
    }

    #[instrument(skip(self, actor), fields(actor = actor.name(), operation = tracing::field::Empty))]
    async fn soft_delete(&self, actor: &Actor, path: &str) -> Result<Item, SyncError> {
        let source = self.resolver.resolve(path)?;
        if source.canonical.is_root() {
            return Err(SyncError::InvalidPath(
                "the managed root cannot be deleted".to_string(),
            ));
        }
        let recycled = self.resolver.recycle_path(source.canonical.name());
        let recycle_key = self.resolver.recycle_key(&recycled)?;

        let _guard = self
            .lock(vec![
                managed(&source.canonical),
                LockKey::exclusive(LockScope::Recycle, recycle_key),
            ])
            .await;
        if !self.mover.stat(&source.absolute).await?.exists {
            return Err(SyncError::NotFound(source.canonical.to_string()));
        }

        let mut ctx = OpContext::begin(OperationKind::SoftDelete, actor);
        let receipt = match self
            .mover
            .move_entry(&source.absolute, &recycled, true)
            .await
        {
            Ok(r) => r,
            Err(e) => return Err(ctx.abort(fs_error(e))),
        };
        ctx.enter(OperationPhase::FilesystemApplied)?;

        let mut trail = Trail::new(None, &source.absolute, &recycled);
        let outcome = async {
            let records = self.store.find_by_prefix(&source.canonical).await?;
            let target = records
                .iter()
                .find(|item| item.canonical_path() == &source.canonical)
                .cloned()
                .ok_or_else(|| SyncError::MetadataMissing(source.canonical.to_string()))?;
            trail.item_id = Some(target.id());

            // Records of the stale entry that was overwritten in the bin
            let mut mutations: Vec<Mutation> = self
                .store
                .find_deleted_under(&recycled)
                .await?
                .into_iter()
                .map(|stale| Mutation::Delete(stale.id()))
                .collect();

            let mut flipped = None;
            for mut item in records {
                let rel = source
                    .canonical
                    .relative(item.canonical_path())
                    .unwrap_or_default();
                let deleted_path = if rel.is_empty() {
                    recycled.clone()
                } else {
                    recycled.join(rel)
                };
                item.mark_deleted(deleted_path, actor)?;
                if item.id() == target.id() {
                    flipped = Some(item.clone());
                }
                mutations.push(Mutation::Update(item));
            }
            mutations.extend(
                self.ancestor_adjustments(&source.canonical, -signed(target.size()))
                    .await?,
            );

            debug!(mutations = mutations.len(), "committing soft delete");
            self.store.commit(mutations).await?;
            flipped.ok_or_else(|| SyncError::MetadataMissing(source.canonical.to_string()))
        }
        .await;
        self.settle(ctx, Applied::Moved(receipt), outcome, trail)
            .await
    }

    #[instrument(skip(self, actor), fields(actor = actor.name(), operation = tracing::field::Empty))]
    async fn permanent_delete(&self, actor: &Actor, id: ItemId) -> Result<Item, SyncError> {
        let (_guard, item, deleted_path) = self.lock_recycled(id, |_| Vec::new()).await?;

        let mut ctx = OpContext::begin(OperationKind::PermanentDelete, actor);
        let applied = match self.mover.delete(&deleted_path, true).await {
            Ok(()) => Applied::Removed(deleted_path.clone()),
            Err(MoverError::NotFound(_)) => {
                debug!("recycled entry already absent");
                Applied::Nothing
            }
            Err(e) => return Err(ctx.abort(fs_error(e))),
        };
        ctx.enter(OperationPhase::FilesystemApplied)?;

        let outcome = async {
            let mut mutations: Vec<Mutation> = self
                .store
                .find_deleted_under(&deleted_path)
                .await?
                .into_iter()
                .map(|record| Mutation::Delete(record.id()))
                .collect();
            if !mutations.contains(&Mutation::Delete(id)) {
                mutations.push(Mutation::Delete(id));
            }
            self.store.commit(mutations).await?;
            Ok::<_, SyncError>(item)
        }
        .await;
        let trail = Trail::new(Some(id), &deleted_path, &deleted_path);
        self.settle(ctx, applied, outcome, trail).await
    }

    #[instrument(skip(self, actor), fields(actor = actor.name(), operation = tracing::field::Empty))]
    async fn restore(&self, actor: &Actor, id: ItemId) -> Result<Item, SyncError> {
        let (_guard, item, deleted_path) = self
            .lock_recycled(id, |item| vec![managed(item.canonical_path())])
            .await?;
        let destination = self.resolver.absolute(item.canonical_path());

        if self.occupied(item.canonical_path()).await? {
            return Err(SyncError::Conflict {
                path: item.canonical_path().to_string(),
                suggested_name: None,
            });
        }

        let mut ctx = OpContext::begin(OperationKind::Restore, actor);
        let receipt = match self
            .mover
            .move_entry(&deleted_path, &destination, false)
            .await
        {
            Ok(r) => r,
            Err(e) => return Err(ctx.abort(fs_error(e))),
        };
        ctx.enter(OperationPhase::FilesystemApplied)?;

        let outcome = async {
            let mut restored = None;
            // Parents recreated by the move get live folder records holding
            // the restored size.
            let mut mutations = Vec::new();
            for dir in &receipt.created_dirs {
                let canonical = self.resolver.canonical_of(dir)?;
                mutations.push(Mutation::Insert(NewItem {
                    size: item.size(),
                    ..NewItem::folder(canonical, actor)
                }));
            }
            for mut record in self.store.find_deleted_under(&deleted_path).await? {
                record.mark_restored(actor)?;
                if record.id() == id {
                    restored = Some(record.clone());
                }
                mutations.push(Mutation::Update(record));
            }
            let restored = match restored {
                Some(r) => r,
                None => {
                    let mut record = item.clone();
                    record.mark_restored(actor)?;
                    mutations.push(Mutation::Update(record.clone()));
                    record
                }
            };
            mutations.extend(
                self.ancestor_adjustments(item.canonical_path(), signed(item.size()))
                    .await?,
            );
            self.store.commit(mutations).await?;
            Ok::<_, SyncError>(restored)
        }
        .await;
        let trail = Trail::new(Some(id), &deleted_path, &destination);
        self.settle(ctx, Applied::Moved(receipt), outcome, trail)
            .await
    }

    #[instrument(skip(self, actor), fields(actor = actor.name(), operation = tracing::field::Empty))]
    async fn rename(&self, actor: &Actor, path: &str, new_name: &str) -> Result<Item, SyncError> {
        validate_name(new_name)?;
        let source = self.resolver.resolve(path)?;
        if source.canonical.is_root() {
            return Err(SyncError::InvalidPath(
                "the managed root cannot be renamed".to_string(),
            ));
        }

        let state = self.mover.stat(&source.absolute).await?;
        if !state.exists {
            return Err(SyncError::NotFound(source.canonical.to_string()));
        }
        let (new_name, kind) = if state.is_dir {
            (new_name.to_string(), NameKind::Directory)
        } else {
            (
                force_extension(source.canonical.name(), new_name),
                NameKind::File,
            )
        };

        if new_name == source.canonical.name() {
            let _guard = self
                .locks
                .acquire(vec![LockKey::shared(
                    LockScope::Managed,
                    source.canonical.clone(),
                )])
                .await;
            return self
                .store
                .get(&source.canonical)
                .await?
                .ok_or_else(|| SyncError::MetadataMissing(source.canonical.to_string()));
        }

        let target = source.canonical.with_name(&new_name)?;
        let destination = self.resolver.absolute(&target);

        let _guard = self
            .lock(vec![managed(&source.canonical), managed(&target)])
            .await;
        if !self.mover.stat(&source.absolute).await?.exists {
            return Err(SyncError::NotFound(source.canonical.to_string()));
        }
        if self.occupied(&target).await? {
            return Err(self.conflict(&target, kind).await);
        }

        let mut ctx = OpContext::begin(OperationKind::Rename, actor);
        let receipt = match self
            .mover
            .move_entry(&source.absolute, &destination, false)
            .await
        {
            Ok(r) => r,
            Err(e) => return Err(ctx.abort(fs_error(e))),
        };
        ctx.enter(OperationPhase::FilesystemApplied)?;

        let mut trail = Trail::new(None, &source.absolute, &destination);
        let outcome = async {
            let records = self.store.find_by_prefix(&source.canonical).await?;
            let target_id = records
                .iter()
                .find(|item| item.canonical_path() == &source.canonical)
                .map(Item::id)
                .ok_or_else(|| SyncError::MetadataMissing(source.canonical.to_string()))?;
            trail.item_id = Some(target_id);

            let mut renamed = None;
            let mut mutations = Vec::with_capacity(records.len());
            for mut item in records {
                let Some(rebased) = item.canonical_path().rebase(&source.canonical, &target)
                else {
                    continue;
                };
                item.relocate(rebased, actor)?;
                if item.id() == target_id {
                    renamed = Some(item.clone());
                }
                mutations.push(Mutation::Update(item));
            }

            debug!(mutations = mutations.len(), "committing rename");
            self.store.commit(mutations).await?;
            renamed.ok_or_else(|| SyncError::MetadataMissing(source.canonical.to_string()))
        }
        .await;
        self.settle(ctx, Applied::Moved(receipt), outcome, trail)
            .await
    }

    #[instrument(skip(self))]
    async fn item_info(&self, path: &str) -> Result<ItemInfo, SyncError> {
        let resolved = self.resolver.resolve(path)?;
        let _guard = self
            .locks
            .acquire(vec![LockKey::shared(
                LockScope::Managed,
                resolved.canonical.clone(),
            )])
            .await;

        let state = self.mover.stat(&resolved.absolute).await?;
        if !state.exists {
            return Err(SyncError::NotFound(resolved.canonical.to_string()));
        }

        let name = if resolved.canonical.is_root() {
            String::new()
        } else {
            resolved.canonical.name().to_string()
        };
        let mut info = ItemInfo {
            name,
            location: resolved.canonical.as_str().to_string(),
            is_folder: state.is_dir,
            created: state.created,
            modified: state.modified,
            created_by: UNKNOWN.to_string(),
            modified_by: UNKNOWN.to_string(),
            size: 0,
            size_display: String::new(),
            issued_by: UNKNOWN.to_string(),
            expiry_date: None,
        };

        match self.store.get(&resolved.canonical).await? {
            Some(item) => {
                info.created_by = item.owner().to_string();
                info.modified_by = item.modified_by().to_string();
                info.issued_by = item.issued_by().to_string();
                info.expiry_date = item.expiry_date();
                info.size = item.size();
            }
            None if state.is_dir => {
                info.size = self.mover.dir_size(&resolved.absolute).await?;
            }
            None => info.size = state.size,
        }
        info.size_display = format_size(info.size);
        Ok(info)
    }

    // ------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------

    /// Finish an operation whose Phase F succeeded.
    async fn settle(
        &self,
        mut ctx: OpContext<'_>,
        applied: Applied,
        outcome: Result<Item, SyncError>,
        mut trail: Trail,
    ) -> Result<Item, SyncError> {
        let cause = match outcome {
            Ok(item) => {
                ctx.enter(OperationPhase::Committed)?;
                self.finalize(&applied).await;
                trail.item_id = Some(item.id());
                info!(
                    operation = %ctx.id,
                    kind = %ctx.kind,
                    item_id = %item.id(),
                    duration_ms = ctx.elapsed_ms(),
                    "operation committed"
                );
                self.audit.log_committed(&ctx.record(&trail)).await;
                return Ok(item);
            }
            Err(cause) => cause,
        };

        match self.undo(&applied).await {
            Ok(()) => {
                ctx.enter(OperationPhase::RolledBack)?;
                ctx.enter(OperationPhase::Failed)?;
                warn!(
                    operation = %ctx.id,
                    kind = %ctx.kind,
                    error = %cause,
                    "metadata commit failed, filesystem change rolled back"
                );
                self.audit
                    .log_rolled_back(&ctx.record(&trail), &cause.to_string())
                    .await;
                Err(cause)
            }
            Err(rollback_error) => {
                ctx.enter(OperationPhase::Diverged)?;
                let cause = cause.to_string();
                error!(
                    operation = %ctx.id,
                    kind = %ctx.kind,
                    item_id = ?trail.item_id,
                    from = %trail.from.display(),
                    to = %trail.to.display(),
                    error = %cause,
                    rollback_error = %rollback_error,
                    "rollback failed, filesystem and metadata diverged"
                );
                self.audit
                    .log_diverged(&ctx.record(&trail), &cause, &rollback_error)
                    .await;
                Err(SyncError::RollbackFailed {
                    operation: ctx.id,
                    kind: ctx.kind,
                    item_id: trail.item_id,
                    from_path: trail.from,
                    to_path: trail.to,
                    cause,
                    rollback_error,
                })
            }
        }
    }

    /// Inverse of Phase F
    async fn undo(&self, applied: &Applied) -> Result<(), String> {
        let result = match applied {
            Applied::Created(path) => self.mover.delete(path, false).await,
            Applied::Written(receipt) => self.mover.revert_write(receipt).await,
            Applied::Moved(receipt) => self.mover.revert_move(receipt).await,
            Applied::Removed(path) => {
                return Err(format!(
                    "{} was permanently removed and cannot be restored",
                    path.display()
                ))
            }
            Applied::Nothing => Ok(()),
        };
        result.map_err(|e| e.to_string())
    }

    /// Post-commit cleanup; both sides already agree, so failures only warn
    async fn finalize(&self, applied: &Applied) {
        let displaced = match applied {
            Applied::Written(WriteReceipt { displaced, .. })
            | Applied::Moved(MoveReceipt { displaced, .. }) => displaced.as_deref(),
            _ => None,
        };
        if let Some(path) = displaced {
            if let Err(e) = self.mover.discard_displaced(path).await {
                warn!(path = %path.display(), error = %e, "could not discard displaced entry");
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn lock(&self, keys: Vec<LockKey>) -> SubtreeGuard {
        self.locks.acquire(keys).await
    }

    /// Lock a recycled record's bin entry (plus `extra` keys), re-reading the
    /// record until it is stable under the lock.
    async fn lock_recycled<F>(
        &self,
        id: ItemId,
        extra: F,
    ) -> Result<(SubtreeGuard, Item, PathBuf), SyncError>
    where
        F: Fn(&Item) -> Vec<LockKey>,
    {
        loop {
            let item = self.recycled(id).await?;
            let deleted_path = item
                .deleted_path()
                .map(Path::to_path_buf)
                .ok_or(SyncError::NotInRecycleBin(id))?;
            let mut keys = vec![LockKey::exclusive(
                LockScope::Recycle,
                self.resolver.recycle_key(&deleted_path)?,
            )];
            keys.extend(extra(&item));
            let guard = self.lock(keys).await;

            let fresh = self.recycled(id).await?;
            if fresh.deleted_path() == Some(deleted_path.as_path()) {
                return Ok((guard, fresh, deleted_path));
            }
            debug!(item_id = %id, "record moved while waiting for lock, retrying");
        }
    }

    async fn recycled(&self, id: ItemId) -> Result<Item, SyncError> {
        let item = self
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("item {id}")))?;
        if !item.is_deleted() {
            return Err(SyncError::NotInRecycleBin(id));
        }
        Ok(item)
    }

    /// Occupied on disk or by a live record
    async fn occupied(&self, path: &CanonicalPath) -> Result<bool, SyncError> {
        if self.mover.stat(&self.resolver.absolute(path)).await?.exists {
            return Ok(true);
        }
        Ok(self.store.get(path).await?.is_some())
    }

    /// `Conflict` for `target`, carrying the first free sibling name
    async fn conflict(&self, target: &CanonicalPath, kind: NameKind) -> SyncError {
        match self.suggest_name(target, kind).await {
            Ok(suggested) => SyncError::Conflict {
                path: target.to_string(),
                suggested_name: Some(suggested),
            },
            Err(e) => e,
        }
    }

    async fn suggest_name(
        &self,
        target: &CanonicalPath,
        kind: NameKind,
    ) -> Result<String, SyncError> {
        let name = target.name();
        // Occupancy checks are async, so walk the search order up to the
        // first free name and hand the namer the set found taken.
        let mut taken = HashSet::new();
        for candidate in std::iter::once(name.to_string()).chain(self.namer.candidates(name, kind)) {
            if !self.occupied(&target.with_name(&candidate)?).await? {
                break;
            }
            taken.insert(candidate);
        }
        let suggested = self
            .namer
            .unique_name(name, kind, |candidate| taken.contains(candidate))?;
        debug!(original = name, suggested = %suggested, "suggesting free name");
        Ok(suggested)
    }

    /// Size deltas for every live directory record above `path`
    async fn ancestor_adjustments(
        &self,
        path: &CanonicalPath,
        delta: i64,
    ) -> Result<Vec<Mutation>, SyncError> {
        if delta == 0 {
            return Ok(Vec::new());
        }
        let mut mutations = Vec::new();
        for ancestor in path.ancestors() {
            if let Some(item) = self.store.get(&ancestor).await? {
                if item.is_folder() {
                    mutations.push(Mutation::AdjustSize {
                        id: item.id(),
                        delta,
                    });
                }
            }
        }
        Ok(mutations)
    }

    /// Commit an insert together with `extra` mutations
    async fn insert_one(
        &self,
        new_item: NewItem,
        extra: Vec<Mutation>,
    ) -> Result<Item, SyncError> {
        let mut mutations = vec![Mutation::Insert(new_item)];
        mutations.extend(extra);
        self.store
            .commit(mutations)
            .await?
            .inserted
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::Internal("commit returned no inserted record".to_string()))
    }
}

fn managed(path: &CanonicalPath) -> LockKey {
    LockKey::exclusive(LockScope::Managed, path.clone())
}
