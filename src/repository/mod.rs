//! Model Repository
//!
//! Saves, loads, deletes, exports and imports named custom model records on
//! top of a [`PersistenceStore`]:
//!
//! - `records/<name>`: a [`RecordDocument`] with transforms and blob keys
//! - `blobs/overlay:<name>:<index>`: the encoded image bytes of one overlay
//!
//! A save writes every blob first and the metadata document last. If any
//! write fails, blobs already written are rolled back so the previous record
//! for the name stays loadable and unchanged.
//!
//! The repository does no locking of its own: two concurrent saves of the
//! same name resolve as last-writer-wins.

pub mod exchange;
pub mod migration;
pub mod provider;
pub mod record;

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::{DecalError, Result};
use crate::overlay::{restore_image, ImageFormat, OverlayImage, OverlayLayer, Position, Size};
use crate::store::{Namespace, PersistenceStore, StoreError};

pub use exchange::{
    decode_data_url, encode_data_url, ConflictDecision, ExportDocument, ExportedModel,
    ExportedOverlay, ImportFailure, ImportSummary, EXPORT_FORMAT_VERSION,
};
pub use migration::{migrate_record, CURRENT_SCHEMA_VERSION};
pub use provider::{
    BaseModelProvider, DirectoryModelProvider, ModelCatalog, ModelRef, StaticModelProvider,
};
pub use record::{blob_checksum, blob_index, blob_key, CustomModelRecord, OverlayMetadata, RecordDocument};

/// Outcome of [`ModelRepository::clear_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearSummary {
    pub deleted: usize,
    /// `(name, reason)` for every record that could not be deleted.
    pub failed: Vec<(String, String)>,
}

/// Longest accepted model name, in UTF-8 bytes. Keeps every derived blob
/// key within [`crate::store::MAX_KEY_BYTES`].
pub const MAX_NAME_BYTES: usize = 100;

/// Reject names that cannot key a record.
pub fn validate_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_NAME_BYTES {
        return Err(DecalError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(trimmed)
}

/// Named custom model records over a persistence store.
#[derive(Clone)]
pub struct ModelRepository {
    store: Arc<dyn PersistenceStore>,
    provider: Option<Arc<dyn BaseModelProvider>>,
}

impl ModelRepository {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self {
            store,
            provider: None,
        }
    }

    /// Check base models against `provider` on load and import.
    pub fn with_provider(mut self, provider: Arc<dyn BaseModelProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn store(&self) -> &Arc<dyn PersistenceStore> {
        &self.store
    }

    pub fn provider(&self) -> Option<&Arc<dyn BaseModelProvider>> {
        self.provider.as_ref()
    }

    /// All record names in ascending order.
    pub async fn list_names(&self) -> Result<Vec<String>> {
        Ok(self.store.list_keys(Namespace::Records).await?)
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        match self.store.get(Namespace::Records, name).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Stored metadata of a record, migrated to the current schema.
    /// `Ok(None)` when no record has this name.
    pub async fn read_document(&self, name: &str) -> Result<Option<RecordDocument>> {
        let raw = match self.store.get_record(name).await {
            Ok(raw) => raw,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let migrated = migrate_record(name, raw)?;
        Ok(Some(serde_json::from_value(migrated)?))
    }

    /// Base model id of a saved record, without touching its blobs.
    pub async fn based_on(&self, name: &str) -> Result<String> {
        self.read_document(name)
            .await?
            .map(|doc| doc.based_on)
            .ok_or_else(|| DecalError::RecordNotFound {
                name: name.to_string(),
            })
    }

    /// Save `record` under `name`, replacing any previous record.
    ///
    /// All-or-nothing: on failure the previous record for `name` (or its
    /// absence) is left in place.
    pub async fn save(&self, name: &str, record: &CustomModelRecord) -> Result<()> {
        let name = validate_name(name)?;

        let prior = match self.read_document(name).await {
            Ok(doc) => doc,
            Err(err) => {
                warn!(name, error = %err, "previous record is unreadable, overwriting");
                None
            }
        };

        let keys: Vec<String> = (0..record.overlays.len())
            .map(|i| blob_key(name, i))
            .collect();
        let snapshots = self.snapshot_blobs(&keys).await?;

        let writes = record
            .overlays
            .iter()
            .zip(&keys)
            .map(|(layer, key)| self.store.put_blob(key, layer.image.bytes().to_vec()));
        let results = join_all(writes).await;

        let mut written = Vec::new();
        let mut failures = Vec::new();
        for ((key, layer), result) in keys.iter().zip(&record.overlays).zip(results) {
            match result {
                Ok(()) => written.push((key.clone(), layer.image.bytes().len())),
                Err(err) => failures.push(err),
            }
        }
        if !failures.is_empty() {
            self.rollback(written, &keys, snapshots).await;
            return Err(first_failure(failures).into());
        }

        let now = chrono::Utc::now();
        let document = RecordDocument {
            schema_version: CURRENT_SCHEMA_VERSION,
            custom_name: name.to_string(),
            based_on: record.based_on.clone(),
            material_preset: record.material_preset.clone(),
            material_properties: record.material_properties.clone(),
            overlay_keys: keys.clone(),
            overlays: record.overlays.iter().map(OverlayMetadata::from_layer).collect(),
            created_at: prior.as_ref().map_or(record.created_at, |doc| doc.created_at),
            modified_at: now,
        };
        let value = serde_json::to_value(&document)?;
        if let Err(err) = self.store.put_record(name, value).await {
            let written = keys
                .iter()
                .zip(&record.overlays)
                .map(|(key, layer)| (key.clone(), layer.image.bytes().len()))
                .collect();
            self.rollback(written, &keys, snapshots).await;
            return Err(err.into());
        }

        if let Some(prior) = prior {
            let current: HashSet<&String> = keys.iter().collect();
            for stale in prior.overlay_keys.iter().filter(|k| !current.contains(k)) {
                self.delete_blob_quietly(stale).await;
            }
        }

        info!(name, overlays = keys.len(), "saved custom model");
        Ok(())
    }

    /// Prior bytes of every key a save is about to overwrite.
    async fn snapshot_blobs(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let reads = keys.iter().map(|key| self.store.get_blob(key));
        let mut snapshots = Vec::with_capacity(keys.len());
        for result in join_all(reads).await {
            match result {
                Ok(bytes) => snapshots.push(Some(bytes)),
                Err(err) if err.is_not_found() => snapshots.push(None),
                Err(err) => return Err(err.into()),
            }
        }
        Ok(snapshots)
    }

    /// Undo the blob writes of a failed save.
    ///
    /// Deletes run first, then restores ordered by how much each one frees,
    /// so usage never climbs above what it was before the save.
    async fn rollback(
        &self,
        written: Vec<(String, usize)>,
        keys: &[String],
        snapshots: Vec<Option<Vec<u8>>>,
    ) {
        let mut deletes = Vec::new();
        let mut restores = Vec::new();
        for (key, written_len) in written {
            let prior = keys
                .iter()
                .position(|k| *k == key)
                .and_then(|i| snapshots.get(i).cloned().flatten());
            match prior {
                Some(bytes) => {
                    let growth = bytes.len() as i64 - written_len as i64;
                    restores.push((growth, key, bytes));
                }
                None => deletes.push(key),
            }
        }

        for key in deletes {
            self.delete_blob_quietly(&key).await;
        }
        restores.sort_by_key(|(growth, _, _)| *growth);
        for (_, key, bytes) in restores {
            if let Err(err) = self.store.put_blob(&key, bytes).await {
                warn!(key = %key, error = %err, "failed to restore blob during rollback");
            }
        }
        debug!("rolled back failed save");
    }

    async fn delete_blob_quietly(&self, key: &str) {
        match self.store.delete(Namespace::Blobs, key).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => warn!(key, error = %err, "failed to delete blob"),
        }
    }

    /// Load a record and decode its overlays.
    ///
    /// Overlays whose blob is missing, fails its checksum or fails to
    /// decode are skipped with a warning. A missing base model fails the
    /// whole load.
    pub async fn load(&self, name: &str) -> Result<CustomModelRecord> {
        let document =
            self.read_document(name)
                .await?
                .ok_or_else(|| DecalError::RecordNotFound {
                    name: name.to_string(),
                })?;

        if let Some(provider) = &self.provider {
            if !provider.base_model_exists(&document.based_on).await {
                return Err(DecalError::BaseModelNotFound {
                    model_id: document.based_on,
                });
            }
        }

        if document.overlay_keys.len() != document.overlays.len() {
            warn!(
                name,
                keys = document.overlay_keys.len(),
                overlays = document.overlays.len(),
                "overlay keys and metadata disagree, loading the common prefix"
            );
        }

        let restores = document
            .overlay_keys
            .iter()
            .zip(&document.overlays)
            .map(|(key, meta)| self.restore_overlay(key, meta));
        let mut overlays = Vec::with_capacity(document.overlays.len());
        for result in join_all(restores).await {
            if let Some(layer) = result? {
                overlays.push(layer);
            }
        }

        info!(
            name,
            overlays = overlays.len(),
            stored = document.overlays.len(),
            "loaded custom model"
        );
        Ok(CustomModelRecord {
            custom_name: document.custom_name,
            based_on: document.based_on,
            material_preset: document.material_preset,
            material_properties: document.material_properties,
            overlays,
            schema_version: CURRENT_SCHEMA_VERSION,
            created_at: document.created_at,
            modified_at: document.modified_at,
        })
    }

    /// Raw blob bytes of one overlay, if they are present and intact.
    async fn read_overlay_blob(
        &self,
        key: &str,
        meta: &OverlayMetadata,
    ) -> Result<Option<(ImageFormat, Vec<u8>)>> {
        let bytes = match self.store.get_blob(key).await {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => {
                warn!(key, overlay = %meta.name, "overlay blob is missing, skipping");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(expected) = &meta.sha256 {
            if blob_checksum(&bytes) != *expected {
                warn!(key, overlay = %meta.name, "overlay blob checksum mismatch, skipping");
                return Ok(None);
            }
        }

        match ImageFormat::from_mime(&meta.mime_type) {
            Some(format) => Ok(Some((format, bytes))),
            None => {
                warn!(key, mime = %meta.mime_type, "unsupported overlay image type, skipping");
                Ok(None)
            }
        }
    }

    async fn restore_overlay(
        &self,
        key: &str,
        meta: &OverlayMetadata,
    ) -> Result<Option<OverlayLayer>> {
        let Some((format, bytes)) = self.read_overlay_blob(key, meta).await? else {
            return Ok(None);
        };
        let (image, err) = restore_image(&meta.name, format, bytes).await;
        if let Some(err) = err {
            warn!(key, overlay = %meta.name, error = %err, "overlay failed to decode, skipping");
            return Ok(None);
        }
        Ok(Some(layer_from_parts(
            &meta.name,
            image,
            meta.position,
            meta.size,
            meta.rotation,
            meta.aspect_ratio,
        )))
    }

    /// Delete a record and every blob it references. Blobs go first.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let keys = match self.read_document(name).await {
            Ok(Some(document)) => document.overlay_keys,
            Ok(None) => {
                return Err(DecalError::RecordNotFound {
                    name: name.to_string(),
                })
            }
            Err(err) => {
                warn!(name, error = %err, "record is unreadable, deleting blobs by key prefix");
                self.blob_keys_of(name).await?
            }
        };

        for key in &keys {
            match self.store.delete(Namespace::Blobs, key).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    debug!(key = %key, "blob already gone");
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.store.delete(Namespace::Records, name).await?;

        info!(name, blobs = keys.len(), "deleted custom model");
        Ok(())
    }

    /// Every blob key whose prefix belongs to `name`.
    async fn blob_keys_of(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_keys(Namespace::Blobs)
            .await?
            .into_iter()
            .filter(|key| blob_index(name, key).is_some())
            .collect())
    }

    /// Delete every record through [`Self::delete`]. Per-record failures
    /// are collected, never raised.
    pub async fn clear_all(&self) -> Result<ClearSummary> {
        let mut summary = ClearSummary::default();
        for name in self.list_names().await? {
            match self.delete(&name).await {
                Ok(()) => summary.deleted += 1,
                Err(err) => {
                    warn!(name = %name, error = %err, "failed to delete during clear");
                    summary.failed.push((name, err.to_string()));
                }
            }
        }
        info!(deleted = summary.deleted, failed = summary.failed.len(), "cleared custom models");
        Ok(summary)
    }

    /// One record as a standalone export document.
    pub async fn export_record(&self, name: &str) -> Result<ExportDocument> {
        let model = self.export_model(name).await?;
        let mut document = ExportDocument::new();
        document.models.insert(name.to_string(), model);
        Ok(document)
    }

    /// Every readable record. Unreadable records are skipped with a warning.
    pub async fn export_all(&self) -> Result<ExportDocument> {
        let mut document = ExportDocument::new();
        for name in self.list_names().await? {
            match self.export_model(&name).await {
                Ok(model) => {
                    document.models.insert(name, model);
                }
                Err(err) => warn!(name = %name, error = %err, "skipping record in export"),
            }
        }
        info!(models = document.models.len(), "exported custom models");
        Ok(document)
    }

    async fn export_model(&self, name: &str) -> Result<ExportedModel> {
        let document =
            self.read_document(name)
                .await?
                .ok_or_else(|| DecalError::RecordNotFound {
                    name: name.to_string(),
                })?;

        let reads = document
            .overlay_keys
            .iter()
            .zip(&document.overlays)
            .map(|(key, meta)| self.read_overlay_blob(key, meta));
        let mut overlay_images = Vec::with_capacity(document.overlays.len());
        for (meta, result) in document.overlays.iter().zip(join_all(reads).await) {
            if let Some((format, bytes)) = result? {
                overlay_images.push(ExportedOverlay {
                    name: meta.name.clone(),
                    position: meta.position,
                    size: meta.size,
                    rotation: meta.rotation,
                    aspect_ratio: meta.aspect_ratio,
                    image_data: encode_data_url(format, &bytes),
                });
            }
        }

        Ok(ExportedModel {
            based_on: document.based_on,
            material_preset: document.material_preset,
            material_properties: document.material_properties,
            overlay_images,
        })
    }

    /// Import every model of an export document.
    ///
    /// `conflict_policy` decides what happens to names that already exist.
    /// Per-model failures land in the summary; only a document-level
    /// problem is returned as an error.
    pub async fn import_records(
        &self,
        document: &ExportDocument,
        conflict_policy: impl Fn(&str) -> ConflictDecision,
    ) -> Result<ImportSummary> {
        if document.version == 0 || document.version > EXPORT_FORMAT_VERSION {
            return Err(DecalError::InvalidExport {
                reason: format!("unsupported export version {}", document.version),
            });
        }

        let mut summary = ImportSummary::default();
        for (name, model) in &document.models {
            match self.import_model(name, model, &conflict_policy).await {
                Ok(true) => summary.imported += 1,
                Ok(false) => summary.skipped += 1,
                Err(err) => {
                    warn!(name = %name, error = %err, "failed to import custom model");
                    summary.failed.push(ImportFailure {
                        name: name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            imported = summary.imported,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            "import finished"
        );
        Ok(summary)
    }

    /// `Ok(false)` when the policy skipped an existing name.
    async fn import_model(
        &self,
        name: &str,
        model: &ExportedModel,
        conflict_policy: &impl Fn(&str) -> ConflictDecision,
    ) -> Result<bool> {
        let name = validate_name(name)?;

        if let Some(provider) = &self.provider {
            if !provider.base_model_exists(&model.based_on).await {
                return Err(DecalError::BaseModelNotFound {
                    model_id: model.based_on.clone(),
                });
            }
        }

        let overlays = join_all(model.overlay_images.iter().map(decode_exported_overlay))
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        if self.exists(name).await? && conflict_policy(name) == ConflictDecision::Skip {
            debug!(name, "keeping existing record");
            return Ok(false);
        }

        let record = CustomModelRecord::new(name, model.based_on.clone())
            .with_material(model.material_preset.clone(), model.material_properties.clone())
            .with_overlays(overlays);
        self.save(name, &record).await?;
        Ok(true)
    }
}

async fn decode_exported_overlay(overlay: &ExportedOverlay) -> Result<OverlayLayer> {
    let (format, bytes) = decode_data_url(&overlay.image_data)?;
    let (image, err) = restore_image(&overlay.name, format, bytes).await;
    if let Some(err) = err {
        return Err(err);
    }
    Ok(layer_from_parts(
        &overlay.name,
        image,
        overlay.position,
        overlay.size,
        overlay.rotation,
        overlay.aspect_ratio,
    ))
}

/// Rebuild a layer from stored transform values, clamped into range.
fn layer_from_parts(
    name: &str,
    image: OverlayImage,
    position: Position,
    size: Size,
    rotation: f64,
    aspect_ratio: f64,
) -> OverlayLayer {
    let mut layer = OverlayLayer::new(name, image, size.w);
    layer.set_position(position.x, position.y);
    layer.set_size(size.w, size.h);
    layer.set_rotation(rotation);
    if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
        layer.aspect_ratio = aspect_ratio;
    }
    layer
}

/// The error a failed batch reports: quota problems win over the rest.
fn first_failure(failures: Vec<StoreError>) -> StoreError {
    let mut failures = failures.into_iter();
    let mut chosen: Option<StoreError> = None;
    for err in failures.by_ref() {
        if err.is_quota_exceeded() {
            return err;
        }
        chosen.get_or_insert(err);
    }
    chosen.unwrap_or_else(|| StoreError::storage(Namespace::Blobs, "*", "unknown write failure"))
}
