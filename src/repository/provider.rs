//! Base model providers and the model catalog
//!
//! The repository never owns base textures. It asks a [`BaseModelProvider`]
//! whether a base model exists and for its raster.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{DecalError, Result};
use crate::overlay::{decode_image, ImageFile, ImageFormat};
use crate::render::{Raster, DEFAULT_MAX_IMAGE_PIXELS};

use super::ModelRepository;

/// External registry of base models.
#[async_trait]
pub trait BaseModelProvider: Send + Sync {
    /// Base texture of a model. `BaseModelNotFound` when unknown.
    async fn resolve_base_raster(&self, model_id: &str) -> Result<Raster>;

    async fn base_model_exists(&self, model_id: &str) -> bool;

    /// Known model ids, sorted.
    async fn list_base_models(&self) -> Result<Vec<String>>;
}

/// Fixed in-memory set of base models.
#[derive(Debug, Clone, Default)]
pub struct StaticModelProvider {
    models: HashMap<String, Raster>,
}

impl StaticModelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model_id: impl Into<String>, raster: Raster) -> Self {
        self.models.insert(model_id.into(), raster);
        self
    }
}

#[async_trait]
impl BaseModelProvider for StaticModelProvider {
    async fn resolve_base_raster(&self, model_id: &str) -> Result<Raster> {
        self.models
            .get(model_id)
            .cloned()
            .ok_or_else(|| DecalError::BaseModelNotFound {
                model_id: model_id.to_string(),
            })
    }

    async fn base_model_exists(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    async fn list_base_models(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.models.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Base textures stored as `<root>/<model_id>.<ext>` image files.
#[derive(Debug, Clone)]
pub struct DirectoryModelProvider {
    root: PathBuf,
}

impl DirectoryModelProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every `(model_id, path)` pair with a supported image extension.
    async fn entries(&self) -> Result<Vec<(String, PathBuf)>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            if !root.is_dir() {
                return Vec::new();
            }
            let mut entries: Vec<(String, PathBuf)> = WalkDir::new(&root)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| {
                    let path = e.path();
                    let file_name = path.file_name()?.to_str()?;
                    ImageFormat::from_file_name(file_name)?;
                    let stem = path.file_stem()?.to_str()?.to_string();
                    Some((stem, path.to_path_buf()))
                })
                .collect();
            entries.sort();
            entries
        })
        .await
        .map_err(|e| DecalError::Internal(format!("model scan failed: {}", e)))
    }

    async fn find(&self, model_id: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .find(|(id, _)| id == model_id)
            .map(|(_, path)| path))
    }
}

#[async_trait]
impl BaseModelProvider for DirectoryModelProvider {
    async fn resolve_base_raster(&self, model_id: &str) -> Result<Raster> {
        let path = self
            .find(model_id)
            .await?
            .ok_or_else(|| DecalError::BaseModelNotFound {
                model_id: model_id.to_string(),
            })?;
        debug!(model_id, path = %path.display(), "resolving base texture");
        decode_file(&path).await
    }

    async fn base_model_exists(&self, model_id: &str) -> bool {
        matches!(self.find(model_id).await, Ok(Some(_)))
    }

    async fn list_base_models(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.entries().await?.into_iter().map(|(id, _)| id).collect();
        ids.dedup();
        Ok(ids)
    }
}

async fn decode_file(path: &Path) -> Result<Raster> {
    let file = ImageFile::read(path).await?;
    let format =
        ImageFormat::from_file_name(&file.name).ok_or_else(|| DecalError::UnsupportedFileType {
            file_name: file.name.clone(),
        })?;
    decode_image(&file.name, format, Arc::new(file.bytes), DEFAULT_MAX_IMAGE_PIXELS).await
}

/// Anything a user can pick as the starting point of an edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelRef {
    /// A model from the base-model registry.
    Registry { model_id: String },
    /// A texture file the user picked from disk.
    Uploaded { file_name: String },
    /// A saved custom model.
    Custom { name: String },
}

impl ModelRef {
    pub fn label(&self) -> &str {
        match self {
            ModelRef::Registry { model_id } => model_id,
            ModelRef::Uploaded { file_name } => file_name,
            ModelRef::Custom { name } => name,
        }
    }
}

/// Merged view over the registry, uploads and saved custom models.
pub struct ModelCatalog {
    provider: Arc<dyn BaseModelProvider>,
    repository: ModelRepository,
    upload_dir: PathBuf,
}

impl ModelCatalog {
    pub fn new(
        provider: Arc<dyn BaseModelProvider>,
        repository: ModelRepository,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provider,
            repository,
            upload_dir: upload_dir.into(),
        }
    }

    /// Registry models first, then custom models, each sorted by name.
    pub async fn list(&self) -> Result<Vec<ModelRef>> {
        let mut refs: Vec<ModelRef> = self
            .provider
            .list_base_models()
            .await?
            .into_iter()
            .map(|model_id| ModelRef::Registry { model_id })
            .collect();
        refs.extend(
            self.repository
                .list_names()
                .await?
                .into_iter()
                .map(|name| ModelRef::Custom { name }),
        );
        Ok(refs)
    }

    /// Base texture behind any model reference.
    ///
    /// A custom model resolves to the raster of the model it is based on.
    pub async fn resolve_base_raster(&self, model: &ModelRef) -> Result<Raster> {
        match model {
            ModelRef::Registry { model_id } => self.provider.resolve_base_raster(model_id).await,
            ModelRef::Uploaded { file_name } => {
                decode_file(&self.upload_dir.join(file_name)).await
            }
            ModelRef::Custom { name } => {
                let based_on = self.repository.based_on(name).await?;
                self.provider.resolve_base_raster(&based_on).await
            }
        }
    }

    /// Registry id a new custom model built from `model` should record.
    pub async fn based_on(&self, model: &ModelRef) -> Result<String> {
        match model {
            ModelRef::Registry { model_id } => Ok(model_id.clone()),
            ModelRef::Uploaded { file_name } => Ok(file_name.clone()),
            ModelRef::Custom { name } => self.repository.based_on(name).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_utils::png_bytes;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticModelProvider::new()
            .with_model("van", Raster::solid(2, 2, [0, 0, 255, 255]).unwrap())
            .with_model("car", Raster::solid(2, 2, [255, 0, 0, 255]).unwrap());

        assert!(provider.base_model_exists("car").await);
        assert!(!provider.base_model_exists("boat").await);
        assert_eq!(provider.list_base_models().await.unwrap(), vec!["car", "van"]);

        let err = provider.resolve_base_raster("boat").await.unwrap_err();
        assert_eq!(err.error_code(), "BASE_MODEL_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_directory_provider_reads_images() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("car.png"), png_bytes(4, 2, [255, 0, 0, 255])).unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"not a model").unwrap();

        let provider = DirectoryModelProvider::new(dir.path());
        assert_eq!(provider.list_base_models().await.unwrap(), vec!["car"]);
        assert!(provider.base_model_exists("car").await);
        assert!(!provider.base_model_exists("readme").await);

        let raster = provider.resolve_base_raster("car").await.unwrap();
        assert_eq!((raster.width(), raster.height()), (4, 2));
    }

    #[tokio::test]
    async fn test_oversized_svg_base_texture_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("huge.svg"),
            br#"<svg xmlns="http://www.w3.org/2000/svg" width="200000" height="200000"><rect width="1" height="1"/></svg>"#,
        )
        .unwrap();

        let provider = DirectoryModelProvider::new(dir.path());
        let err = provider.resolve_base_raster("huge").await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION");
    }

    #[tokio::test]
    async fn test_missing_directory_lists_nothing() {
        let provider = DirectoryModelProvider::new("/definitely/not/here");
        assert!(provider.list_base_models().await.unwrap().is_empty());
    }

    #[test]
    fn test_model_ref_is_tagged() {
        let json = serde_json::to_value(ModelRef::Custom {
            name: "red car".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "custom");
        assert_eq!(json["name"], "red car");
    }

    #[tokio::test]
    async fn test_catalog_lists_and_resolves() {
        let provider: Arc<dyn BaseModelProvider> = Arc::new(
            StaticModelProvider::new().with_model("car", Raster::solid(2, 2, [9, 9, 9, 255]).unwrap()),
        );
        let repository =
            ModelRepository::new(Arc::new(MemoryStore::new())).with_provider(Arc::clone(&provider));
        repository
            .save(
                "red car",
                &crate::repository::CustomModelRecord::new("red car", "car"),
            )
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mine.png"), png_bytes(3, 3, [0, 0, 0, 255])).unwrap();
        let catalog = ModelCatalog::new(provider, repository, dir.path());

        let refs = catalog.list().await.unwrap();
        assert_eq!(
            refs,
            vec![
                ModelRef::Registry {
                    model_id: "car".to_string()
                },
                ModelRef::Custom {
                    name: "red car".to_string()
                },
            ]
        );

        let custom = ModelRef::Custom {
            name: "red car".to_string(),
        };
        let raster = catalog.resolve_base_raster(&custom).await.unwrap();
        assert_eq!(raster.pixel(0, 0), Some([9, 9, 9, 255]));
        assert_eq!(catalog.based_on(&custom).await.unwrap(), "car");

        let uploaded = ModelRef::Uploaded {
            file_name: "mine.png".to_string(),
        };
        assert_eq!(catalog.resolve_base_raster(&uploaded).await.unwrap().width(), 3);
    }
}
