//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{DecalError, Result};
use crate::interaction::{EditorSession, SaveOutcome};
use crate::overlay::ImageFile;
use crate::repository::{
    ConflictDecision, DirectoryModelProvider, ExportDocument, ModelCatalog, ModelRef,
    ModelRepository,
};
use crate::store::FileStore;

/// Open the file store and base model directory named by `settings`.
pub async fn open_repository(settings: &Settings) -> Result<ModelRepository> {
    let store = FileStore::open(&settings.store_dir, settings.quota_bytes).await?;
    let repo = ModelRepository::new(Arc::new(store));

    if settings.base_models_dir.is_dir() {
        let provider = DirectoryModelProvider::new(&settings.base_models_dir);
        Ok(repo.with_provider(Arc::new(provider)))
    } else {
        debug!(
            dir = %settings.base_models_dir.display(),
            "no base model directory, base textures fall back to a flat color"
        );
        Ok(repo)
    }
}

/// List base models and custom models.
pub async fn list(settings: &Settings) -> Result<()> {
    let repo = open_repository(settings).await?;

    let refs = match repo.provider() {
        Some(provider) => {
            ModelCatalog::new(Arc::clone(provider), repo.clone(), &settings.base_models_dir)
                .list()
                .await?
        }
        None => repo
            .list_names()
            .await?
            .into_iter()
            .map(|name| ModelRef::Custom { name })
            .collect(),
    };

    if refs.is_empty() {
        println!("No models.");
        return Ok(());
    }

    for model in refs {
        match &model {
            ModelRef::Registry { model_id } => println!("  base    {}", model_id),
            ModelRef::Uploaded { file_name } => println!("  upload  {}", file_name),
            ModelRef::Custom { name } => {
                let based_on = repo.based_on(name).await.unwrap_or_else(|_| "?".to_string());
                println!("  custom  {} (based on {})", name, based_on);
            }
        }
    }
    Ok(())
}

/// Print the stored metadata of a custom model.
pub async fn show(settings: &Settings, name: &str) -> Result<()> {
    let repo = open_repository(settings).await?;
    let document =
        repo.read_document(name)
            .await?
            .ok_or_else(|| DecalError::RecordNotFound {
                name: name.to_string(),
            })?;

    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

/// Create (or overwrite with `force`) a custom model from overlay files.
pub async fn create(
    settings: &Settings,
    name: &str,
    based_on: &str,
    overlays: &[PathBuf],
    material_preset: &str,
    force: bool,
) -> Result<()> {
    info!("Creating custom model {} based on {}", name, based_on);
    let repo = open_repository(settings).await?;

    let base = match repo.provider() {
        Some(provider) => Some(provider.resolve_base_raster(based_on).await?),
        None => None,
    };
    let mut session = EditorSession::new(based_on, base, settings.session_options());
    session.set_material(material_preset, serde_json::json!({}));

    for path in overlays {
        let file = ImageFile::read(path).await?;
        session.add_overlay(file).await?;
        println!("Added overlay: {}", path.display());
    }

    let outcome = session
        .save_as(
            &repo,
            |_| Some(name.to_string()),
            |_| {
                if force {
                    ConflictDecision::Overwrite
                } else {
                    ConflictDecision::Skip
                }
            },
        )
        .await?;

    match outcome {
        SaveOutcome::Saved { name } => println!("Saved custom model: {}", name),
        SaveOutcome::Kept { name } => {
            println!("Custom model {} already exists. Use --force to overwrite.", name)
        }
        SaveOutcome::Cancelled => println!("Save cancelled."),
    }
    Ok(())
}

/// Render a custom model's composite to a PNG file.
pub async fn render(settings: &Settings, name: &str, output: &Path, size: Option<u32>) -> Result<()> {
    info!("Rendering {} to {}", name, output.display());
    let mut settings = settings.clone();
    if let Some(size) = size {
        settings.output_size = size;
    }
    settings.validate()?;

    let repo = open_repository(&settings).await?;
    let mut session = EditorSession::open(&repo, name, settings.session_options()).await?;
    let raster = session.render().await?;
    tokio::fs::write(output, raster.encode_png()?).await?;

    println!(
        "Rendered {} ({}x{}) to {}",
        name,
        raster.width(),
        raster.height(),
        output.display()
    );
    Ok(())
}

/// Write one or all custom models to an export file.
pub async fn export(settings: &Settings, output: &Path, name: Option<&str>) -> Result<()> {
    let repo = open_repository(settings).await?;
    let document = match name {
        Some(name) => repo.export_record(name).await?,
        None => repo.export_all().await?,
    };
    tokio::fs::write(output, document.to_json_pretty()?).await?;

    println!(
        "Exported {} custom model(s) to {}",
        document.models.len(),
        output.display()
    );
    Ok(())
}

/// Import custom models from an export file.
pub async fn import(settings: &Settings, path: &Path, overwrite: bool) -> Result<()> {
    let repo = open_repository(settings).await?;
    let raw = tokio::fs::read_to_string(path).await?;
    let document = ExportDocument::from_json(&raw)?;

    let summary = repo
        .import_records(&document, |name| {
            if overwrite {
                ConflictDecision::Overwrite
            } else {
                warn!("{} already exists, skipping", name);
                ConflictDecision::Skip
            }
        })
        .await?;

    println!(
        "Imported: {} | Skipped: {} | Failed: {}",
        summary.imported,
        summary.skipped,
        summary.failed_count()
    );
    for failure in &summary.failed {
        println!("  {}: {}", failure.name, failure.reason);
    }
    Ok(())
}

/// Delete one custom model.
pub async fn delete(settings: &Settings, name: &str) -> Result<()> {
    let repo = open_repository(settings).await?;
    repo.delete(name).await?;
    println!("Deleted custom model: {}", name);
    Ok(())
}

/// Delete every custom model.
pub async fn clear(settings: &Settings, yes: bool) -> Result<()> {
    if !yes {
        println!("This deletes every custom model. Re-run with --yes to confirm.");
        return Ok(());
    }

    let repo = open_repository(settings).await?;
    let summary = repo.clear_all().await?;
    println!("Deleted {} custom model(s).", summary.deleted);
    for (name, reason) in &summary.failed {
        println!("  failed {}: {}", name, reason);
    }
    Ok(())
}
