//! Repository Integration Tests
//!
//! End-to-end save/load/export/import against the directory-backed store.

use std::sync::Arc;

use approx::assert_relative_eq;
use image::{ImageEncoder, Rgba, RgbaImage};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use decalkit::overlay::{import_image, ImageFile, ImportLimits, OverlayLayer};
use decalkit::repository::{
    ConflictDecision, CustomModelRecord, DirectoryModelProvider, ExportDocument, ModelRepository,
};
use decalkit::store::{FileStore, Namespace, PersistenceStore};
use decalkit::DecalError;

/// Helper to encode a solid-color PNG
fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(rgba));
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .unwrap();
    out
}

async fn overlay(name: &str, rgba: [u8; 4], x: f64, y: f64, rotation: f64) -> OverlayLayer {
    let image = import_image(ImageFile::new(name, png(16, 8, rgba)), &ImportLimits::default())
        .await
        .unwrap();
    let mut layer = OverlayLayer::new(name, image, 30.0);
    layer.set_position(x, y);
    layer.set_rotation(rotation);
    layer
}

async fn file_repo(dir: &TempDir, quota: Option<u64>) -> (Arc<FileStore>, ModelRepository) {
    let store = Arc::new(FileStore::open(dir.path().join("store"), quota).await.unwrap());
    (Arc::clone(&store), ModelRepository::new(store))
}

async fn sample_record() -> CustomModelRecord {
    CustomModelRecord::new("red car", "car")
        .with_material("glossy", serde_json::json!({"clearcoat": 1.0}))
        .with_overlays(vec![
            overlay("flame.png", [255, 80, 0, 255], 20.0, 40.0, 0.0).await,
            overlay("stripe.png", [255, 255, 255, 255], 50.0, 50.0, 45.0).await,
            overlay("number.png", [0, 0, 0, 255], 80.0, 60.0, 350.0).await,
        ])
}

// === Round Trip ===

#[tokio::test]
async fn test_round_trip_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let record = sample_record().await;
    {
        let (store, repo) = file_repo(&dir, None).await;
        repo.save("red car", &record).await.unwrap();
        store.close().await;
    }

    let (_, repo) = file_repo(&dir, None).await;
    let loaded = repo.load("red car").await.unwrap();

    assert_eq!(loaded.overlays.len(), 3);
    assert_eq!(loaded.material_preset, "glossy");
    for (before, after) in record.overlays.iter().zip(&loaded.overlays) {
        assert_eq!(before.display_name, after.display_name);
        assert_relative_eq!(before.position.x, after.position.x, epsilon = 1e-9);
        assert_relative_eq!(before.position.y, after.position.y, epsilon = 1e-9);
        assert_relative_eq!(before.size.w, after.size.w, epsilon = 1e-9);
        assert_relative_eq!(before.size.h, after.size.h, epsilon = 1e-9);
        assert_relative_eq!(before.rotation_degrees, after.rotation_degrees, epsilon = 1e-9);
    }
}

#[tokio::test]
async fn test_closed_store_rejects_save() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = file_repo(&dir, None).await;
    store.close().await;

    let err = repo.save("red car", &sample_record().await).await.unwrap_err();
    assert_eq!(err.error_code(), "STORAGE_ERROR");
}

#[tokio::test]
async fn test_longest_valid_name_saves_overlays_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let (_, repo) = file_repo(&dir, None).await;
    let name = "车".repeat(33);
    assert_eq!(name.len(), decalkit::repository::MAX_NAME_BYTES - 1);

    repo.save(&name, &sample_record().await).await.unwrap();
    assert_eq!(repo.load(&name).await.unwrap().overlays.len(), 3);
}

#[tokio::test]
async fn test_over_long_name_is_rejected_whatever_the_overlay_count() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = file_repo(&dir, None).await;
    let name = "n".repeat(120);

    let empty = repo
        .save(&name, &CustomModelRecord::new(&name, "car"))
        .await
        .unwrap_err();
    let with_overlays = repo.save(&name, &sample_record().await).await.unwrap_err();
    assert_eq!(empty.error_code(), "INVALID_NAME");
    assert_eq!(with_overlays.error_code(), "INVALID_NAME");
    assert!(store.list_keys(Namespace::Blobs).await.unwrap().is_empty());
}

// === Partial Failure ===

#[tokio::test]
async fn test_externally_deleted_blob_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = file_repo(&dir, None).await;
    repo.save("red car", &sample_record().await).await.unwrap();

    store
        .delete(Namespace::Blobs, "overlay:red car:2")
        .await
        .unwrap();

    let loaded = repo.load("red car").await.unwrap();
    assert_eq!(loaded.overlays.len(), 2);
    assert_eq!(loaded.overlays[1].display_name, "stripe.png");
}

#[tokio::test]
async fn test_quota_exceeded_save_keeps_prior_record() {
    let dir = tempfile::tempdir().unwrap();
    let (_, repo) = file_repo(&dir, None).await;
    let prior = CustomModelRecord::new("red car", "car")
        .with_overlays(vec![overlay("flame.png", [255, 0, 0, 255], 10.0, 10.0, 0.0).await]);
    repo.save("red car", &prior).await.unwrap();

    let used: u64 = walkdir::WalkDir::new(dir.path().join("store"))
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.metadata().unwrap().len())
        .sum();
    let (_, limited) = file_repo(&dir, Some(used + 32)).await;

    let mut huge = overlay("huge.png", [0, 0, 255, 255], 50.0, 50.0, 0.0).await;
    huge.image = decalkit::overlay::OverlayImage::undecoded(
        decalkit::overlay::ImageFormat::Png,
        vec![0; 64 * 1024],
    );
    let bigger = CustomModelRecord::new("red car", "van")
        .with_overlays(vec![overlay("small.png", [0, 0, 0, 255], 1.0, 1.0, 0.0).await, huge]);

    let err = limited.save("red car", &bigger).await.unwrap_err();
    assert!(err.is_quota_exceeded());
    assert!(err.recovery_suggestion().is_some());

    let loaded = limited.load("red car").await.unwrap();
    assert_eq!(loaded.based_on, "car");
    assert_eq!(loaded.overlays.len(), 1);
    assert_eq!(loaded.overlays[0].display_name, "flame.png");
}

// === Base Models ===

#[tokio::test]
async fn test_base_model_directory_gates_load() {
    let dir = tempfile::tempdir().unwrap();
    let models = dir.path().join("models");
    std::fs::create_dir_all(&models).unwrap();
    std::fs::write(models.join("car.png"), png(4, 4, [10, 20, 30, 255])).unwrap();

    let (store, plain) = file_repo(&dir, None).await;
    plain.save("red car", &sample_record().await).await.unwrap();
    plain
        .save("boat", &CustomModelRecord::new("boat", "boat"))
        .await
        .unwrap();

    let repo = ModelRepository::new(store).with_provider(Arc::new(DirectoryModelProvider::new(&models)));
    assert_eq!(repo.load("red car").await.unwrap().overlays.len(), 3);
    assert!(matches!(
        repo.load("boat").await.unwrap_err(),
        DecalError::BaseModelNotFound { .. }
    ));
}

// === Export / Import ===

#[tokio::test]
async fn test_export_import_into_empty_store() {
    let source_dir = tempfile::tempdir().unwrap();
    let (_, source) = file_repo(&source_dir, None).await;
    source.save("red car", &sample_record().await).await.unwrap();
    source
        .save("blank", &CustomModelRecord::new("blank", "van"))
        .await
        .unwrap();

    let export_path = source_dir.path().join("export.json");
    let json = source.export_all().await.unwrap().to_json_pretty().unwrap();
    std::fs::write(&export_path, &json).unwrap();

    let target_dir = tempfile::tempdir().unwrap();
    let (_, target) = file_repo(&target_dir, None).await;
    let document = ExportDocument::from_json(&std::fs::read_to_string(&export_path).unwrap()).unwrap();
    let summary = target
        .import_records(&document, |_| ConflictDecision::Overwrite)
        .await
        .unwrap();

    assert_eq!(summary.imported, 2);
    assert_eq!(target.list_names().await.unwrap(), vec!["blank", "red car"]);

    let before = source.load("red car").await.unwrap();
    let after = target.load("red car").await.unwrap();
    assert_eq!(before.overlays.len(), after.overlays.len());
    for (a, b) in before.overlays.iter().zip(&after.overlays) {
        assert_eq!(a.position, b.position);
        assert_eq!(a.size, b.size);
        assert_relative_eq!(a.rotation_degrees, b.rotation_degrees);
        assert_eq!(a.image.bytes(), b.image.bytes());
    }
}

#[tokio::test]
async fn test_export_embeds_images_not_keys() {
    let dir = tempfile::tempdir().unwrap();
    let (_, repo) = file_repo(&dir, None).await;
    repo.save("red car", &sample_record().await).await.unwrap();

    let json = repo.export_record("red car").await.unwrap().to_json_pretty().unwrap();
    assert!(!json.contains("overlay:red car"));
    assert!(json.contains("data:image/png;base64,"));
    assert!(json.contains("\"exportDate\""));
}

#[tokio::test]
async fn test_reimport_with_skip_policy_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (_, repo) = file_repo(&dir, None).await;
    repo.save("red car", &sample_record().await).await.unwrap();
    let document = repo.export_all().await.unwrap();

    let summary = repo
        .import_records(&document, |_| ConflictDecision::Skip)
        .await
        .unwrap();
    assert_eq!(summary.imported, 0);
    assert_eq!(summary.skipped, 1);
}

// === Clear ===

#[tokio::test]
async fn test_clear_all_empties_both_namespaces() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = file_repo(&dir, None).await;
    for name in ["one", "two"] {
        repo.save(name, &sample_record().await).await.unwrap();
    }

    let summary = repo.clear_all().await.unwrap();
    assert_eq!(summary.deleted, 2);
    assert!(store.list_keys(Namespace::Records).await.unwrap().is_empty());
    assert!(store.list_keys(Namespace::Blobs).await.unwrap().is_empty());
}
