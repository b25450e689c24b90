//! Schema migration support for stored records.
//!
//! Every record carries an integer `schemaVersion`. Migrations form a
//! table of single steps, each taking version N to N+1, applied in order
//! until the document reaches [`CURRENT_SCHEMA_VERSION`].
//!
//! Version history:
//! - v1: overlay transforms under `overlayImages`, blob keys implied by order.
//! - v2: explicit `overlayKeys`; `overlayImages` renamed to `overlays`.
//! - v3: per-overlay `aspectRatio`, `mimeType` and optional `sha256`;
//!   record-level `createdAt`/`modifiedAt`.

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{DecalError, Result};
use crate::repository::record::blob_key;

/// Current schema version for stored records.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

const SCHEMA_VERSION_FIELD: &str = "schemaVersion";

/// Takes the record key and a document at version N, returns version N+1.
type MigrationFn = fn(&str, Value) -> Result<Value>;

/// `MIGRATIONS[i]` upgrades from version `i + 1` to `i + 2`.
const MIGRATIONS: &[MigrationFn] = &[migrate_v1_to_v2, migrate_v2_to_v3];

/// Read the explicit schema version of a stored document.
pub fn schema_version_of(data: &Value) -> Result<u32> {
    let raw = data
        .get(SCHEMA_VERSION_FIELD)
        .ok_or_else(|| DecalError::InvalidSchemaVersion {
            version: "missing".to_string(),
        })?;
    raw.as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v >= 1)
        .ok_or_else(|| DecalError::InvalidSchemaVersion {
            version: raw.to_string(),
        })
}

/// Bring a stored document up to [`CURRENT_SCHEMA_VERSION`].
///
/// # Errors
/// `InvalidSchemaVersion` when the version is missing or malformed,
/// `MigrationError` when the document is newer than this build or a step fails.
pub fn migrate_record(key: &str, mut data: Value) -> Result<Value> {
    let mut version = schema_version_of(&data)?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(DecalError::MigrationError {
            from: version,
            to: CURRENT_SCHEMA_VERSION,
            reason: "cannot downgrade a record from a newer schema version".to_string(),
        });
    }

    while version < CURRENT_SCHEMA_VERSION {
        let step = MIGRATIONS
            .get((version - 1) as usize)
            .ok_or_else(|| DecalError::MigrationError {
                from: version,
                to: version + 1,
                reason: "migration step not registered".to_string(),
            })?;

        data = step(key, data).map_err(|e| DecalError::MigrationError {
            from: version,
            to: version + 1,
            reason: e.to_string(),
        })?;

        version += 1;
        if let Some(obj) = data.as_object_mut() {
            obj.insert(SCHEMA_VERSION_FIELD.to_string(), json!(version));
        }
        debug!(key, version, "migrated record");
    }

    Ok(data)
}

fn as_object(data: &mut Value) -> Result<&mut Map<String, Value>> {
    data.as_object_mut().ok_or_else(|| DecalError::Validation {
        reason: "record is not a JSON object".to_string(),
    })
}

/// v1 -> v2: make blob keys explicit.
fn migrate_v1_to_v2(key: &str, mut data: Value) -> Result<Value> {
    let obj = as_object(&mut data)?;

    let overlays = obj
        .remove("overlayImages")
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let count = overlays
        .as_array()
        .ok_or_else(|| DecalError::Validation {
            reason: "overlayImages is not an array".to_string(),
        })?
        .len();

    let name = obj
        .get("customName")
        .and_then(Value::as_str)
        .unwrap_or(key)
        .to_string();
    let keys: Vec<Value> = (0..count).map(|i| Value::String(blob_key(&name, i))).collect();

    obj.insert("customName".to_string(), Value::String(name));
    obj.insert("overlayKeys".to_string(), Value::Array(keys));
    obj.insert("overlays".to_string(), overlays);
    Ok(data)
}

/// v2 -> v3: per-overlay aspect ratio and mime type, record timestamps.
fn migrate_v2_to_v3(_key: &str, mut data: Value) -> Result<Value> {
    let obj = as_object(&mut data)?;
    let now = Value::String(Utc::now().to_rfc3339());
    obj.entry("createdAt").or_insert_with(|| now.clone());
    obj.entry("modifiedAt").or_insert(now);

    if let Some(overlays) = obj.get_mut("overlays").and_then(Value::as_array_mut) {
        for overlay in overlays.iter_mut().filter_map(Value::as_object_mut) {
            if !overlay.contains_key("aspectRatio") {
                let w = overlay
                    .get("size")
                    .and_then(|s| s.get("w"))
                    .and_then(Value::as_f64);
                let h = overlay
                    .get("size")
                    .and_then(|s| s.get("h"))
                    .and_then(Value::as_f64);
                let aspect = match (w, h) {
                    (Some(w), Some(h)) if w > 0.0 && h > 0.0 => w / h,
                    _ => 1.0,
                };
                overlay.insert("aspectRatio".to_string(), json!(aspect));
            }
            overlay
                .entry("mimeType")
                .or_insert_with(|| Value::String("image/png".to_string()));
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::record::RecordDocument;
    use pretty_assertions::assert_eq;

    fn v1_document() -> Value {
        json!({
            "schemaVersion": 1,
            "basedOn": "car",
            "materialPreset": "matte",
            "materialProperties": {"metalness": 0.1},
            "overlayImages": [
                {"name": "a.png", "position": {"x": 10.0, "y": 20.0}, "size": {"w": 30.0, "h": 15.0}, "rotation": 0.0},
                {"name": "b.png", "position": {"x": 50.0, "y": 50.0}, "size": {"w": 0.0, "h": 10.0}, "rotation": 90.0}
            ]
        })
    }

    #[test]
    fn test_current_version_unchanged() {
        let data = json!({"schemaVersion": CURRENT_SCHEMA_VERSION, "x": 1});
        assert_eq!(migrate_record("car", data.clone()).unwrap(), data);
    }

    #[test]
    fn test_v1_migrates_to_current() {
        let migrated = migrate_record("red car", v1_document()).unwrap();
        assert_eq!(migrated["schemaVersion"], CURRENT_SCHEMA_VERSION);
        assert_eq!(migrated["customName"], "red car");
        assert_eq!(
            migrated["overlayKeys"],
            json!(["overlay:red car:0", "overlay:red car:1"])
        );
        assert!(migrated.get("overlayImages").is_none());
        assert_eq!(migrated["overlays"][0]["aspectRatio"], 2.0);
        assert_eq!(migrated["overlays"][1]["aspectRatio"], 1.0);
        assert_eq!(migrated["overlays"][0]["mimeType"], "image/png");

        let doc: RecordDocument = serde_json::from_value(migrated).unwrap();
        assert_eq!(doc.overlays.len(), 2);
        assert_eq!(doc.material_preset, "matte");
    }

    #[test]
    fn test_v2_keeps_existing_fields() {
        let data = json!({
            "schemaVersion": 2,
            "customName": "x",
            "basedOn": "car",
            "overlayKeys": ["overlay:x:0"],
            "overlays": [{"name": "a.svg", "position": {"x": 1.0, "y": 2.0},
                          "size": {"w": 3.0, "h": 4.0}, "rotation": 5.0,
                          "aspectRatio": 9.0, "mimeType": "image/svg+xml"}],
            "createdAt": "2024-01-02T03:04:05Z"
        });
        let migrated = migrate_record("x", data).unwrap();
        assert_eq!(migrated["overlays"][0]["aspectRatio"], 9.0);
        assert_eq!(migrated["overlays"][0]["mimeType"], "image/svg+xml");
        assert_eq!(migrated["createdAt"], "2024-01-02T03:04:05Z");
        assert!(migrated.get("modifiedAt").is_some());
    }

    #[test]
    fn test_missing_version_is_rejected() {
        let err = migrate_record("car", json!({"basedOn": "car"})).unwrap_err();
        assert!(matches!(err, DecalError::InvalidSchemaVersion { version } if version == "missing"));
    }

    #[test]
    fn test_malformed_version_is_rejected() {
        for bad in [json!("1.0.0"), json!(0), json!(-2)] {
            let err = migrate_record("car", json!({"schemaVersion": bad})).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_SCHEMA_VERSION");
        }
    }

    #[test]
    fn test_newer_version_cannot_downgrade() {
        let err = migrate_record("car", json!({"schemaVersion": CURRENT_SCHEMA_VERSION + 1}))
            .unwrap_err();
        assert!(matches!(err, DecalError::MigrationError { .. }));
    }

    #[test]
    fn test_non_object_fails_migration() {
        let err = migrate_record("car", json!({"schemaVersion": 1, "overlayImages": 7})).unwrap_err();
        assert!(matches!(err, DecalError::MigrationError { from: 1, to: 2, .. }));
    }

    #[test]
    fn test_table_covers_every_step() {
        assert_eq!(MIGRATIONS.len() as u32, CURRENT_SCHEMA_VERSION - 1);
    }
}
