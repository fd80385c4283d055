// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Project Container
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Project file container and geometry document IO.
//!
//! A project bundles the working geometry, an append-only version
//! history, stored simulation results, notes, and a thumbnail. Version
//! numbers are monotone integers assigned on save; restoring appends a
//! copy instead of rewriting history. Legacy single-body documents
//! (`body` key, no `stages`) migrate to single-stage geometries on
//! load.
//!
//! All IO goes through explicit paths supplied by the host; the core
//! discovers nothing on its own.

use colli_types::error::{ColliError, ColliResult};
use colli_types::geometry::CollimatorGeometry;
use colli_types::results::SimulationResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// One snapshot in the version history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectVersion {
    /// Monotone, 1-based.
    pub version: u32,
    pub geometry: CollimatorGeometry,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at_unix_s: f64,
}

/// Composite project document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: String,
    pub geometry: CollimatorGeometry,
    #[serde(default)]
    pub versions: Vec<ProjectVersion>,
    #[serde(default)]
    pub results: Vec<SimulationResult>,
    #[serde(default)]
    pub notes: String,
    /// Opaque base64 PNG payload, rendered by the host only.
    #[serde(default)]
    pub thumbnail_png_base64: Option<String>,
}

impl Project {
    pub fn new(name: impl Into<String>, geometry: CollimatorGeometry) -> Self {
        Project {
            name: name.into(),
            geometry,
            versions: Vec::new(),
            results: Vec::new(),
            notes: String::new(),
            thumbnail_png_base64: None,
        }
    }

    /// Snapshot the working geometry as the next version. Returns the
    /// assigned version number.
    pub fn save_version(&mut self, note: Option<String>) -> u32 {
        let version = self.versions.last().map(|v| v.version).unwrap_or(0) + 1;
        self.versions.push(ProjectVersion {
            version,
            geometry: self.geometry.clone(),
            note,
            created_at_unix_s: now_unix(),
        });
        version
    }

    /// Restore version `k` into the working geometry and append the
    /// restored payload as a new version. History is never rewritten.
    pub fn restore_version(&mut self, k: u32) -> ColliResult<u32> {
        let snapshot = self
            .versions
            .iter()
            .find(|v| v.version == k)
            .ok_or_else(|| {
                ColliError::InvalidConfig(format!("unknown version {k}"))
            })?
            .geometry
            .clone();
        self.geometry = snapshot;
        Ok(self.save_version(Some(format!("restored from version {k}"))))
    }

    /// Attach a finished simulation result.
    pub fn add_result(&mut self, result: SimulationResult) {
        self.results.push(result);
    }

    pub fn to_json(&self) -> ColliResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> ColliResult<Self> {
        let mut value: Value = serde_json::from_str(json)?;
        if let Some(obj) = value.as_object_mut() {
            if let Some(geometry) = obj.get_mut("geometry") {
                migrate_legacy_geometry(geometry);
            }
            if let Some(versions) = obj.get_mut("versions").and_then(Value::as_array_mut) {
                for v in versions {
                    if let Some(geometry) = v.get_mut("geometry") {
                        migrate_legacy_geometry(geometry);
                    }
                }
            }
        }
        let project: Project = serde_json::from_value(value)?;
        project.geometry.validate()?;
        Ok(project)
    }

    pub fn save_to(&self, path: &Path) -> ColliResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_from(path: &Path) -> ColliResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

/// Parse and validate an engine-facing geometry document, accepting
/// legacy single-body layouts.
pub fn geometry_from_document(json: &str) -> ColliResult<CollimatorGeometry> {
    let mut value: Value = serde_json::from_str(json)?;
    migrate_legacy_geometry(&mut value);
    let geometry: CollimatorGeometry = serde_json::from_value(value)?;
    geometry.validate()?;
    Ok(geometry)
}

/// Serialize a geometry to its on-disk document form.
pub fn geometry_to_document(geometry: &CollimatorGeometry) -> ColliResult<String> {
    Ok(serde_json::to_string_pretty(geometry)?)
}

/// v1.x documents carried a single `body` instead of `stages`.
fn migrate_legacy_geometry(value: &mut Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    if obj.contains_key("stages") || !obj.contains_key("body") {
        return;
    }
    if let Some(body) = obj.remove("body") {
        obj.insert("stages".into(), Value::Array(vec![body]));
    }
}

fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use colli_types::geometry::{
        Aperture, CollimatorType, DetectorConfig, Layer, SourceConfig, Stage,
    };

    fn geometry() -> CollimatorGeometry {
        CollimatorGeometry {
            id: "g1".into(),
            name: "two-stage".into(),
            kind: CollimatorType::Slit,
            source: SourceConfig::default(),
            stages: vec![Stage {
                name: "primary".into(),
                z_position: 100.0,
                depth: 50.0,
                outer_width: 210.0,
                aperture: Aperture::Slit {
                    entry_width: 5.0,
                    exit_width: 5.0,
                    height: 50.0,
                },
                layers: vec![Layer {
                    material_id: "Pb".into(),
                    thickness: 50.0,
                    purpose: Default::default(),
                }],
            }],
            detector: DetectorConfig {
                z_position: 500.0,
                width: 400.0,
            },
        }
    }

    #[test]
    fn test_version_numbers_are_monotone() {
        let mut project = Project::new("test", geometry());
        assert_eq!(project.save_version(None), 1);
        assert_eq!(project.save_version(Some("tweak".into())), 2);
        assert_eq!(project.save_version(None), 3);
        let numbers: Vec<u32> = project.versions.iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_restore_appends_instead_of_rewriting() {
        let mut project = Project::new("test", geometry());
        project.save_version(None); // v1
        project.geometry.stages[0].depth = 60.0;
        project.geometry.stages[0].layers[0].thickness = 60.0;
        project.save_version(None); // v2

        let new_version = project.restore_version(1).unwrap();
        assert_eq!(new_version, 3);
        assert_eq!(project.versions.len(), 3);
        // Restored payload equals version 1
        assert_eq!(project.versions[2].geometry, project.versions[0].geometry);
        // Working geometry rolled back
        assert!((project.geometry.stages[0].depth - 50.0).abs() < 1e-12);
        // v2 still intact
        assert!((project.versions[1].geometry.stages[0].depth - 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_restore_unknown_version_fails() {
        let mut project = Project::new("test", geometry());
        project.save_version(None);
        assert!(project.restore_version(9).is_err());
    }

    #[test]
    fn test_project_round_trip() {
        let mut project = Project::new("round-trip", geometry());
        project.notes = "free-form notes".into();
        project.save_version(Some("initial".into()));
        let json = project.to_json().unwrap();
        let back = Project::from_json(&json).unwrap();
        assert_eq!(project, back);
    }

    #[test]
    fn test_geometry_document_round_trip() {
        let g = geometry();
        let doc = geometry_to_document(&g).unwrap();
        let back = geometry_from_document(&doc).unwrap();
        assert_eq!(g, back);
    }

    #[test]
    fn test_legacy_body_migrates_to_single_stage() {
        let legacy = r#"{
            "id": "old",
            "name": "legacy design",
            "type": "slit",
            "body": {
                "z_position": 100.0,
                "depth": 50.0,
                "outer_width": 210.0,
                "aperture": {"type": "slit", "entry_width": 5.0, "exit_width": 5.0},
                "layers": [{"material_id": "Pb", "thickness": 50.0}]
            },
            "detector": {"z_position": 500.0, "width": 400.0}
        }"#;
        let g = geometry_from_document(legacy).unwrap();
        assert_eq!(g.stages.len(), 1);
        assert_eq!(g.stages[0].layers[0].material_id, "Pb");
        assert!((g.stages[0].depth - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_document_rejected() {
        // Layer sum does not match depth
        let bad = r#"{
            "type": "slit",
            "stages": [{
                "z_position": 100.0,
                "depth": 50.0,
                "outer_width": 210.0,
                "aperture": {"type": "slit", "entry_width": 5.0, "exit_width": 5.0},
                "layers": [{"material_id": "Pb", "thickness": 10.0}]
            }],
            "detector": {"z_position": 500.0, "width": 400.0}
        }"#;
        assert!(matches!(
            geometry_from_document(bad),
            Err(ColliError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_save_and_load_paths() {
        let dir = std::env::temp_dir().join("colli_project_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("design.json");
        let mut project = Project::new("disk", geometry());
        project.save_version(None);
        project.save_to(&path).unwrap();
        let back = Project::load_from(&path).unwrap();
        assert_eq!(project, back);
        std::fs::remove_file(&path).ok();
    }
}
