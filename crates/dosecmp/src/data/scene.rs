//! Scene documents: named volumes handed to and returned from the engines
//!
//! A scene file stands in for the host scene graph. It maps volume ids to
//! already-sampled volumes:
//!
//! ```yaml
//! volumes:
//!   plan_dose:
//!     kind: scalar
//!     geometry: { origin: [0, 0, 0], spacing: [2, 2, 2], dims: [2, 1, 1] }
//!     values: [60.0, 58.5]
//!   registration:
//!     kind: vector
//!     geometry: { origin: [0, 0, 0], spacing: [1, 1, 1], dims: [1, 1, 1] }
//!     values: [[0.0, 0.5, 0.0]]
//! ```

use std::collections::BTreeMap;

use dosecmp_core::{ScalarVolume, VectorField};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SceneVolume {
    Scalar(ScalarVolume),
    Vector(VectorField),
}

impl SceneVolume {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SceneVolume::Scalar(_) => "scalar",
            SceneVolume::Vector(_) => "vector",
        }
    }
}

/// Error types for resolving volume references
#[derive(Debug, Clone, PartialEq)]
pub enum SceneError {
    /// A node attribute that must name a volume is unset
    MissingReference(&'static str),
    VolumeNotFound(String),
    WrongKind {
        id: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl std::fmt::Display for SceneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneError::MissingReference(attr) => write!(f, "{attr} is not set"),
            SceneError::VolumeNotFound(id) => write!(f, "volume '{id}' not found in scene"),
            SceneError::WrongKind {
                id,
                expected,
                found,
            } => write!(f, "volume '{id}' is a {found} volume, expected {expected}"),
        }
    }
}

impl std::error::Error for SceneError {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub volumes: BTreeMap<String, SceneVolume>,
}

impl Scene {
    fn volume(&self, id: &str) -> Result<&SceneVolume, SceneError> {
        self.volumes
            .get(id)
            .ok_or_else(|| SceneError::VolumeNotFound(id.to_string()))
    }

    pub fn scalar(&self, id: &str) -> Result<&ScalarVolume, SceneError> {
        match self.volume(id)? {
            SceneVolume::Scalar(volume) => Ok(volume),
            other => Err(SceneError::WrongKind {
                id: id.to_string(),
                expected: "scalar",
                found: other.kind(),
            }),
        }
    }

    pub fn vector(&self, id: &str) -> Result<&VectorField, SceneError> {
        match self.volume(id)? {
            SceneVolume::Vector(field) => Ok(field),
            other => Err(SceneError::WrongKind {
                id: id.to_string(),
                expected: "vector",
                found: other.kind(),
            }),
        }
    }

    /// Insert or replace a scalar volume, returning whether one was replaced
    pub fn insert_scalar(&mut self, id: impl Into<String>, volume: ScalarVolume) -> bool {
        self.volumes
            .insert(id.into(), SceneVolume::Scalar(volume))
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dosecmp_core::Geometry;

    fn scene() -> Scene {
        let g = Geometry::new([0.0; 3], [1.0; 3], [2, 1, 1]);
        let mut scene = Scene::default();
        scene.insert_scalar("dose", ScalarVolume::filled(g, 1.0));
        scene.volumes.insert(
            "field".into(),
            SceneVolume::Vector(VectorField::filled(g, [0.0; 3])),
        );
        scene
    }

    #[test]
    fn test_lookup_by_kind() {
        let scene = scene();
        assert!(scene.scalar("dose").is_ok());
        assert!(scene.vector("field").is_ok());
        assert_eq!(
            scene.scalar("field").unwrap_err(),
            SceneError::WrongKind {
                id: "field".into(),
                expected: "scalar",
                found: "vector"
            }
        );
        assert_eq!(
            scene.vector("missing").unwrap_err(),
            SceneError::VolumeNotFound("missing".into())
        );
    }

    #[test]
    fn test_insert_reports_replacement() {
        let mut scene = scene();
        let g = Geometry::new([0.0; 3], [1.0; 3], [1, 1, 1]);
        assert!(!scene.insert_scalar("gamma", ScalarVolume::filled(g, 0.0)));
        assert!(scene.insert_scalar("gamma", ScalarVolume::filled(g, 1.0)));
    }

    #[test]
    fn test_scene_yaml_round_trip() {
        let scene = scene();
        let yaml = serde_saphyr::to_string(&scene).unwrap();
        let parsed: Scene = serde_saphyr::from_str(&yaml).unwrap();
        assert_eq!(parsed, scene);
    }

    #[test]
    fn test_parses_tagged_volumes() {
        let yaml = "\
volumes:
  plan:
    kind: scalar
    geometry: { origin: [0, 0, 0], spacing: [2, 2, 2], dims: [2, 1, 1] }
    values: [60.0, 58.5]
  reg:
    kind: vector
    geometry: { origin: [0, 0, 0], spacing: [1, 1, 1], dims: [1, 1, 1] }
    values: [[0.0, 0.5, 0.0]]
";
        let scene: Scene = serde_saphyr::from_str(yaml).unwrap();
        assert_eq!(scene.scalar("plan").unwrap().values(), &[60.0, 58.5]);
        assert_eq!(scene.vector("reg").unwrap().values(), &[[0.0, 0.5, 0.0]]);
    }
}
