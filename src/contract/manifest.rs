//! Declarations loaded from JSON or TOML manifests.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::mock::MockSet;
use crate::routing::ModalDeclaration;
use crate::schema::SchemaDeclaration;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid JSON manifest: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML manifest: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Project {
    pub name: String,
}

/// Schemas, routes and mocks to add to a contract.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Declarations {
    pub schemas: Vec<SchemaDeclaration>,
    pub modals: Vec<ModalDeclaration>,
    pub mocks: Option<MockSet>,
}

/// A complete project description.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub project: Option<Project>,
    #[serde(flatten)]
    pub declarations: Declarations,
}

impl Manifest {
    pub fn from_json_str(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(text)?)
    }

    /// Read a manifest, choosing the format by extension (`.toml`, anything else is JSON).
    pub async fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ManifestError::Io {
                path: path.display().to_string(),
                source,
            })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const TOML_MANIFEST: &str = r#"
[project]
name = "shop"

[[schemas]]
name = "Widgets"
cache = "widgets"
fields = [{ name = "items", type = "array" }]

[[modals]]
name = "widget"

[[modals.routes]]
name = "WidgetList"
path = "list"
response = "Widgets"
ttl = 60
map_state = { count = "meta.count" }

[[mocks.Widgets]]
data = { items = [] }
"#;

    #[test]
    fn toml_manifest_parses_every_section() {
        let manifest = Manifest::from_toml_str(TOML_MANIFEST).expect("valid manifest");
        assert_eq!(manifest.project.expect("project").name, "shop");
        let decls = manifest.declarations;
        assert_eq!(decls.schemas.len(), 1);
        assert_eq!(decls.modals[0].routes[0].ttl, Some(60));
        let mocks = decls.mocks.expect("mocks");
        assert_eq!(mocks["Widgets"].len(), 1);
    }

    #[test]
    fn json_manifest_without_project_is_accepted() {
        let manifest =
            Manifest::from_json_str(r#"{"schemas": [{"name": "Sex", "type": "enum", "enums": []}]}"#)
                .expect("valid manifest");
        assert!(manifest.project.is_none());
        assert!(manifest.declarations.mocks.is_none());
    }

    #[tokio::test]
    async fn from_path_picks_format_by_extension() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("tmp file");
        file.write_all(TOML_MANIFEST.as_bytes()).expect("write tmp");

        let manifest = Manifest::from_path(file.path()).await.expect("loads");
        assert_eq!(manifest.declarations.modals.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let err = Manifest::from_path(Path::new("/nonexistent/contract.json"))
            .await
            .expect_err("missing");
        assert!(err.to_string().contains("/nonexistent/contract.json"));
    }
}
