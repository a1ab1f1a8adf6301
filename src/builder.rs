//! Feature builders
//!
//! The engine does not parse Gherkin. A [`Builder`] hands it an already-built
//! feature tree; [`JsonBuilder`] reads one from a `*.feature.json` file of the
//! form `{"features": [...]}` (a single feature object is accepted too).

use std::path::{Path, PathBuf};
use serde::Deserialize;
use crate::error::LoadError;
use crate::model::Feature;

/// Source of already-parsed features
pub trait Builder {
    fn build(&self) -> Result<Vec<Feature>, LoadError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Tree { features: Vec<Feature> },
    Single(Feature),
}

impl From<Document> for Vec<Feature> {
    fn from(doc: Document) -> Self {
        match doc {
            Document::Tree { features } => features,
            Document::Single(feature) => vec![feature],
        }
    }
}

/// Loads features from a JSON feature tree on disk
#[derive(Debug, Clone)]
pub struct JsonBuilder {
    path: PathBuf,
}

impl JsonBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a feature tree held in memory; `origin` names it in errors
    pub fn parse(origin: impl Into<PathBuf>, json: &str) -> Result<Vec<Feature>, LoadError> {
        let doc: Document = serde_json::from_str(json).map_err(|source| LoadError::Json {
            path: origin.into(),
            source,
        })?;
        Ok(doc.into())
    }
}

impl Builder for JsonBuilder {
    fn build(&self) -> Result<Vec<Feature>, LoadError> {
        if !self.path.exists() {
            return Err(LoadError::NotFound(self.path.clone()));
        }
        let data = std::fs::read_to_string(&self.path).map_err(|source| LoadError::Io {
            path: self.path.clone(),
            source,
        })?;
        let features = Self::parse(&self.path, &data)?;
        tracing::debug!(path = %self.path.display(), features = features.len(), "loaded feature tree");
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Keyword;

    const TREE: &str = r#"{
        "features": [{
            "name": "Checkout",
            "tags": ["shop"],
            "backgrounds": [{ "steps": [{ "keyword": "given", "description": "a cart", "line": 3 }] }],
            "scenarios": [{
                "name": "pay",
                "line": 5,
                "steps": [
                    { "keyword": "when", "description": "I pay", "line": 6 },
                    { "keyword": "then", "description": "I get:", "line": 7,
                      "table": [["item", "qty"], ["tea", "2"]] }
                ]
            }]
        }]
    }"#;

    #[test]
    fn test_parse_tree() {
        let features = JsonBuilder::parse("inline", TREE).unwrap();
        assert_eq!(features.len(), 1);
        let feature = &features[0];
        assert_eq!(feature.name, "Checkout");
        assert_eq!(feature.tags, vec!["shop"]);
        assert_eq!(feature.background_steps().count(), 1);
        let steps = &feature.scenarios[0].steps;
        assert_eq!(steps[0].keyword, Keyword::When);
        assert_eq!(steps[1].line, 7);
        assert_eq!(steps[1].table.as_ref().unwrap().hashes()[0][1], ("qty", "2"));
    }

    #[test]
    fn test_parse_single_feature() {
        let features = JsonBuilder::parse("inline", r#"{"name": "Solo"}"#).unwrap();
        assert_eq!(features[0].name, "Solo");
        assert!(features[0].scenarios.is_empty());
    }

    #[test]
    fn test_bad_json_names_origin() {
        let err = JsonBuilder::parse("broken.feature.json", "{").unwrap_err();
        assert!(matches!(err, LoadError::Json { .. }));
        assert!(err.to_string().contains("broken.feature.json"));
    }

    #[test]
    fn test_missing_file() {
        let err = JsonBuilder::new("/no/such/file.feature.json").build().unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
    }

    #[test]
    fn test_build_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkout.feature.json");
        std::fs::write(&path, TREE).unwrap();
        let features = JsonBuilder::new(&path).build().unwrap();
        assert_eq!(features[0].scenarios[0].name, "pay");
    }
}
