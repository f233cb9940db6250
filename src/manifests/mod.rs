//! Policy artifacts applied by the scenarios.
//!
//! Artifacts are static manifest text. They are applied and deleted whole,
//! so a multi-document artifact (Gateway + DestinationRule + VirtualService)
//! always lands or leaves as a unit.

pub mod authorization;
pub mod egress;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::{Error, Result};

/// A named, immutable manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyArtifact {
    /// Short name used by the CLI and in logs
    pub name: &'static str,
    /// Manifest text, possibly several `---`-separated documents
    pub contents: &'static str,
}

/// Identity of one object inside an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestObject {
    /// Object kind
    pub kind: String,
    /// `metadata.name`
    pub name: String,
}

#[derive(Deserialize)]
struct RawObject {
    kind: Option<String>,
    metadata: Option<RawMetadata>,
}

#[derive(Deserialize)]
struct RawMetadata {
    name: Option<String>,
}

impl PolicyArtifact {
    /// Declare an artifact
    pub const fn new(name: &'static str, contents: &'static str) -> Self {
        Self { name, contents }
    }

    /// Parse every document, requiring `kind` and `metadata.name` on each.
    pub fn documents(&self) -> Result<Vec<ManifestObject>> {
        let mut objects = Vec::new();
        for (index, document) in serde_yaml::Deserializer::from_str(self.contents).enumerate() {
            let value = serde_yaml::Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }
            let raw: RawObject = serde_yaml::from_value(value)?;
            let kind = raw.kind.ok_or_else(|| {
                Error::manifest(format!("{}: document {} has no kind", self.name, index))
            })?;
            let name = raw.metadata.and_then(|m| m.name).ok_or_else(|| {
                Error::manifest(format!(
                    "{}: {} in document {} has no metadata.name",
                    self.name, kind, index
                ))
            })?;
            objects.push(ManifestObject { kind, name });
        }
        if objects.is_empty() {
            return Err(Error::manifest(format!("{}: no documents", self.name)));
        }
        Ok(objects)
    }
}

impl std::fmt::Display for PolicyArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Every artifact known to the runner
pub fn all() -> impl Iterator<Item = &'static PolicyArtifact> {
    authorization::ALL.iter().chain(egress::ALL.iter())
}

/// Find an artifact by name
pub fn lookup(name: &str) -> Option<&'static PolicyArtifact> {
    all().find(|a| a.name == name)
}

/// Merge patch toggling data-plane and control-plane mTLS on a
/// ServiceMeshControlPlane.
pub fn control_plane_mtls_patch(enabled: bool) -> Value {
    json!({
        "spec": {
            "security": {
                "dataPlane": { "mtls": enabled },
                "controlPlane": { "mtls": enabled }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_artifact_parses_with_named_objects() {
        for artifact in all() {
            let docs = artifact
                .documents()
                .unwrap_or_else(|e| panic!("{} failed to parse: {}", artifact.name, e));
            assert!(!docs.is_empty(), "{}", artifact.name);
        }
    }

    #[test]
    fn artifact_names_are_unique() {
        let names: HashSet<&str> = all().map(|a| a.name).collect();
        assert_eq!(names.len(), all().count());
    }

    #[test]
    fn lookup_finds_by_name() {
        assert_eq!(lookup("deny-all"), Some(&authorization::DENY_ALL));
        assert_eq!(lookup("cnn-gateway-https"), Some(&egress::CNN_GATEWAY_HTTPS));
        assert!(lookup("allow-everything").is_none());
    }

    #[test]
    fn documents_rejects_objects_without_names() {
        let artifact = PolicyArtifact::new("broken", "kind: Gateway\nmetadata: {}\n");
        let err = artifact.documents().unwrap_err();
        assert!(err.to_string().contains("metadata.name"));

        let artifact = PolicyArtifact::new("kindless", "metadata:\n  name: x\n");
        assert!(artifact.documents().is_err());

        let artifact = PolicyArtifact::new("empty", "---\n");
        assert!(artifact.documents().is_err());
    }

    #[test]
    fn multi_document_artifacts_list_every_object() {
        let docs = egress::CNN_GATEWAY.documents().unwrap();
        assert_eq!(
            docs,
            vec![
                ManifestObject {
                    kind: "Gateway".to_string(),
                    name: "istio-egressgateway".to_string()
                },
                ManifestObject {
                    kind: "DestinationRule".to_string(),
                    name: "egressgateway-for-cnn".to_string()
                },
                ManifestObject {
                    kind: "VirtualService".to_string(),
                    name: "direct-cnn-through-egress-gateway".to_string()
                },
            ]
        );
    }

    #[test]
    fn mtls_patch_toggles_both_planes() {
        let on = control_plane_mtls_patch(true);
        assert_eq!(on["spec"]["security"]["dataPlane"]["mtls"], true);
        assert_eq!(on["spec"]["security"]["controlPlane"]["mtls"], true);

        let off = control_plane_mtls_patch(false);
        assert_eq!(off["spec"]["security"]["dataPlane"]["mtls"], false);
        assert_eq!(off["spec"]["security"]["controlPlane"]["mtls"], false);
    }
}
