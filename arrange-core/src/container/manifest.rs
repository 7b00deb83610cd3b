use serde::{Deserialize, Serialize};

/// Member name of the manifest at the root of a directory container.
pub const MANIFEST_NAME: &str = "directory_structure.json";
pub const KIND_DIRECTORY: &str = "directory";

/// Marks a container as a recursively encrypted directory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ArchiveManifest {
    #[serde(rename = "type")]
    pub kind: String,
    /// Base name of the directory that was sealed.
    pub name: String,
}

impl ArchiveManifest {
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            kind: KIND_DIRECTORY.to_string(),
            name: name.into(),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == KIND_DIRECTORY
    }
}
