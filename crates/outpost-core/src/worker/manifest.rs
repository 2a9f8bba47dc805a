use thiserror::Error;

/// Application shell document; also served when the network is down.
pub const ROOT_PATH: &str = "/";

/// Assets precached by default: shell, web manifest and icon set.
const DEFAULT_ASSETS: &[&str] = &[
    ROOT_PATH,
    "/manifest.json",
    "/favicon.ico",
    "/icons/icon-192x192.png",
    "/icons/icon-512x512.png",
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ManifestError {
    #[error("Asset manifest must include the root path \"/\"")]
    MissingRoot,

    #[error("Asset path is not root-relative: {0}")]
    NotRootRelative(String),
}

/// Ordered list of root-relative paths to precache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
    paths: Vec<String>,
}

impl AssetManifest {
    /// Build a manifest, dropping duplicate paths but keeping first-seen order.
    pub fn new(paths: Vec<String>) -> Result<Self, ManifestError> {
        let mut unique: Vec<String> = Vec::with_capacity(paths.len());
        for path in paths {
            if !path.starts_with('/') {
                return Err(ManifestError::NotRootRelative(path));
            }
            if !unique.contains(&path) {
                unique.push(path);
            }
        }
        if !unique.iter().any(|p| p == ROOT_PATH) {
            return Err(ManifestError::MissingRoot);
        }
        Ok(Self { paths: unique })
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self {
            paths: DEFAULT_ASSETS.iter().map(|p| p.to_string()).collect(),
        }
    }
}
