use serde::{Deserialize, Serialize};

/// Canonical `pkg:<ecosystem>/<name>@<version>` identifier.
///
/// Constructed only from an already cleaned version; the lowercase form is
/// the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coordinate(String);

impl Coordinate {
    pub fn new(ecosystem: &str, name: &str, version: &str) -> Self {
        Self(format!("pkg:{}/{}@{}", ecosystem, name, version))
    }

    /// Wraps a string that is already canonical, such as the coordinates
    /// echoed back in a component report.
    pub fn from_raw(coordinates: impl Into<String>) -> Self {
        Self(coordinates.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn cache_key(&self) -> String {
        self.0.to_lowercase()
    }

    /// Package name without the ecosystem prefix.
    pub fn name(&self) -> &str {
        let without_version = self.0.rsplit_once('@').map_or(self.0.as_str(), |(n, _)| n);
        without_version
            .strip_prefix("pkg:")
            .and_then(|rest| rest.split_once('/'))
            .map_or(without_version, |(_, name)| name)
    }

    pub fn version(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(_, v)| v)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A dependency as read from a manifest, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyProject {
    pub name: String,
    pub version: String,
    /// Candidate upgrade version offered by the manifest tooling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<String>,
}

impl DependencyProject {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            update: None,
        }
    }

    pub fn with_update(mut self, update: impl Into<String>) -> Self {
        self.update = Some(update.into());
        self
    }
}

/// A manifest record that could not be turned into an auditable coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidProject {
    #[serde(flatten)]
    pub project: DependencyProject,
    pub reason: String,
}
