//! Turns raw package identifiers into deduplicated, auditable coordinates.
//!
//! Records that cannot be audited (no version, or a version that is not a
//! semantic version) are set aside in [`Normalized::invalid`] rather than
//! reported as errors.

use std::collections::{HashMap, HashSet};

use crate::model::{Coordinate, DependencyProject, InvalidProject};

/// Output of normalization.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Unique coordinates in first-seen order.
    pub coordinates: Vec<Coordinate>,
    pub invalid: Vec<InvalidProject>,
    /// Number of input records, including duplicates and invalid ones.
    pub total: usize,
    origins: HashMap<String, DependencyProject>,
}

impl Normalized {
    pub fn usable(&self) -> usize {
        self.coordinates.len()
    }

    /// The manifest record a coordinate came from, looked up by cache key.
    pub fn origin(&self, key: &str) -> Option<&DependencyProject> {
        self.origins.get(key)
    }

    fn push(&mut self, seen: &mut HashSet<String>, coordinate: Coordinate, origin: DependencyProject) {
        if seen.insert(coordinate.as_str().to_string()) {
            self.origins.entry(coordinate.cache_key()).or_insert(origin);
            self.coordinates.push(coordinate);
        }
    }

    fn reject(&mut self, project: DependencyProject, reason: impl Into<String>) {
        self.invalid.push(InvalidProject {
            project,
            reason: reason.into(),
        });
    }
}

/// Normalizes package-URL strings such as `pkg:golang/foo@v1.0.0`.
pub fn normalize<'a, I>(raw: I) -> Normalized
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = Normalized::default();
    let mut seen = HashSet::new();

    for purl in raw {
        out.total += 1;
        let (ecosystem, name, version) = match split_purl(purl) {
            Ok(parts) => parts,
            Err(reason) => {
                out.reject(DependencyProject::new(purl.trim(), ""), reason);
                continue;
            }
        };

        match clean_version(version) {
            Some(version) => {
                let coordinate = Coordinate::new(ecosystem, name, &version);
                out.push(&mut seen, coordinate, DependencyProject::new(name, version));
            }
            None => out.reject(DependencyProject::new(name, version), invalid_reason(version)),
        }
    }

    out
}

/// Normalizes manifest records, remembering each coordinate's project so
/// update candidates can be found later.
pub fn normalize_projects(projects: &[DependencyProject], ecosystem: &str) -> Normalized {
    let mut out = Normalized::default();
    let mut seen = HashSet::new();

    for project in projects {
        out.total += 1;
        match clean_version(&project.version) {
            Some(version) => {
                let coordinate = Coordinate::new(ecosystem, &project.name, &version);
                out.push(&mut seen, coordinate, project.clone());
            }
            None => out.reject(project.clone(), invalid_reason(&project.version)),
        }
    }

    out
}

/// Strips a leading `v` and any build metadata, returning the version only if
/// what remains is a semantic version.
///
/// ```
/// use depaudit::normalize::clean_version;
///
/// assert_eq!(clean_version("v2.0.0+incompatible").as_deref(), Some("2.0.0"));
/// assert_eq!(clean_version("latest"), None);
/// ```
pub fn clean_version(version: &str) -> Option<String> {
    let version = version.trim();
    let version = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);
    let version = version.split_once('+').map_or(version, |(v, _)| v);

    if version.is_empty() {
        return None;
    }

    semver::Version::parse(version).ok().map(|v| v.to_string())
}

fn invalid_reason(version: &str) -> String {
    if version.trim().is_empty() {
        "missing version".to_string()
    } else {
        format!("'{}' is not a semantic version", version)
    }
}

/// Splits `pkg:<type>/<name>@<version>[?qualifiers][#subpath]`.
fn split_purl(purl: &str) -> Result<(&str, &str, &str), &'static str> {
    let rest = purl
        .trim()
        .strip_prefix("pkg:")
        .ok_or("not a package URL")?;
    let rest = rest.split_once('#').map_or(rest, |(r, _)| r);
    let rest = rest.split_once('?').map_or(rest, |(r, _)| r);

    let (ecosystem, rest) = rest.split_once('/').ok_or("missing package name")?;
    // The version separator can only follow the last path segment; an `@`
    // before it belongs to a namespace such as an npm scope.
    let tail = rest.rfind('/').map_or(0, |i| i + 1);
    let (name, version) = match rest[tail..].rfind('@') {
        Some(at) => (&rest[..tail + at], &rest[tail + at + 1..]),
        None => (rest, ""),
    };

    if ecosystem.is_empty() || name.is_empty() {
        return Err("missing package name");
    }

    Ok((ecosystem, name, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_prefix_duplicates_collapse() {
        let out = normalize(["pkg:golang/foo@v1.0.0", "pkg:golang/foo@1.0.0"]);
        assert_eq!(out.coordinates.len(), 1);
        assert_eq!(out.coordinates[0].as_str(), "pkg:golang/foo@1.0.0");
        assert_eq!(out.total, 2);
    }

    #[test]
    fn test_first_seen_order_is_kept() {
        let out = normalize([
            "pkg:golang/a@1.0.0",
            "pkg:golang/a@1.0.0",
            "pkg:golang/b@0.1.0",
        ]);
        let coords: Vec<&str> = out.coordinates.iter().map(|c| c.as_str()).collect();
        assert_eq!(coords, vec!["pkg:golang/a@1.0.0", "pkg:golang/b@0.1.0"]);
    }

    #[test]
    fn test_build_metadata_is_stripped() {
        assert_eq!(clean_version("v2.1.0+incompatible").as_deref(), Some("2.1.0"));
        assert_eq!(
            clean_version("v0.0.0-20190308221718-c2843e01d9a2").as_deref(),
            Some("0.0.0-20190308221718-c2843e01d9a2")
        );
    }

    #[test]
    fn test_unusable_versions_are_dropped_not_errors() {
        let projects = vec![
            DependencyProject::new("example.com/main", ""),
            DependencyProject::new("example.com/lib", "v1.2"),
            DependencyProject::new("example.com/ok", "v1.2.3"),
        ];
        let out = normalize_projects(&projects, "golang");

        assert_eq!(out.total, 3);
        assert_eq!(out.usable(), 1);
        assert_eq!(out.invalid.len(), 2);
        assert_eq!(out.invalid[0].reason, "missing version");
        assert!(out.invalid[1].reason.contains("v1.2"));
    }

    #[test]
    fn test_origin_keeps_update_candidate() {
        let projects = vec![DependencyProject::new("example.com/Lib", "v1.0.0").with_update("v1.1.0")];
        let out = normalize_projects(&projects, "golang");

        let key = out.coordinates[0].cache_key();
        let origin = out.origin(&key).unwrap();
        assert_eq!(origin.update.as_deref(), Some("v1.1.0"));
    }

    #[test]
    fn test_malformed_purls() {
        let out = normalize(["foo@1.0.0", "pkg:golang/bar", "pkg:npm/@scope/pkg@1.0.0?arch=x#src"]);
        assert_eq!(out.invalid.len(), 2);
        assert_eq!(out.invalid[0].reason, "not a package URL");
        assert_eq!(out.invalid[1].reason, "missing version");
        assert_eq!(out.coordinates[0].as_str(), "pkg:npm/@scope/pkg@1.0.0");
    }

    #[test]
    fn test_scoped_name_without_version() {
        let out = normalize(["pkg:npm/@scope/pkg", "pkg:npm/@scope/other@2.0.0"]);

        assert_eq!(out.invalid.len(), 1);
        assert_eq!(out.invalid[0].project.name, "@scope/pkg");
        assert_eq!(out.invalid[0].reason, "missing version");
        assert_eq!(out.coordinates[0].as_str(), "pkg:npm/@scope/other@2.0.0");
    }
}
