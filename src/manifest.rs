//! Reads dependency lists into [`DependencyProject`] records.
//!
//! Two line formats are understood:
//!
//! - `go list -m all` / `go list -m -u all` output:
//!   `module version [update] [=> replacement version]`
//! - one package URL per line (`pkg:golang/example.com/lib@v1.2.3`)

use anyhow::{Context, Result};
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::model::DependencyProject;

/// Parsed input, either manifest records or raw package URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    Projects(Vec<DependencyProject>),
    Purls(Vec<String>),
}

impl Manifest {
    pub fn len(&self) -> usize {
        match self {
            Manifest::Projects(p) => p.len(),
            Manifest::Purls(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reads a manifest from `path`, or from stdin when `path` is `None` or `-`.
pub fn read(path: Option<&Path>) -> Result<Manifest> {
    let content = match path {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("reading dependency list {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading dependency list from stdin")?;
            buf
        }
    };
    Ok(parse(&content))
}

/// Picks the format from the first meaningful line.
pub fn parse(content: &str) -> Manifest {
    let mut lines = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .peekable();

    if lines.peek().is_some_and(|l| l.starts_with("pkg:")) {
        Manifest::Purls(lines.map(str::to_string).collect())
    } else {
        Manifest::Projects(lines.filter_map(parse_go_list_line).collect())
    }
}

fn parse_go_list_line(line: &str) -> Option<DependencyProject> {
    let (original, replacement) = match line.split_once("=>") {
        Some((left, right)) => (left.trim(), Some(right.trim())),
        None => (line, None),
    };

    let mut fields = original.split_whitespace();
    let name = fields.next()?;
    let mut version = "";
    let mut update = None;
    for field in fields {
        if let Some(candidate) = field.strip_prefix('[').and_then(|f| f.strip_suffix(']')) {
            update = Some(candidate);
        } else if version.is_empty() {
            version = field;
        }
    }

    // A replacement with a version points at another module; one without is
    // a local directory and has nothing to audit.
    let (name, version) = match replacement {
        Some(replacement) => {
            let mut fields = replacement.split_whitespace();
            let path = fields.next().unwrap_or(name);
            match fields.next() {
                Some(v) => (path, v),
                None => (name, ""),
            }
        }
        None => (name, version),
    };

    let mut project = DependencyProject::new(name, version);
    if replacement.is_none() {
        project.update = update.map(str::to_string);
    }
    Some(project)
}
