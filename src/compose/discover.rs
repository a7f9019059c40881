//! Finds compose projects beneath a root directory.

use super::parser;
use crate::error::Error;
use crate::registry::{ParseError, Project};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The two accepted spellings of the definition filename. When one
/// directory contains both, the `.yml` spelling wins.
pub const COMPOSE_FILENAMES: [&str; 2] = ["docker-compose.yml", "docker-compose.yaml"];

/// Directory names never descended into.
pub const DEFAULT_DENYLIST: [&str; 4] = [".devcontainer", ".git", "node_modules", "target"];

/// Recursive scanner for compose definition files.
pub struct Discoverer {
    root: PathBuf,
    denylist: Vec<String>,
}

impl Discoverer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_denylist(root: impl Into<PathBuf>, denylist: Vec<String>) -> Self {
        Self {
            root: root.into(),
            denylist,
        }
    }

    /// Walk the tree and produce one [`Project`] per matching directory, in
    /// traversal order (sorted, so stable for a given tree).
    ///
    /// Read or parse failures for one file become [`ParseError`] records on
    /// that file's project; they never abort discovery of sibling files.
    /// This walks the filesystem synchronously; callers on the async path
    /// wrap it in `spawn_blocking`.
    pub fn discover(&self) -> Vec<Project> {
        let mut order: Vec<PathBuf> = Vec::new();
        let mut chosen: HashMap<PathBuf, PathBuf> = HashMap::new();

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.file_type().is_dir() && entry.depth() > 0 {
                    let name = entry.file_name().to_string_lossy();
                    if self.denylist.iter().any(|deny| deny.as_str() == name) {
                        tracing::debug!("Pruning denylisted directory {}", entry.path().display());
                        return false;
                    }
                }
                true
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if !COMPOSE_FILENAMES.contains(&file_name.as_ref()) {
                continue;
            }

            let Some(dir) = entry.path().parent().map(Path::to_path_buf) else {
                continue;
            };
            match chosen.get(&dir) {
                None => {
                    order.push(dir.clone());
                    chosen.insert(dir, entry.path().to_path_buf());
                }
                // Both spellings in one directory: the .yml one wins.
                Some(existing) if file_name == COMPOSE_FILENAMES[0] => {
                    tracing::warn!(
                        "Both compose spellings in {}; using {} over {}",
                        dir.display(),
                        file_name,
                        existing.display()
                    );
                    chosen.insert(dir, entry.path().to_path_buf());
                }
                Some(_) => {}
            }
        }

        order
            .into_iter()
            .filter_map(|dir| chosen.remove(&dir))
            .map(|file| self.load_project(file))
            .collect()
    }

    fn load_project(&self, file: PathBuf) -> Project {
        let content = match std::fs::read_to_string(&file) {
            Ok(content) => content,
            Err(source) => {
                let err = Error::DiscoveryIo {
                    path: file.clone(),
                    source,
                };
                tracing::warn!("{}", err);
                return Project::new(
                    file.clone(),
                    Vec::new(),
                    vec![ParseError {
                        path: file,
                        message: err.to_string(),
                    }],
                );
            }
        };

        match parser::parse_services(&file, &content) {
            Ok(services) => Project::new(file, services, Vec::new()),
            Err(err) => {
                tracing::warn!("{}", err);
                Project::new(
                    file.clone(),
                    Vec::new(),
                    vec![ParseError {
                        path: file,
                        message: err.to_string(),
                    }],
                )
            }
        }
    }
}
