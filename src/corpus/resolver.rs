//! Ordered corpus-file resolution
//!
//! The search order is data, not branching: an ordered directory list
//! crossed with an ordered filename list, first existing file wins. This
//! keeps resolution deterministic and lets tests assert the priority order
//! directly.
//!
//! Directory priority: literal caller path, mounted codebase root, local
//! relative codebase directory, application root. Filename priority:
//! the override alone when given, otherwise `codebase.xml` > `.txt` >
//! `.md` > `.json`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::CorpusConfig;

/// Default corpus filenames, in match-priority order.
pub const DEFAULT_FILENAMES: [&str; 4] =
    ["codebase.xml", "codebase.txt", "codebase.md", "codebase.json"];

/// Which candidate directory produced the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMethod {
    /// The path exactly as supplied by the caller
    LiteralPath,
    /// Mounted codebase root (+ project subdirectory)
    MountRoot,
    /// Local relative codebase directory (+ project subdirectory)
    LocalRoot,
    /// Application root directory
    AppRoot,
    /// The process-wide default corpus loaded at startup
    DefaultCorpus,
}

/// A corpus file that is known to exist, with its modification marker.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Which candidate matched
    pub method: ResolutionMethod,
    /// Modification time at resolution, used for cache invalidation
    pub modified: SystemTime,
}

/// Resolution failure. Surfaces as HTTP 404.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// No candidate existed; carries the full search list for diagnostics.
    /// The list is server-side path structure, safe to expose.
    #[error("no corpus file found; searched: {}", joined(.searched))]
    NotFound {
        /// Every candidate path tested, in search order
        searched: Vec<PathBuf>,
    },

    /// The request named no project and no filename, and no default corpus
    /// was loaded at startup
    #[error("no default corpus loaded; specify a project or filename")]
    NoDefaultLoaded,
}

fn joined(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Maps project references to concrete corpus files.
pub struct ProjectResolver {
    mount_root: PathBuf,
    local_root: PathBuf,
    app_root: PathBuf,
    default_file: Option<ResolvedFile>,
}

impl ProjectResolver {
    /// Create a resolver over the configured candidate roots.
    #[must_use]
    pub fn new(config: &CorpusConfig) -> Self {
        Self {
            mount_root: config.mount_root.clone(),
            local_root: config.local_root.clone(),
            app_root: config.app_root.clone(),
            default_file: None,
        }
    }

    /// Record the process-wide default corpus served by the query-only route.
    pub fn set_default(&mut self, resolved: ResolvedFile) {
        self.default_file = Some(ResolvedFile {
            method: ResolutionMethod::DefaultCorpus,
            ..resolved
        });
    }

    /// The default corpus, if one was loaded at startup.
    #[must_use]
    pub fn default_file(&self) -> Option<&ResolvedFile> {
        self.default_file.as_ref()
    }

    /// Resolve a project name and optional filename override to a corpus
    /// file.
    ///
    /// # Errors
    ///
    /// [`ResolveError::NotFound`] when no candidate exists;
    /// [`ResolveError::NoDefaultLoaded`] when neither a project nor a
    /// filename was given and no default corpus is loaded.
    pub fn resolve(
        &self,
        project: Option<&str>,
        filename: Option<&str>,
    ) -> Result<ResolvedFile, ResolveError> {
        if project.is_none() && filename.is_none() {
            return self
                .default_file
                .clone()
                .ok_or(ResolveError::NoDefaultLoaded);
        }

        let filenames: Vec<&str> = match filename {
            Some(name) => vec![name],
            None => DEFAULT_FILENAMES.to_vec(),
        };

        let directories: Vec<(ResolutionMethod, PathBuf)> = match project {
            Some(p) => vec![
                (ResolutionMethod::LiteralPath, PathBuf::from(p)),
                (ResolutionMethod::MountRoot, self.mount_root.join(p)),
                (ResolutionMethod::LocalRoot, self.local_root.join(p)),
                (ResolutionMethod::AppRoot, self.app_root.clone()),
            ],
            None => vec![
                (ResolutionMethod::LiteralPath, PathBuf::new()),
                (ResolutionMethod::MountRoot, self.mount_root.clone()),
                (ResolutionMethod::LocalRoot, self.local_root.clone()),
                (ResolutionMethod::AppRoot, self.app_root.clone()),
            ],
        };

        Self::first_match(&directories, &filenames)
    }

    /// Resolve a corpus file path given on the command line at startup.
    ///
    /// Mirrors the candidate order for literal files: the path itself, then
    /// relative to the application root, the local codebase directory, and
    /// the mounted codebase root.
    ///
    /// # Errors
    ///
    /// [`ResolveError::NotFound`] when the file exists at none of the
    /// candidates.
    pub fn resolve_startup_file(&self, path: &Path) -> Result<ResolvedFile, ResolveError> {
        let directories = vec![
            (ResolutionMethod::LiteralPath, PathBuf::new()),
            (ResolutionMethod::AppRoot, self.app_root.clone()),
            (ResolutionMethod::LocalRoot, self.local_root.clone()),
            (ResolutionMethod::MountRoot, self.mount_root.clone()),
        ];
        let name = path.to_string_lossy();
        Self::first_match(&directories, &[name.as_ref()])
    }

    fn first_match(
        directories: &[(ResolutionMethod, PathBuf)],
        filenames: &[&str],
    ) -> Result<ResolvedFile, ResolveError> {
        let mut searched = Vec::new();

        for (method, dir) in directories {
            for name in filenames {
                let candidate = dir.join(name);
                match std::fs::metadata(&candidate) {
                    Ok(meta) if meta.is_file() => {
                        let path = candidate.canonicalize().unwrap_or(candidate);
                        tracing::debug!(path = %path.display(), "Resolved corpus file");
                        return Ok(ResolvedFile {
                            path,
                            method: *method,
                            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                        });
                    }
                    _ => searched.push(candidate),
                }
            }
        }

        Err(ResolveError::NotFound { searched })
    }
}
