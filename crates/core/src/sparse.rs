//! Sparse view (spec §4.5, C6): a kernel wrapper that only exposes entries
//! matching configured include/exclude globs, with gitignore ingestion and
//! named preset pattern sets.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::entry::EntryType;
use crate::error::{ErrorCode, FsError, FsResult};
use crate::glob::{GlobMatcher, GlobOptions};
use crate::kernel::{Kernel, ReaddirOptions, ReaddirResult};
use crate::path;

#[derive(Debug, Clone)]
pub struct SparseConfig {
    pub patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub root: Option<String>,
    /// When true, bare `.` entries are matched like any other pattern;
    /// SparseFS defaults this to `false` like shell globbing.
    pub include_dot_files: bool,
}

impl SparseConfig {
    pub fn validate(&self) -> FsResult<()> {
        if self.patterns.is_empty() {
            return Err(FsError::einval("sparse view requires at least one include pattern"));
        }
        Ok(())
    }
}

pub struct SparseFs<'k> {
    kernel: &'k Kernel,
    includes: Vec<GlobMatcher>,
    excludes: Vec<GlobMatcher>,
    root: String,
    include_dot_files: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    File,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, Default)]
pub struct SparseReaddirOptions {
    pub name_glob: Option<String>,
    pub type_filter: Option<TypeFilter>,
    pub include_hidden: bool,
}

#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: String,
    pub name: String,
    pub entry_type: EntryType,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    pub max_depth: Option<usize>,
    pub include_dot_files: bool,
}

impl<'k> SparseFs<'k> {
    pub fn new(kernel: &'k Kernel, config: SparseConfig) -> FsResult<Self> {
        config.validate()?;
        let opts = GlobOptions { dot: config.include_dot_files };
        let includes = config
            .patterns
            .iter()
            .map(|p| GlobMatcher::compile_with(p, opts))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FsError::einval(e.to_string()))?;
        let excludes = config
            .exclude_patterns
            .iter()
            .map(|p| GlobMatcher::compile_with(p, opts))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FsError::einval(e.to_string()))?;
        Ok(Self {
            kernel,
            includes,
            excludes,
            root: config.root.map(|r| path::canonicalize(&r)).unwrap_or_else(|| "/".to_string()),
            include_dot_files: config.include_dot_files,
        })
    }

    /// Parses a `.gitignore`-style file read from the virtual filesystem at
    /// `gitignore_path` and folds its patterns into `exclude_patterns` before
    /// building the wrapper (spec §4.5 "Gitignore ingestion").
    pub async fn from_gitignore(
        kernel: &'k Kernel,
        mut config: SparseConfig,
        gitignore_path: &str,
    ) -> FsResult<Self> {
        let data = kernel.read_file(gitignore_path, None, None).await?;
        let text = String::from_utf8_lossy(&data);
        config.exclude_patterns.extend(parse_gitignore(&text));
        Self::new(kernel, config)
    }

    fn stripped(&self, p: &str) -> String {
        let canon = path::canonicalize(p);
        let rel = path::relative(&self.root, &canon);
        if rel.is_empty() { ".".to_string() } else { rel }
    }

    pub fn should_include(&self, p: &str) -> bool {
        let rel = self.stripped(p);
        if !self.include_dot_files && rel.split('/').any(|seg| seg.starts_with('.')) {
            return false;
        }
        let included = self.includes.iter().any(|g| g.is_match(&rel));
        if !included {
            return false;
        }
        !self.excludes.iter().any(|g| g.is_match(&rel))
    }

    /// Whether a directory at relative path `rel` could contain a match —
    /// used to short-circuit traversal instead of descending everywhere.
    fn could_contain_match(&self, rel: &str) -> bool {
        self.includes.iter().any(|g| g.could_match_prefix(rel))
    }

    pub async fn read_file(&self, p: &str) -> FsResult<Vec<u8>> {
        if !self.should_include(p) {
            return Err(FsError::enoent(p.to_string()));
        }
        self.kernel.read_file(p, None, None).await
    }

    pub async fn stat(&self, p: &str) -> FsResult<crate::entry::Stat> {
        if !self.should_include(p) {
            return Err(FsError::enoent(p.to_string()));
        }
        self.kernel.stat(p).await
    }

    pub async fn exists(&self, p: &str) -> FsResult<bool> {
        if !self.should_include(p) {
            return Ok(false);
        }
        self.kernel.exists(p).await
    }

    pub async fn readdir(&self, p: &str, opts: SparseReaddirOptions) -> FsResult<Vec<crate::entry::Dirent>> {
        let ReaddirResult::Dirents(all) =
            self.kernel.readdir(p, ReaddirOptions { with_file_types: true, recursive: false }).await?
        else {
            unreachable!("with_file_types always yields Dirents")
        };
        let name_glob = opts
            .name_glob
            .as_deref()
            .map(GlobMatcher::compile)
            .transpose()
            .map_err(|e| FsError::einval(e.to_string()))?;

        let mut out = Vec::new();
        for dirent in all {
            if !opts.include_hidden && dirent.name.starts_with('.') {
                continue;
            }
            if !self.should_include(&dirent.path) {
                continue;
            }
            if let Some(ref g) = name_glob {
                if !g.is_match(&dirent.name) {
                    continue;
                }
            }
            if let Some(filter) = opts.type_filter {
                let matches = match (filter, dirent.entry_type) {
                    (TypeFilter::File, EntryType::File) => true,
                    (TypeFilter::Directory, EntryType::Directory) => true,
                    (TypeFilter::Symlink, EntryType::Symlink) => true,
                    _ => false,
                };
                if !matches {
                    continue;
                }
            }
            out.push(dirent);
        }
        Ok(out)
    }

    /// Depth-first pre-order walk of included entries, skipping directories
    /// that cannot possibly match (spec §4.5).
    pub async fn walk(&self, root: &str, opts: WalkOptions) -> FsResult<Vec<WalkEntry>> {
        let mut out = Vec::new();
        self.walk_inner(root, 0, opts, &mut out).await?;
        Ok(out)
    }

    #[allow(clippy::only_used_in_recursion)]
    fn walk_inner<'a>(
        &'a self,
        dir: &'a str,
        depth: usize,
        opts: WalkOptions,
        out: &'a mut Vec<WalkEntry>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = FsResult<()>> + 'a>> {
        Box::pin(async move {
            if let Some(max) = opts.max_depth {
                if depth > max {
                    return Ok(());
                }
            }
            let ReaddirResult::Dirents(children) = self
                .kernel
                .readdir(dir, ReaddirOptions { with_file_types: true, recursive: false })
                .await?
            else {
                unreachable!()
            };
            for child in children {
                if !opts.include_dot_files && child.name.starts_with('.') {
                    continue;
                }
                let rel = self.stripped(&child.path);
                if matches!(child.entry_type, EntryType::Directory) {
                    if !self.could_contain_match(&rel) {
                        continue;
                    }
                    if self.should_include(&child.path) {
                        out.push(WalkEntry {
                            path: child.path.clone(),
                            name: child.name.clone(),
                            entry_type: child.entry_type,
                            depth,
                        });
                    }
                    self.walk_inner(&child.path, depth + 1, opts, out).await?;
                } else if self.should_include(&child.path) {
                    out.push(WalkEntry {
                        path: child.path.clone(),
                        name: child.name.clone(),
                        entry_type: child.entry_type,
                        depth,
                    });
                }
            }
            Ok(())
        })
    }
}

fn parse_gitignore(text: &str) -> Vec<String> {
    let mut patterns = Vec::new();
    for raw_line in text.lines() {
        let line = raw_line.trim_end();
        if line.is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        // Negation patterns (`!pattern`) are recorded verbatim; callers that
        // want full re-inclusion semantics can special-case the `!` prefix.
        patterns.push(line.to_string());
    }
    patterns
}

/// Named preset pattern sets (spec §4.5 "Presets"), with user registration.
pub struct PresetRegistry {
    presets: Mutex<HashMap<String, Vec<String>>>,
}

impl Default for PresetRegistry {
    fn default() -> Self {
        let mut presets = HashMap::new();
        presets.insert("typescript".to_string(), vec!["**/*.ts".to_string(), "**/*.tsx".to_string()]);
        presets.insert("javascript".to_string(), vec!["**/*.js".to_string(), "**/*.jsx".to_string()]);
        presets.insert(
            "source".to_string(),
            vec!["**/*.ts".to_string(), "**/*.tsx".to_string(), "**/*.js".to_string(), "**/*.jsx".to_string(), "**/*.rs".to_string()],
        );
        presets.insert(
            "web".to_string(),
            vec!["**/*.html".to_string(), "**/*.css".to_string(), "**/*.js".to_string(), "**/*.jsx".to_string()],
        );
        presets.insert(
            "config".to_string(),
            vec!["**/*.json".to_string(), "**/*.toml".to_string(), "**/*.yaml".to_string(), "**/*.yml".to_string()],
        );
        Self { presets: Mutex::new(presets) }
    }
}

impl PresetRegistry {
    pub fn register(&self, name: &str, patterns: Vec<String>) {
        self.presets.lock().unwrap().insert(name.to_string(), patterns);
    }

    pub fn get(&self, name: &str) -> Option<Vec<String>> {
        self.presets.lock().unwrap().get(name).cloned()
    }
}
