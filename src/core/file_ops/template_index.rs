use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::scanner::FileScanner;
use crate::core::pld::city_template_name;
use crate::models::LabelBoxError;

/// One indexed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    pub stem_lower: String,
    pub name_lower: String,
    pub path: PathBuf,
}

/// Case-insensitive filename index over a template tree
#[derive(Debug, Clone, Default)]
pub struct TemplateIndex {
    by_name: HashMap<String, PathBuf>,
    entries: Vec<TemplateEntry>,
}

impl TemplateIndex {
    /// Index every `.pld` below `dir`; the first occurrence of a filename wins
    pub fn build(dir: &Path) -> Result<Self, LabelBoxError> {
        let files = FileScanner::new().scan(dir)?;
        let mut index = Self::default();

        for file in files {
            let Some(name) = file.path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
                continue;
            };
            if index.by_name.contains_key(&name) {
                debug!(path = %file.path.display(), "duplicate template ignored");
                continue;
            }
            let stem_lower = file
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            index.by_name.insert(name.clone(), file.path.clone());
            index.entries.push(TemplateEntry {
                stem_lower,
                name_lower: name,
                path: file.path,
            });
        }

        debug!(dir = %dir.display(), templates = index.entries.len(), "template index built");
        Ok(index)
    }

    /// Lookup by filename, ignoring case
    pub fn get(&self, name: &str) -> Option<&Path> {
        self.by_name.get(&name.to_lowercase()).map(PathBuf::as_path)
    }

    /// Hits for `candidates`, in candidate order, de-duplicated by path
    pub fn find_all(&self, candidates: &[String]) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        candidates
            .iter()
            .filter_map(|name| self.get(name))
            .filter(|p| seen.insert(p.to_path_buf()))
            .map(Path::to_path_buf)
            .collect()
    }

    /// Entries in index order
    pub fn entries(&self) -> &[TemplateEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Directory lookup result with every path that was tried
#[derive(Debug, Clone)]
pub struct DirResolution {
    pub found: Option<PathBuf>,
    pub tried: Vec<PathBuf>,
}

impl DirResolution {
    /// Turn a miss into `TemplateDirMissing` listing the tried paths
    pub fn require(self, what: &str) -> Result<PathBuf, LabelBoxError> {
        match self.found {
            Some(dir) => Ok(dir),
            None => {
                let tried = self
                    .tried
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(LabelBoxError::TemplateDirMissing(format!("{}（已尝试：{}）", what, tried)))
            }
        }
    }
}

fn subdirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect()
        })
        .unwrap_or_default();
    dirs.sort();
    dirs
}

fn first_existing(candidates: Vec<PathBuf>) -> DirResolution {
    let mut tried: Vec<PathBuf> = Vec::new();
    for p in candidates {
        if !tried.contains(&p) {
            tried.push(p);
        }
    }
    let found = tried.iter().find(|p| p.is_dir()).cloned();
    DirResolution { found, tried }
}

/// Locate `<kind>` (e.g. "3C标签") below the template root
///
/// Tried in order: `标签模板/<kind>`, `<kind>`, `标签模板文件夹/<kind>`,
/// then `<subdir>/<kind>` for each direct subdirectory.
pub fn resolve_label_template_dir(root: &Path, kind: &str) -> DirResolution {
    let mut candidates = vec![
        root.join("标签模板").join(kind),
        root.join(kind),
        root.join("标签模板文件夹").join(kind),
    ];
    candidates.extend(subdirs(root).into_iter().map(|d| d.join(kind)));
    first_existing(candidates)
}

/// Locate `<kind>` (e.g. "3C箱唛") below the template root
///
/// Tried in order: `箱唛模板/<kind>`, `<kind>`, then `<subdir>/箱唛模板/<kind>`
/// and `<subdir>/<kind>` for each direct subdirectory.
pub fn resolve_box_template_dir(root: &Path, kind: &str) -> DirResolution {
    let mut candidates = vec![root.join("箱唛模板").join(kind), root.join(kind)];
    for d in subdirs(root) {
        candidates.push(d.join("箱唛模板").join(kind));
        candidates.push(d.join(kind));
    }
    first_existing(candidates)
}

/// Box-mark template for `city`: `<city>箱唛.pld`, else any file whose name
/// contains the city and "箱唛" with a `.pld` extension
pub fn find_city_template(dir: &Path, city: &str) -> Option<PathBuf> {
    let exact = dir.join(city_template_name(city));
    if exact.is_file() {
        return Some(exact);
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files.into_iter().find(|p| {
        let name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let is_pld = p
            .extension()
            .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case("pld"));
        name.contains(city) && name.contains("箱唛") && is_pld
    })
}
