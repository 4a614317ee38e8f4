//! Propeller template mapping.
//!
//! Propeller rows cannot be matched by identifier, so their template comes
//! from a product-code map with three sources: built-in defaults, a JSON
//! sidecar maintained by the operator, and codes discovered in template
//! filenames. Precedence is defaults > JSON > discovered.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::core::file_ops::{FileScanner, TemplateIndex};
use crate::core::pld::scanner::digit_runs;
use crate::models::{LabelBoxError, MatchingConfig};

/// Built-in product code → template filename
pub const STATIC_PROPELLER_MAP: [(&str, &str); 5] = [
    ("100181107889", "外星人螺旋桨.pld"),
    ("100235985474", "三只梨螺旋桨.pld"),
    ("100264779838", "兽螺旋桨.pld"),
    ("100144781118", "901螺旋桨.pld"),
    ("100131174559", "909螺旋桨.pld"),
];

/// Category marker of propeller rows
pub const PROPELLER_MARKER: &str = "螺旋桨";

/// Key used for shop-level propeller templates
pub fn shop_key(shop: &str) -> String {
    format!("店铺_{}", shop)
}

pub fn static_map() -> BTreeMap<String, String> {
    STATIC_PROPELLER_MAP
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn is_propeller_name(name: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| name.contains(k.as_str()))
}

/// JSON sidecar of product code → template filename mappings
///
/// Stored as a flat JSON object. The map keeps the file's key order
/// (serde_json `preserve_order`); every value is a string.
#[derive(Debug, Clone, Default)]
pub struct ProductCodeStore {
    path: Option<PathBuf>,
    mappings: Map<String, Value>,
}

impl ProductCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a sidecar; a missing file yields an empty store bound to `path`
    pub fn load(path: &Path) -> Result<Self, LabelBoxError> {
        if !path.exists() {
            debug!(path = %path.display(), "product-code map not found, starting empty");
            return Ok(Self {
                path: Some(path.to_path_buf()),
                mappings: Map::new(),
            });
        }

        let text = std::fs::read_to_string(path)?;
        let mappings: Map<String, Value> = serde_json::from_str(&text).map_err(|e| {
            LabelBoxError::Mapping(format!("{}: {}", path.display(), e))
        })?;
        if let Some((code, other)) = mappings.iter().find(|(_, v)| !v.is_string()) {
            return Err(LabelBoxError::Mapping(format!(
                "{}: {} 的值不是文件名: {}",
                path.display(),
                code,
                other
            )));
        }
        info!(path = %path.display(), count = mappings.len(), "product-code map loaded");
        Ok(Self {
            path: Some(path.to_path_buf()),
            mappings,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, code: &str) -> Option<&str> {
        self.mappings.get(code).and_then(Value::as_str)
    }

    /// Add or replace a mapping; `.pld` is appended when missing.
    ///
    /// A replaced mapping keeps its position.
    ///
    /// # Returns
    /// * The previous filename for `code`, if any
    pub fn add(&mut self, code: &str, filename: &str) -> Result<Option<String>, LabelBoxError> {
        let code = code.trim();
        let filename = filename.trim();
        if code.is_empty() || filename.is_empty() {
            return Err(LabelBoxError::Mapping("商品编号和文件名不能为空".to_string()));
        }
        let filename = if filename.ends_with(".pld") {
            filename.to_string()
        } else {
            format!("{}.pld", filename)
        };

        Ok(match self.mappings.insert(code.to_string(), Value::String(filename)) {
            Some(Value::String(previous)) => Some(previous),
            _ => None,
        })
    }

    /// Remove a mapping and return its filename; the remaining order is kept
    pub fn remove(&mut self, code: &str) -> Option<String> {
        match self.mappings.shift_remove(code)? {
            Value::String(name) => Some(name),
            _ => None,
        }
    }

    /// All mappings in file order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.mappings
            .iter()
            .filter_map(|(code, name)| name.as_str().map(|n| (code.as_str(), n)))
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Save to the path the store was loaded from
    pub fn save(&self) -> Result<(), LabelBoxError> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| LabelBoxError::Mapping("映射文件路径未设置".to_string()))?;
        self.save_to(path)
    }

    /// Write pretty UTF-8 JSON; non-ASCII text is kept as is
    pub fn save_to(&self, path: &Path) -> Result<(), LabelBoxError> {
        let text = serde_json::to_string_pretty(&self.mappings)
            .map_err(|e| LabelBoxError::Mapping(format!("序列化映射失败: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Propeller templates under `template_dir` not referenced by this store
    /// or the built-in map
    pub fn find_unmapped(&self, template_dir: &Path, keywords: &[String]) -> Result<Vec<String>, LabelBoxError> {
        if !template_dir.is_dir() {
            return Err(LabelBoxError::TemplateDirMissing(template_dir.display().to_string()));
        }
        let mapped: Vec<&str> = self
            .iter()
            .map(|(_, name)| name)
            .chain(STATIC_PROPELLER_MAP.iter().map(|(_, v)| *v))
            .collect();

        let mut unmapped = Vec::new();
        for file in FileScanner::new().scan(template_dir)? {
            let name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if is_propeller_name(&name, keywords) && !mapped.contains(&name.as_str()) && !unmapped.contains(&name) {
                unmapped.push(name);
            }
        }
        Ok(unmapped)
    }
}

/// Codes discovered in propeller template filenames
///
/// A filename with a propeller keyword maps its first 10+ digit code, or
/// `店铺_<prefix>` for the first shop prefix it contains. The first file wins.
pub fn discover(index: &TemplateIndex, keywords: &[String], shop_prefixes: &[String]) -> BTreeMap<String, String> {
    let mut found = BTreeMap::new();
    for entry in index.entries() {
        let name = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !is_propeller_name(&name, keywords) {
            continue;
        }

        let key = match digit_runs(name.as_bytes(), 10, usize::MAX).first() {
            Some(run) => Some(name[run.clone()].to_string()),
            None => shop_prefixes
                .iter()
                .find(|p| name.contains(p.as_str()))
                .map(|p| shop_key(p)),
        };
        if let Some(key) = key {
            found.entry(key).or_insert(name);
        }
    }
    found
}

/// Inputs of one propeller lookup
#[derive(Debug, Clone, Copy)]
pub struct PropellerQuery<'a> {
    pub sku: &'a str,
    pub identifier: &'a str,
    pub shop: Option<&'a str>,
}

/// Resolved propeller template and the strategy that found it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropellerHit {
    pub filename: String,
    pub strategy: &'static str,
}

type PropellerStrategy = fn(&PropellerCatalog, &PropellerQuery<'_>) -> Option<String>;

fn by_static_map(catalog: &PropellerCatalog, q: &PropellerQuery<'_>) -> Option<String> {
    lookup_code(&catalog.static_map, q)
}

fn by_merged_map(catalog: &PropellerCatalog, q: &PropellerQuery<'_>) -> Option<String> {
    lookup_code(&catalog.merged, q)
}

fn by_shop_key(catalog: &PropellerCatalog, q: &PropellerQuery<'_>) -> Option<String> {
    catalog.merged.get(&shop_key(q.shop?)).cloned()
}

fn by_sku_in_filename(catalog: &PropellerCatalog, q: &PropellerQuery<'_>) -> Option<String> {
    if q.sku.chars().count() < 6 {
        return None;
    }
    catalog
        .propeller_files
        .iter()
        .find(|name| name.contains(q.sku))
        .cloned()
}

fn by_shop_filename(catalog: &PropellerCatalog, q: &PropellerQuery<'_>) -> Option<String> {
    let shop = q.shop?;
    catalog
        .propeller_files
        .iter()
        .find(|name| name.contains(shop))
        .cloned()
}

fn by_first_propeller_file(catalog: &PropellerCatalog, _q: &PropellerQuery<'_>) -> Option<String> {
    catalog.propeller_files.first().cloned()
}

fn lookup_code(map: &BTreeMap<String, String>, q: &PropellerQuery<'_>) -> Option<String> {
    [q.sku, q.identifier]
        .into_iter()
        .filter(|k| !k.is_empty())
        .find_map(|k| map.get(k).cloned())
}

/// Ordered strategies; the first success wins
const STRATEGIES: &[(&str, PropellerStrategy)] = &[
    ("static", by_static_map),
    ("merged", by_merged_map),
    ("shop_key", by_shop_key),
    ("sku_in_filename", by_sku_in_filename),
    ("shop_filename", by_shop_filename),
    ("first_file", by_first_propeller_file),
];

/// Product-code map for one run, built once and passed by reference
#[derive(Debug, Clone, Default)]
pub struct PropellerCatalog {
    static_map: BTreeMap<String, String>,
    merged: BTreeMap<String, String>,
    /// Propeller template filenames in index order
    propeller_files: Vec<String>,
}

impl PropellerCatalog {
    /// Merge the three sources with precedence static > JSON > discovered
    pub fn merge<'a>(
        static_map: BTreeMap<String, String>,
        json: impl IntoIterator<Item = (&'a str, &'a str)>,
        discovered: BTreeMap<String, String>,
    ) -> Self {
        let mut merged = discovered;
        for (k, v) in json {
            merged.insert(k.to_string(), v.to_string());
        }
        for (k, v) in &static_map {
            merged.insert(k.clone(), v.clone());
        }
        Self {
            static_map,
            merged,
            propeller_files: Vec::new(),
        }
    }

    /// Catalog for a template index with the configured keywords and shops
    pub fn build(index: &TemplateIndex, config: &MatchingConfig, store: &ProductCodeStore) -> Self {
        let discovered = discover(index, &config.propeller_keywords, &config.shop_prefixes);
        let mut catalog = Self::merge(static_map(), store.iter(), discovered);
        catalog.propeller_files = index
            .entries()
            .iter()
            .filter_map(|e| e.path.file_name().map(|n| n.to_string_lossy().to_string()))
            .filter(|name| is_propeller_name(name, &config.propeller_keywords))
            .collect();
        debug!(
            mappings = catalog.merged.len(),
            files = catalog.propeller_files.len(),
            "propeller catalog built"
        );
        catalog
    }

    pub fn with_propeller_files(mut self, files: Vec<String>) -> Self {
        self.propeller_files = files;
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.merged.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    /// Template filename for a propeller row
    pub fn find_template(&self, query: &PropellerQuery<'_>) -> Option<PropellerHit> {
        STRATEGIES.iter().find_map(|(name, strategy)| {
            strategy(self, query).map(|filename| PropellerHit {
                filename,
                strategy: *name,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn keywords() -> Vec<String> {
        MatchingConfig::default().propeller_keywords
    }

    fn index_with(files: &[&str]) -> (TempDir, TemplateIndex) {
        let dir = TempDir::new().unwrap();
        for f in files {
            fs::write(dir.path().join(f), b"pld").unwrap();
        }
        let index = TemplateIndex::build(dir.path()).unwrap();
        (dir, index)
    }

    #[test]
    fn test_store_add_remove_and_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("propeller_mappings.json");

        let mut store = ProductCodeStore::load(&path).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.add("100999", "兽新螺旋桨").unwrap(), None);
        assert_eq!(store.add("100888", "外星人螺旋桨.pld").unwrap(), None);
        assert_eq!(
            store.add("100999", "兽螺旋桨V2.pld").unwrap(),
            Some("兽新螺旋桨.pld".to_string())
        );
        store.save().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("兽螺旋桨V2.pld"));

        let mut loaded = ProductCodeStore::load(&path).unwrap();
        assert!(loaded.iter().eq(store.iter()));
        assert_eq!(loaded.remove("100888"), Some("外星人螺旋桨.pld".to_string()));
        assert_eq!(loaded.remove("100888"), None);
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_store_keeps_file_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.json");
        fs::write(&path, r#"{"300": "c.pld", "100": "a.pld", "200": "b.pld"}"#).unwrap();

        let mut store = ProductCodeStore::load(&path).unwrap();
        assert_eq!(store.get("100"), Some("a.pld"));
        assert_eq!(store.add("300", "c2").unwrap(), Some("c.pld".to_string()));
        assert_eq!(store.remove("100"), Some("a.pld".to_string()));
        store.add("050", "z.pld").unwrap();
        store.save().unwrap();

        let codes: Vec<String> = ProductCodeStore::load(&path)
            .unwrap()
            .iter()
            .map(|(code, _)| code.to_string())
            .collect();
        assert_eq!(codes, vec!["300", "200", "050"]);
    }

    #[test]
    fn test_store_rejects_bad_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.json");
        fs::write(&path, r#"{"1001": 5}"#).unwrap();
        assert!(matches!(ProductCodeStore::load(&path), Err(LabelBoxError::Mapping(_))));
        fs::write(&path, "[]").unwrap();
        assert!(ProductCodeStore::load(&path).is_err());
        assert!(ProductCodeStore::new().add("", "x").is_err());
    }

    #[test]
    fn test_discover_codes_and_shops() {
        let (_dir, index) = index_with(&["1234567890123螺旋桨.pld", "三只梨螺桨.pld", "兽螺旋桨B.pld", "兽螺旋桨A.pld", "A1.pld"]);
        let found = discover(&index, &keywords(), &MatchingConfig::default().shop_prefixes);
        assert_eq!(found.get("1234567890123").map(String::as_str), Some("1234567890123螺旋桨.pld"));
        assert_eq!(found.get("店铺_三只梨").map(String::as_str), Some("三只梨螺桨.pld"));
        // first file in index order wins
        assert_eq!(found.get("店铺_兽").map(String::as_str), Some("兽螺旋桨A.pld"));
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_static_beats_discovered() {
        let (_dir, index) = index_with(&["100181107889螺旋桨.pld", "外星人螺旋桨.pld"]);
        let catalog = PropellerCatalog::build(&index, &MatchingConfig::default(), &ProductCodeStore::new());
        let hit = catalog
            .find_template(&PropellerQuery {
                sku: "100181107889",
                identifier: "",
                shop: Some("外星人"),
            })
            .unwrap();
        assert_eq!(hit.filename, "外星人螺旋桨.pld");
        assert_eq!(hit.strategy, "static");
    }

    #[test]
    fn test_merge_precedence() {
        let json = [("A", "json.pld"), ("B", "json-b.pld")];
        let mut discovered = BTreeMap::new();
        discovered.insert("B".to_string(), "disc-b.pld".to_string());
        discovered.insert("C".to_string(), "disc-c.pld".to_string());
        let mut statics = BTreeMap::new();
        statics.insert("A".to_string(), "static.pld".to_string());

        let catalog = PropellerCatalog::merge(statics, json, discovered);
        assert_eq!(catalog.get("A"), Some("static.pld"));
        assert_eq!(catalog.get("B"), Some("json-b.pld"));
        assert_eq!(catalog.get("C"), Some("disc-c.pld"));
    }

    #[test]
    fn test_strategy_chain_fallbacks() {
        let catalog = PropellerCatalog::merge(BTreeMap::new(), [], BTreeMap::new()).with_propeller_files(vec![
            "通用螺旋桨.pld".to_string(),
            "兽螺旋桨-7777777.pld".to_string(),
            "三只梨螺旋桨.pld".to_string(),
        ]);

        let q = |sku, shop| PropellerQuery { sku, identifier: "", shop };
        let hit = catalog.find_template(&q("7777777", Some("兽"))).unwrap();
        assert_eq!((hit.filename.as_str(), hit.strategy), ("兽螺旋桨-7777777.pld", "sku_in_filename"));

        let hit = catalog.find_template(&q("12", Some("三只梨"))).unwrap();
        assert_eq!((hit.filename.as_str(), hit.strategy), ("三只梨螺旋桨.pld", "shop_filename"));

        let hit = catalog.find_template(&q("12", None)).unwrap();
        assert_eq!((hit.filename.as_str(), hit.strategy), ("通用螺旋桨.pld", "first_file"));

        let empty = PropellerCatalog::default();
        assert!(empty.find_template(&q("12", None)).is_none());
    }

    #[test]
    fn test_shop_key_strategy() {
        let key = shop_key("兽");
        let catalog = PropellerCatalog::merge(BTreeMap::new(), [(key.as_str(), "兽螺旋桨.pld")], BTreeMap::new());
        let hit = catalog
            .find_template(&PropellerQuery { sku: "1", identifier: "x", shop: Some("兽") })
            .unwrap();
        assert_eq!(hit.strategy, "shop_key");
    }

    #[test]
    fn test_find_unmapped() {
        let (dir, _index) = index_with(&["外星人螺旋桨.pld", "新款螺旋桨.pld", "A1.pld"]);
        let store = ProductCodeStore::new();
        let unmapped = store.find_unmapped(dir.path(), &keywords()).unwrap();
        assert_eq!(unmapped, vec!["新款螺旋桨.pld".to_string()]);
        assert!(store.find_unmapped(&dir.path().join("none"), &keywords()).is_err());
    }
}
