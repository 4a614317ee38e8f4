use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::error::LabelBoxError;

/// How the label category (3C / toy) is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TypeMode {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "3c")]
    ThreeC,
    #[serde(rename = "toy")]
    Toy,
}

/// Which outputs a run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputMode {
    #[default]
    Both,
    Label,
    Box,
    Reservation,
}

impl OutputMode {
    pub fn generates_labels(self) -> bool {
        matches!(self, OutputMode::Both | OutputMode::Label)
    }

    pub fn generates_box_marks(self) -> bool {
        matches!(self, OutputMode::Both | OutputMode::Box)
    }
}

/// Configuration handed over by the UI for one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Workbook with the distribution sheets and the box-mark sheet
    pub workbook_path: PathBuf,
    /// Root holding `标签模板/` and `箱唛模板/`
    pub template_root: PathBuf,
    /// Output base directory (defaults to the user's download folder)
    #[serde(default)]
    pub output_base: Option<PathBuf>,
    #[serde(default)]
    pub type_mode: TypeMode,
    #[serde(default)]
    pub output_mode: OutputMode,
    #[serde(default)]
    pub create_zip: bool,
    #[serde(default)]
    pub save_log: bool,
    /// Keep a `.bak` copy before the date patch rewrites a label
    #[serde(default)]
    pub make_backup: bool,
    /// Restrict label generation to these shop folders (empty = all)
    #[serde(default)]
    pub selected_shops: Vec<String>,
    /// JSON sidecar with product-code → template filename overrides
    #[serde(default)]
    pub product_map_path: Option<PathBuf>,
    #[serde(default)]
    pub matching: MatchingConfig,
}

impl RunConfig {
    pub fn new(workbook_path: impl Into<PathBuf>, template_root: impl Into<PathBuf>) -> Self {
        Self {
            workbook_path: workbook_path.into(),
            template_root: template_root.into(),
            output_base: None,
            type_mode: TypeMode::Auto,
            output_mode: OutputMode::Both,
            create_zip: false,
            save_log: false,
            make_backup: false,
            selected_shops: Vec::new(),
            product_map_path: None,
            matching: MatchingConfig::default(),
        }
    }

    /// Load a run configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self, LabelBoxError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            LabelBoxError::InvalidConfig(format!("{}: {}", path.display(), e))
        })
    }

    /// Output base, falling back to the download folder, then `~/Downloads`, then `.`
    pub fn resolved_output_base(&self) -> PathBuf {
        if let Some(base) = &self.output_base {
            return base.clone();
        }
        dirs::download_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Column positions (0-based) inside a distribution sheet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLayout {
    pub sku: usize,
    pub serial: usize,
    pub identifier: usize,
    pub category: usize,
    /// First data row (0-based; row 0 is the header)
    pub first_data_row: usize,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            sku: 0,
            serial: 3,
            identifier: 4,
            category: 4,
            first_data_row: 1,
        }
    }
}

/// Sheet → output shop folder, in processing order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetFolder {
    pub sheet: String,
    pub folder: String,
}

impl SheetFolder {
    fn new(sheet: &str, folder: &str) -> Self {
        Self {
            sheet: sheet.to_string(),
            folder: folder.to_string(),
        }
    }
}

/// Sheet naming, shop prefixes and matching knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchingConfig {
    /// Canonical sheet names, in scan order
    pub expected_sheets: Vec<String>,
    /// Canonical sheet → accepted real names
    pub sheet_aliases: BTreeMap<String, Vec<String>>,
    /// Canonical sheet → template filename prefix
    pub sheet_prefixes: BTreeMap<String, String>,
    /// Canonical sheet → shop name used by propeller lookups
    pub sheet_shops: BTreeMap<String, String>,
    pub label_folders_3c: Vec<SheetFolder>,
    pub label_folders_toy: Vec<SheetFolder>,
    /// Sheets matched on the identifier column only (no numeric-prefix fallback)
    pub identifier_only_sheets: Vec<String>,
    /// Sheets whose rows go through the configured row filter
    pub filtered_sheets: Vec<String>,
    pub reservation_sheets: Vec<String>,
    pub propeller_keywords: Vec<String>,
    pub shop_prefixes: Vec<String>,
    pub columns: ColumnLayout,
}

impl MatchingConfig {
    pub fn prefix_of(&self, sheet: &str) -> &str {
        self.sheet_prefixes.get(sheet).map(String::as_str).unwrap_or("")
    }

    pub fn shop_of(&self, sheet: &str) -> Option<&str> {
        self.sheet_shops.get(sheet).map(String::as_str)
    }

    pub fn is_identifier_only(&self, sheet: &str) -> bool {
        self.identifier_only_sheets.iter().any(|s| s == sheet)
    }

    pub fn is_filtered(&self, sheet: &str) -> bool {
        self.filtered_sheets.iter().any(|s| s == sheet)
    }

    pub fn aliases_of<'a>(&'a self, sheet: &'a str) -> Vec<&'a str> {
        match self.sheet_aliases.get(sheet) {
            Some(aliases) if !aliases.is_empty() => aliases.iter().map(String::as_str).collect(),
            _ => vec![sheet],
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let pairs = |items: &[(&str, &str)]| {
            items
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        };

        let mut sheet_aliases = BTreeMap::new();
        sheet_aliases.insert("外仓库配货表".to_string(), strings(&["外星人配货表", "外仓库配货表"]));
        sheet_aliases.insert("梨配货表".to_string(), strings(&["梨配货表"]));
        sheet_aliases.insert("兽仓库配货表".to_string(), strings(&["兽配货表", "兽仓库配货表"]));
        sheet_aliases.insert("兽无人机拆1".to_string(), strings(&["兽无人机拆1"]));
        sheet_aliases.insert("兽无人机拆2".to_string(), strings(&["兽无人机拆2"]));
        sheet_aliases.insert("兽无人机仓库配货表总".to_string(), strings(&["兽无人机仓库配货表总"]));

        Self {
            expected_sheets: strings(&[
                "外仓库配货表",
                "梨配货表",
                "兽仓库配货表",
                "兽无人机拆1",
                "兽无人机拆2",
                "兽无人机仓库配货表总",
            ]),
            sheet_aliases,
            sheet_prefixes: pairs(&[
                ("外仓库配货表", "外星人"),
                ("梨配货表", "三只梨"),
                ("兽仓库配货表", "兽"),
                ("兽无人机拆1", "兽无人机"),
            ]),
            sheet_shops: pairs(&[
                ("外仓库配货表", "外星人"),
                ("梨配货表", "三只梨"),
                ("兽仓库配货表", "兽"),
                ("兽无人机拆1", "兽"),
                ("兽无人机拆2", "兽"),
            ]),
            label_folders_3c: vec![
                SheetFolder::new("外仓库配货表", "外星人玩具"),
                SheetFolder::new("梨配货表", "三只梨"),
                SheetFolder::new("兽仓库配货表", "兽"),
                SheetFolder::new("兽无人机拆1", "兽无人机拆1"),
                SheetFolder::new("兽无人机拆2", "兽无人机拆2"),
            ],
            label_folders_toy: vec![
                SheetFolder::new("外仓库配货表", "外星人"),
                SheetFolder::new("兽仓库配货表", "兽模型"),
            ],
            identifier_only_sheets: strings(&["外仓库配货表"]),
            filtered_sheets: strings(&["兽无人机拆2"]),
            reservation_sheets: strings(&["外仓库配货表", "梨配货表", "兽仓库配货表", "兽无人机仓库配货表总"]),
            propeller_keywords: strings(&["螺旋桨", "propeller", "螺桨", "螺旋奖", "螺施桨"]),
            shop_prefixes: strings(&["外星人", "三只梨", "兽", "901", "909"]),
            columns: ColumnLayout::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_mode_flags() {
        assert!(OutputMode::Both.generates_labels());
        assert!(OutputMode::Both.generates_box_marks());
        assert!(OutputMode::Label.generates_labels());
        assert!(!OutputMode::Label.generates_box_marks());
        assert!(!OutputMode::Box.generates_labels());
        assert!(!OutputMode::Reservation.generates_labels());
        assert!(!OutputMode::Reservation.generates_box_marks());
    }

    #[test]
    fn test_deserialize_minimal_config() {
        let json = r#"{
            "workbookPath": "/data/配货.xlsx",
            "templateRoot": "/data/templates",
            "typeMode": "3c",
            "outputMode": "label",
            "createZip": true
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.type_mode, TypeMode::ThreeC);
        assert_eq!(config.output_mode, OutputMode::Label);
        assert!(config.create_zip);
        assert!(!config.make_backup);
        assert_eq!(config.matching.expected_sheets.len(), 6);
    }

    #[test]
    fn test_explicit_output_base_wins() {
        let mut config = RunConfig::new("a.xlsx", "templates");
        config.output_base = Some(PathBuf::from("/tmp/out"));
        assert_eq!(config.resolved_output_base(), PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_matching_defaults() {
        let m = MatchingConfig::default();
        assert_eq!(m.prefix_of("梨配货表"), "三只梨");
        assert_eq!(m.prefix_of("兽无人机拆2"), "");
        assert_eq!(m.shop_of("兽无人机拆1"), Some("兽"));
        assert!(m.is_identifier_only("外仓库配货表"));
        assert!(!m.is_identifier_only("梨配货表"));
        assert_eq!(m.aliases_of("兽仓库配货表"), vec!["兽配货表", "兽仓库配货表"]);
        assert_eq!(m.aliases_of("未知表"), vec!["未知表"]);
    }

    #[test]
    fn test_from_json_file_reports_invalid() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = RunConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, LabelBoxError::InvalidConfig(_)));
    }
}
