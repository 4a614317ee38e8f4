use std::collections::HashSet;
use std::path::PathBuf;

use tracing::debug;

use super::candidates::{candidate_filenames, forced_candidates, preview, variant_candidates};
use super::normalize::{build_variants, numeric_prefix, SOLD_OUT_MARKER};
use super::propeller::{PropellerCatalog, PropellerQuery, PROPELLER_MARKER};
use crate::core::file_ops::TemplateIndex;
use crate::models::{ItemRow, MatchingConfig, MissingItem};

/// Templates selected for one item row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub matches: Vec<PathBuf>,
    /// Propeller template forced by the product-code map
    pub forced_name: Option<String>,
    pub propeller_strategy: Option<&'static str>,
    pub via_numeric_prefix: bool,
}

/// Resolves item rows to template files of one index
pub struct TemplateResolver<'a> {
    index: &'a TemplateIndex,
    catalog: &'a PropellerCatalog,
    config: &'a MatchingConfig,
}

impl<'a> TemplateResolver<'a> {
    pub fn new(index: &'a TemplateIndex, catalog: &'a PropellerCatalog, config: &'a MatchingConfig) -> Self {
        Self {
            index,
            catalog,
            config,
        }
    }

    /// Resolve `row` of canonical sheet `sheet`
    ///
    /// Order: forced propeller name, identifier variants, numeric-prefix
    /// fallback (skipped for identifier-only sheets).
    pub fn resolve(&self, sheet: &str, row: &ItemRow) -> Result<Resolution, MissingItem> {
        let prefix = self.config.prefix_of(sheet);
        let identifier = row.identifier.replace(SOLD_OUT_MARKER, "");

        let propeller = if row.category.contains(PROPELLER_MARKER) {
            self.catalog.find_template(&PropellerQuery {
                sku: &row.sku,
                identifier: &identifier,
                shop: self.config.shop_of(sheet),
            })
        } else {
            None
        };
        let forced: Vec<String> = propeller.iter().map(|h| h.filename.clone()).collect();
        let strategy = propeller.as_ref().map(|h| h.strategy);

        if !forced.is_empty() {
            let hits = self.index.find_all(&forced_candidates(prefix, &forced));
            if !hits.is_empty() {
                debug!(sheet, row = row.row, forced = %forced[0], "propeller template forced");
                return Ok(Resolution {
                    matches: hits,
                    forced_name: forced.first().cloned(),
                    propeller_strategy: strategy,
                    via_numeric_prefix: false,
                });
            }
        }

        let variants = build_variants(&identifier);
        let hits = self.index.find_all(&variant_candidates(prefix, &variants));
        if !hits.is_empty() {
            return Ok(Resolution {
                matches: hits,
                forced_name: forced.first().cloned(),
                propeller_strategy: strategy,
                via_numeric_prefix: false,
            });
        }

        if !self.config.is_identifier_only(sheet) {
            let hits = self.numeric_prefix_fallback(sheet, &identifier);
            if !hits.is_empty() {
                debug!(sheet, row = row.row, hits = hits.len(), "numeric-prefix fallback");
                return Ok(Resolution {
                    matches: hits,
                    forced_name: forced.first().cloned(),
                    propeller_strategy: strategy,
                    via_numeric_prefix: true,
                });
            }
        }

        let candidates = candidate_filenames(prefix, &variants, &forced);
        let (candidates_preview, candidates_total) = preview(&candidates);
        Err(MissingItem {
            sheet: sheet.to_string(),
            identifier: row.display_identifier(),
            sku: row.sku.clone(),
            category: row.category.clone(),
            row: row.row,
            candidates_preview,
            candidates_total,
            forced_name: forced.into_iter().next(),
        })
    }

    /// Templates whose stem starts with the identifier's leading digits, with
    /// or without the sheet prefix in front
    pub fn numeric_prefix_fallback(&self, sheet: &str, identifier: &str) -> Vec<PathBuf> {
        let digits = numeric_prefix(identifier);
        if digits.is_empty() {
            return Vec::new();
        }
        let prefix = self.config.prefix_of(sheet).to_lowercase();
        let mut seen = HashSet::new();
        self.index
            .entries()
            .iter()
            .filter(|e| {
                e.stem_lower.starts_with(digits)
                    || (!prefix.is_empty()
                        && e.stem_lower
                            .strip_prefix(prefix.as_str())
                            .is_some_and(|rest| rest.starts_with(digits)))
            })
            .filter(|e| seen.insert(e.path.clone()))
            .map(|e| e.path.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        index: TemplateIndex,
        catalog: PropellerCatalog,
        config: MatchingConfig,
    }

    fn fixture(files: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        for f in files {
            fs::write(dir.path().join(f), b"pld").unwrap();
        }
        let index = TemplateIndex::build(dir.path()).unwrap();
        let config = MatchingConfig::default();
        let catalog = PropellerCatalog::build(&index, &config, &Default::default());
        Fixture {
            dir,
            index,
            catalog,
            config,
        }
    }

    impl Fixture {
        fn resolver(&self) -> TemplateResolver<'_> {
            TemplateResolver::new(&self.index, &self.catalog, &self.config)
        }
    }

    #[test]
    fn test_exact_and_prefixed_match() {
        let fx = fixture(&["A100.pld", "三只梨A100.pld"]);
        let res = fx.resolver().resolve("梨配货表", &ItemRow::new("A100", "1001", "A100", 2)).unwrap();
        assert_eq!(
            res.matches,
            vec![fx.dir.path().join("A100.pld"), fx.dir.path().join("三只梨A100.pld")]
        );
        assert!(!res.via_numeric_prefix);
    }

    #[test]
    fn test_sold_out_and_halfwidth_variants() {
        let fx = fixture(&["B200+1.pld"]);
        let row = ItemRow::new("Ｂ200＋1售止", "1002", "", 3);
        let res = fx.resolver().resolve("兽仓库配货表", &row).unwrap();
        assert_eq!(res.matches.len(), 1);
    }

    #[test]
    fn test_numeric_prefix_fallback_and_identifier_only() {
        let fx = fixture(&["兽12345-黑色.pld"]);
        let row = ItemRow::new("12345蓝", "1003", "", 4);
        let res = fx.resolver().resolve("兽仓库配货表", &row).unwrap();
        assert!(res.via_numeric_prefix);

        // identifier-only sheets never use the numeric fallback
        let missing = fx.resolver().resolve("外仓库配货表", &row).unwrap_err();
        assert_eq!(missing.sheet, "外仓库配货表");
        assert_eq!(missing.row, 4);
        assert_eq!(missing.candidates_preview[0], "12345蓝.pld");
    }

    #[test]
    fn test_propeller_forced_by_static_map() {
        let fx = fixture(&["外星人螺旋桨.pld", "100181107889.pld"]);
        let row = ItemRow::new("100181107889", "100181107889", "螺旋桨", 5);
        let res = fx.resolver().resolve("外仓库配货表", &row).unwrap();
        assert_eq!(res.matches, vec![fx.dir.path().join("外星人螺旋桨.pld")]);
        assert_eq!(res.forced_name.as_deref(), Some("外星人螺旋桨.pld"));
        assert_eq!(res.propeller_strategy, Some("static"));
    }

    #[test]
    fn test_forced_miss_falls_back_to_variants() {
        // static map names 兽螺旋桨.pld, which is not in this index
        let fx = fixture(&["P9.pld"]);
        let row = ItemRow::new("P9", "100264779838", "螺旋桨", 6);
        let res = fx.resolver().resolve("兽仓库配货表", &row).unwrap();
        assert_eq!(res.matches, vec![fx.dir.path().join("P9.pld")]);
        assert_eq!(res.forced_name.as_deref(), Some("兽螺旋桨.pld"));
    }

    #[test]
    fn test_missing_lists_forced_name_and_candidates() {
        let fx = fixture(&[]);
        let row = ItemRow::new("Q1+2", "100264779838", "螺旋桨", 7);
        let missing = fx.resolver().resolve("兽仓库配货表", &row).unwrap_err();
        assert_eq!(missing.forced_name.as_deref(), Some("兽螺旋桨.pld"));
        assert_eq!(missing.candidates_preview.len(), 5);
        assert_eq!(missing.candidates_preview[0], "兽螺旋桨.pld");
        assert!(missing.candidates_total > 5);
        assert!(missing.describe().contains("螺旋桨映射未命中"));
    }
}
