use std::path::Path;

use serde::Serialize;

use crate::core::matching::ProductCodeStore;
use crate::models::MatchingConfig;

/// 一条商品编号 → 螺旋桨模板映射
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMapping {
    pub code: String,
    pub filename: String,
}

/// 读取映射文件中的全部映射（文件不存在时为空）
pub fn list_product_mappings(map_path: &str) -> Result<Vec<ProductMapping>, String> {
    let store = ProductCodeStore::load(Path::new(map_path))?;
    Ok(store
        .iter()
        .map(|(code, filename)| ProductMapping {
            code: code.to_string(),
            filename: filename.to_string(),
        })
        .collect())
}

/// 添加或覆盖一条映射并保存
///
/// # Returns
/// * 被覆盖的旧文件名
pub fn add_product_mapping(map_path: &str, code: &str, filename: &str) -> Result<Option<String>, String> {
    let mut store = ProductCodeStore::load(Path::new(map_path))?;
    let previous = store.add(code, filename)?;
    store.save()?;
    tracing::info!(code, filename, replaced = previous.is_some(), "product mapping saved");
    Ok(previous)
}

/// 删除一条映射并保存；不存在时返回 false
pub fn remove_product_mapping(map_path: &str, code: &str) -> Result<bool, String> {
    let mut store = ProductCodeStore::load(Path::new(map_path))?;
    let removed = store.remove(code.trim()).is_some();
    if removed {
        store.save()?;
        tracing::info!(code, "product mapping removed");
    }
    Ok(removed)
}

/// 模板目录中尚未映射的螺旋桨模板文件名
pub fn find_unmapped_propellers(map_path: &str, template_dir: &str) -> Result<Vec<String>, String> {
    let store = ProductCodeStore::load(Path::new(map_path))?;
    let keywords = MatchingConfig::default().propeller_keywords;
    Ok(store.find_unmapped(Path::new(template_dir), &keywords)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_add_list_remove() {
        let dir = TempDir::new().unwrap();
        let map = dir.path().join("product_code_map.json");
        let map = map.to_str().unwrap();

        assert!(list_product_mappings(map).unwrap().is_empty());
        assert_eq!(add_product_mapping(map, "100181107889", "兽螺旋桨A").unwrap(), None);
        assert_eq!(
            add_product_mapping(map, "100181107889", "兽螺旋桨B.pld").unwrap(),
            Some("兽螺旋桨A.pld".to_string())
        );
        add_product_mapping(map, "店铺_三只梨", "三只梨螺旋桨.pld").unwrap();

        let listed = list_product_mappings(map).unwrap();
        assert_eq!(
            listed,
            vec![
                ProductMapping {
                    code: "100181107889".to_string(),
                    filename: "兽螺旋桨B.pld".to_string()
                },
                ProductMapping {
                    code: "店铺_三只梨".to_string(),
                    filename: "三只梨螺旋桨.pld".to_string()
                },
            ]
        );

        assert!(remove_product_mapping(map, "100181107889").unwrap());
        assert!(!remove_product_mapping(map, "100181107889").unwrap());
        assert_eq!(list_product_mappings(map).unwrap().len(), 1);
    }

    #[test]
    fn test_add_rejects_empty_code() {
        let dir = TempDir::new().unwrap();
        let map = dir.path().join("map.json");
        let err = add_product_mapping(map.to_str().unwrap(), " ", "x.pld").unwrap_err();
        assert!(err.contains("Product-code mapping error"));
    }

    #[test]
    fn test_find_unmapped_propellers() {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("3C标签");
        fs::create_dir_all(&templates).unwrap();
        fs::write(templates.join("外星人螺旋桨1234567890.pld"), b"pld").unwrap();
        fs::write(templates.join("兽螺旋桨.pld"), b"pld").unwrap();
        fs::write(templates.join("100181107889.pld"), b"pld").unwrap();

        let map = dir.path().join("map.json");
        let map = map.to_str().unwrap();
        add_product_mapping(map, "1", "兽螺旋桨.pld").unwrap();

        let unmapped = find_unmapped_propellers(map, templates.to_str().unwrap()).unwrap();
        assert_eq!(unmapped, vec!["外星人螺旋桨1234567890.pld".to_string()]);
    }
}
