//! Destination city metadata and the city-display locator.

use std::ops::Range;

use super::encoding::gbk_encode_lossy;
use super::scanner::find_all_bytes;

/// Cities the box-mark sheet can name, in matching order
pub const CITY_KEYS: [&str; 8] = ["北京", "上海", "广州", "成都", "武汉", "沈阳", "西安", "德州"];

/// Display strings for one destination city
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CityMeta {
    pub key: &'static str,
    /// Empty for municipalities
    pub province: &'static str,
    /// Province followed by a full-width space
    pub prov_disp: &'static str,
    pub city_only: &'static str,
    pub combined: &'static str,
    /// Accepted spellings of the combined text inside templates
    pub combined_alts: &'static [&'static str],
    pub province_alts: &'static [&'static str],
}

macro_rules! province_city {
    ($key:literal, $prov:literal, $city:literal) => {
        CityMeta {
            key: $key,
            province: $prov,
            prov_disp: concat!($prov, "\u{3000}"),
            city_only: $city,
            combined: concat!($prov, "\u{3000}", $city),
            combined_alts: &[concat!($prov, "\u{3000}", $city), concat!($prov, " ", $city)],
            province_alts: &[concat!($prov, "\u{3000}"), concat!($prov, " ")],
        }
    };
}

macro_rules! municipality {
    ($key:literal, $city:literal) => {
        CityMeta {
            key: $key,
            province: "",
            prov_disp: "",
            city_only: $city,
            combined: $city,
            combined_alts: &[$city],
            province_alts: &[],
        }
    };
}

pub const CITY_META: [CityMeta; 8] = [
    municipality!("北京", "北京市"),
    municipality!("上海", "上海市"),
    province_city!("广州", "广东", "广州市"),
    province_city!("成都", "四川", "成都市"),
    province_city!("武汉", "湖北", "武汉市"),
    province_city!("沈阳", "辽宁", "沈阳市"),
    province_city!("西安", "陕西", "西安市"),
    province_city!("德州", "山东", "德州市"),
];

pub fn city_meta(city: &str) -> Option<&'static CityMeta> {
    CITY_META.iter().find(|m| m.key == city)
}

/// First known city key contained in `text`
pub fn detect_city(text: &str) -> Option<&'static str> {
    CITY_KEYS.iter().copied().find(|key| text.contains(key))
}

/// Canonical box-mark template filename for a city
pub fn city_template_name(city: &str) -> String {
    format!("{}箱唛.pld", city)
}

/// Layout of the destination city text inside a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CityDisplay {
    /// Province and city stored as two separate texts
    Split {
        province: Range<usize>,
        city: Range<usize>,
    },
    /// One "province + city" text
    Combined(Range<usize>),
    /// Only the city name is present
    CityOnly(Range<usize>),
}

impl CityDisplay {
    pub fn mode_name(&self) -> &'static str {
        match self {
            CityDisplay::Split { .. } => "split",
            CityDisplay::Combined(_) => "combined",
            CityDisplay::CityOnly(_) => "city_only",
        }
    }
}

fn gbk_hits(buf: &[u8], texts: &[&str]) -> Vec<Range<usize>> {
    let mut hits: Vec<Range<usize>> = texts
        .iter()
        .flat_map(|t| find_all_bytes(buf, &gbk_encode_lossy(t)))
        .collect();
    hits.sort_by_key(|r| (r.start, r.end));
    hits
}

fn inside_any(range: &Range<usize>, windows: &[Range<usize>]) -> bool {
    windows
        .iter()
        .any(|w| w.start <= range.start && range.end <= w.end)
}

/// Locate the city display of `meta` in `buf`.
///
/// Priority is split, then combined, then city-only; within each category the
/// last (highest-offset) hit wins. Province or city hits lying inside a
/// combined hit are not counted as a split layout.
pub fn find_city_display(buf: &[u8], meta: &CityMeta) -> Option<CityDisplay> {
    let combined = gbk_hits(buf, meta.combined_alts);
    let province: Vec<_> = gbk_hits(buf, meta.province_alts)
        .into_iter()
        .filter(|r| !inside_any(r, &combined))
        .collect();
    let city: Vec<_> = gbk_hits(buf, &[meta.city_only])
        .into_iter()
        .filter(|r| !inside_any(r, &combined))
        .collect();

    if let (Some(p), Some(c)) = (province.last(), city.last()) {
        return Some(CityDisplay::Split {
            province: p.clone(),
            city: c.clone(),
        });
    }
    if let Some(w) = combined.last() {
        return Some(CityDisplay::Combined(w.clone()));
    }
    // City-only texts inside a combined window were filtered above; with no
    // combined hit the list is complete
    city.last().cloned().map(CityDisplay::CityOnly)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gbk(parts: &[&str]) -> Vec<u8> {
        let mut out = vec![0u8, 1, 2];
        for p in parts {
            out.extend(gbk_encode_lossy(p));
            out.extend([0u8, 0]);
        }
        out
    }

    #[test]
    fn test_city_meta_table() {
        let gz = city_meta("广州").unwrap();
        assert_eq!(gz.province, "广东");
        assert_eq!(gz.prov_disp, "广东\u{3000}");
        assert_eq!(gz.combined, "广东\u{3000}广州市");
        assert_eq!(gz.combined_alts, &["广东\u{3000}广州市", "广东 广州市"]);
        let bj = city_meta("北京").unwrap();
        assert_eq!(bj.combined, "北京市");
        assert!(bj.province_alts.is_empty());
        assert!(city_meta("杭州").is_none());
    }

    #[test]
    fn test_detect_city_in_order() {
        assert_eq!(detect_city("目的地：广州 序号1"), Some("广州"));
        assert_eq!(detect_city("目的地：未知"), None);
        assert_eq!(city_template_name("西安"), "西安箱唛.pld");
    }

    #[test]
    fn test_combined_only_is_combined_mode() {
        let meta = city_meta("成都").unwrap();
        let buf = gbk(&["四川\u{3000}成都市"]);
        let display = find_city_display(&buf, meta).unwrap();
        assert_eq!(display.mode_name(), "combined");
    }

    #[test]
    fn test_split_mode_takes_last_hits() {
        let meta = city_meta("武汉").unwrap();
        let buf = gbk(&["湖北\u{3000}", "武汉市", "湖北 ", "武汉市"]);
        match find_city_display(&buf, meta).unwrap() {
            CityDisplay::Split { province, city } => {
                assert!(province.start > 3);
                assert!(city.start > province.start);
                assert_eq!(&buf[city.clone()], &gbk_encode_lossy("武汉市")[..]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_city_only_mode() {
        let meta = city_meta("西安").unwrap();
        let buf = gbk(&["西安市"]);
        assert!(matches!(find_city_display(&buf, meta), Some(CityDisplay::CityOnly(_))));
    }

    #[test]
    fn test_municipality_is_combined() {
        let meta = city_meta("上海").unwrap();
        let buf = gbk(&["上海市"]);
        // 上海市 is both the combined and the city-only text; no province exists
        assert_eq!(find_city_display(&buf, meta).unwrap().mode_name(), "combined");
    }

    #[test]
    fn test_no_display() {
        let meta = city_meta("德州").unwrap();
        assert!(find_city_display(b"nothing here", meta).is_none());
    }
}
