pub mod buffer;
pub mod city;
pub mod date_patch;
pub mod encoding;
pub mod locator;
pub mod patcher;
pub mod scanner;

pub use buffer::PldBuffer;
pub use city::{city_meta, city_template_name, detect_city, CityDisplay, CityMeta, CITY_KEYS};
pub use date_patch::{process_pld_file, run_patch_step, DateCounts, DatePatchRow, DatePatchSummary};
pub use encoding::encode_gbk_fit;
pub use patcher::{patch_buffer, patch_file};
