pub mod label_box;
pub mod propeller;

pub use label_box::{inspect_workbook, process_workbook, process_workbook_with, spawn_batch, RunResult, WorkbookInfo};
pub use propeller::{
    add_product_mapping, find_unmapped_propellers, list_product_mappings, remove_product_mapping, ProductMapping,
};
