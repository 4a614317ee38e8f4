// Template discovery and output layout
pub mod output;
pub mod scanner;
pub mod template_index;

pub use output::{numbered_output_path, OutputLayout};
pub use scanner::{FileScanner, TemplateFile};
pub use template_index::{
    find_city_template, resolve_box_template_dir, resolve_label_template_dir, DirResolution,
    TemplateEntry, TemplateIndex,
};
