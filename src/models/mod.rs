pub mod error;
pub mod task;
pub mod config;

// Re-export commonly used types
pub use error::LabelBoxError;
pub use task::{
    FieldChange, FieldKind, FieldRegion, ItemRow, LabelCategory, MissingItem, PatchReport,
    ShipmentEntry,
};
pub use config::{ColumnLayout, MatchingConfig, OutputMode, RunConfig, SheetFolder, TypeMode};
