pub mod compression;
pub mod file_ops;
pub mod matching;
pub mod pld;
pub mod report;
pub mod reservation;
pub mod workbook;
