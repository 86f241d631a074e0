//! Spreadsheet bulk import.
//!
//! - `io`: calamine helpers that turn a sheet into text rows
//! - `import`: row-by-row import of CPL and CPMK->CPL mappings

pub mod import;
pub mod io;

pub use import::{import_mapping_rows, import_outcome_rows, ImportReport, MAPPING_SHEET, OUTCOME_SHEET};
pub use io::read_sheet_rows;
