use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;

use crate::error::{EngineError, EngineResult};

/// Cell value as trimmed text, in the form `parse_weight` reads back.
pub fn cell_to_string(c: &Data) -> String {
    match c {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Float(f) => format_number(*f),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(d) => d.to_string(),
        Data::Empty | Data::Error(_) => String::new(),
    }
}

/// At most four decimals, trailing zeros dropped: 40.0 -> "40",
/// 33.300000000000004 -> "33.3".
fn format_number(f: f64) -> String {
    let fixed = format!("{:.4}", f);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" { "0".to_string() } else { trimmed.to_string() }
}

/// Lowercase, whitespace/underscore/dash free header key: "Kode CPMK" -> "kodecpmk".
pub fn normalize_header(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .collect()
}

/// Rows of `sheet_name` as text. `Ok(None)` when the workbook has no such
/// sheet; an unreadable file is `InvalidInput`.
pub fn read_sheet_rows<P: AsRef<Path>>(path: P, sheet_name: &str) -> EngineResult<Option<Vec<Vec<String>>>> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| EngineError::InvalidInput(format!("cannot open workbook: {}", e)))?;

    let wanted = normalize_header(sheet_name);
    let found = workbook
        .sheet_names()
        .iter()
        .find(|s| normalize_header(s) == wanted)
        .cloned();
    let sheet = match found {
        Some(s) => s,
        None => return Ok(None),
    };

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| EngineError::InvalidInput(format!("cannot read sheet '{}': {}", sheet, e)))?;
    let rows = range
        .rows()
        .map(|r| r.iter().map(cell_to_string).collect::<Vec<String>>())
        .collect();
    Ok(Some(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_to_string_drops_whole_decimal() {
        assert_eq!(cell_to_string(&Data::Float(40.0)), "40");
        assert_eq!(cell_to_string(&Data::Float(12.5)), "12.5");
        assert_eq!(cell_to_string(&Data::String("  CPL-01 ".into())), "CPL-01");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }

    #[test]
    fn test_float_noise_is_rounded_away() {
        assert_eq!(cell_to_string(&Data::Float(0.1 + 0.2)), "0.3");
        assert_eq!(cell_to_string(&Data::Float(33.300000000000004)), "33.3");
        assert_eq!(cell_to_string(&Data::Float(100.0)), "100");
        assert_eq!(cell_to_string(&Data::Float(-0.00001)), "0");
        assert_eq!(cell_to_string(&Data::Int(25)), "25");
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Kode CPMK"), "kodecpmk");
        assert_eq!(normalize_header("kode_mk"), "kodemk");
        assert_eq!(normalize_header("Pemetaan CPMK-CPL"), "pemetaancpmkcpl");
    }

    #[test]
    fn test_missing_file_is_invalid_input() {
        let err = read_sheet_rows("/nonexistent/file.xlsx", "CPL").unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }
}
