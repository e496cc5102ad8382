//! Workbook parsing for uploaded match spreadsheets (.xlsx/.xlsm/.xls/.csv).
//!
//! Each worksheet becomes one tournament-category tab; each data row becomes
//! a `RawMatchRow`. Rows with a bad player arity are excluded and recorded as
//! warnings; rows with missing or unparseable scores are kept but marked
//! score-incomplete downstream.

use calamine::{open_workbook_from_rs, Data, Range, Reader, Xls, Xlsx};
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;

use crate::directory::Gender;

/// Fatal parse failure: the whole upload is rejected with a structured
/// failure response, never a partial analysis.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unsupported file type: .{0}. Supported: .xlsx, .xlsm, .xls, .csv")]
    UnsupportedFileType(String),
    #[error("Failed to open workbook: {0}")]
    UnreadableWorkbook(String),
    #[error("No sheets with match data found in workbook")]
    EmptyWorkbook,
}

/// Singles (one player per side) or doubles (two per side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Singles,
    Doubles,
}

/// One player reference in a row: a passport code plus optional
/// gender / date-of-birth override fields from the spreadsheet.
#[derive(Debug, Clone)]
pub struct PlayerRef {
    pub passport: String,
    pub gender_override: Option<Gender>,
    /// YYYY-MM-DD; overrides the stored value at commit time when present.
    pub birthdate_override: Option<String>,
}

/// One spreadsheet row, immutable once parsed.
#[derive(Debug, Clone)]
pub struct RawMatchRow {
    pub tab: String,
    /// 1-based spreadsheet row number (header is row 1).
    pub row_number: u32,
    pub match_type: MatchType,
    pub side1: Vec<PlayerRef>,
    pub side2: Vec<PlayerRef>,
    pub score1: Option<u32>,
    pub score2: Option<u32>,
    pub notes: Option<String>,
}

impl RawMatchRow {
    /// All player refs in side order.
    pub fn players(&self) -> impl Iterator<Item = &PlayerRef> {
        self.side1.iter().chain(self.side2.iter())
    }
}

/// One worksheet, treated as one tournament category.
#[derive(Debug, Clone)]
pub struct Tab {
    pub name: String,
    pub rows: Vec<RawMatchRow>,
}

/// Parsed upload: ordered tabs plus recoverable row-level warnings.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub tabs: Vec<Tab>,
    pub warnings: Vec<String>,
}

/// Dispatch file parsing by extension.
pub fn parse_workbook(filename: &str, data: &[u8]) -> Result<Workbook, ParseError> {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();

    match ext.as_str() {
        "xlsx" | "xlsm" => parse_xlsx(data),
        "xls" => parse_xls(data),
        "csv" => parse_csv(filename, data),
        _ => Err(ParseError::UnsupportedFileType(ext)),
    }
}

fn parse_xlsx(data: &[u8]) -> Result<Workbook, ParseError> {
    let cursor = Cursor::new(data);
    let mut workbook: Xlsx<_> = open_workbook_from_rs(cursor)
        .map_err(|e: calamine::XlsxError| ParseError::UnreadableWorkbook(e.to_string()))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let mut out = Workbook::default();

    for name in &sheet_names {
        let range = match workbook.worksheet_range(name) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping sheet '{}': {}", name, e);
                continue;
            }
        };
        collect_sheet(name, &range, &mut out);
    }

    if out.tabs.is_empty() {
        return Err(ParseError::EmptyWorkbook);
    }
    Ok(out)
}

fn parse_xls(data: &[u8]) -> Result<Workbook, ParseError> {
    let cursor = Cursor::new(data);
    let mut workbook: Xls<_> = open_workbook_from_rs(cursor)
        .map_err(|e: calamine::XlsError| ParseError::UnreadableWorkbook(e.to_string()))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let mut out = Workbook::default();

    for name in &sheet_names {
        let range = match workbook.worksheet_range(name) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping sheet '{}': {}", name, e);
                continue;
            }
        };
        collect_sheet(name, &range, &mut out);
    }

    if out.tabs.is_empty() {
        return Err(ParseError::EmptyWorkbook);
    }
    Ok(out)
}

/// Parse a CSV upload as a single-tab workbook. The tab takes the file's
/// base name, matching how a one-sheet export round-trips.
fn parse_csv(filename: &str, data: &[u8]) -> Result<Workbook, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ParseError::UnreadableWorkbook(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let name = filename
        .rsplit('/')
        .next()
        .unwrap_or(filename)
        .rsplit('\\')
        .next()
        .unwrap_or(filename)
        .trim_end_matches(".csv")
        .to_string();

    let mut out = Workbook::default();
    let columns = match ColumnIndex::from_headers(&name, &headers, &mut out.warnings) {
        Some(c) => c,
        None => return Err(ParseError::EmptyWorkbook),
    };

    let mut rows = Vec::new();
    let mut data_rows = 0usize;
    for (idx, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                out.warnings
                    .push(format!("{}, row {}: unreadable record ({})", name, idx + 2, e));
                continue;
            }
        };
        let cells: Vec<String> = record.iter().map(|f| f.trim().to_string()).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        data_rows += 1;
        // Row 1 is the header, so data starts at spreadsheet row 2.
        if let Some(row) = parse_row(&name, idx as u32 + 2, &columns, &cells, &mut out.warnings) {
            rows.push(row);
        }
    }

    // A file with headers but no data rows is empty; a file whose rows all
    // failed validation keeps its tab (and warnings) with zero matches.
    if data_rows == 0 {
        return Err(ParseError::EmptyWorkbook);
    }

    out.tabs.push(Tab { name, rows });
    Ok(out)
}

/// Convert one worksheet into a Tab and append it to the workbook.
/// Sheets that are empty or lack the required columns are skipped.
fn collect_sheet(name: &str, range: &Range<Data>, out: &mut Workbook) {
    let mut row_iter = range.rows();

    let Some(header_row) = row_iter.next() else {
        return;
    };
    let headers: Vec<String> = header_row
        .iter()
        .map(|c| cell_to_string(c).trim().to_string())
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return;
    }

    let Some(columns) = ColumnIndex::from_headers(name, &headers, &mut out.warnings) else {
        return;
    };

    let mut rows = Vec::new();
    let mut data_rows = 0usize;
    for (idx, row) in row_iter.enumerate() {
        let cells: Vec<String> = row.iter().map(|c| cell_to_string(c).trim().to_string()).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        data_rows += 1;
        if let Some(parsed) = parse_row(name, idx as u32 + 2, &columns, &cells, &mut out.warnings) {
            rows.push(parsed);
        }
    }

    // Only sheets with no data rows at all are dropped. A sheet whose rows
    // all failed validation stays as a zero-match tab so the breakdown
    // still shows it alongside its warnings.
    if data_rows == 0 {
        return;
    }

    out.tabs.push(Tab {
        name: name.to_string(),
        rows,
    });
}

/// Case-insensitive header → column-index map for the expected columns.
struct ColumnIndex {
    players: [Option<usize>; 4],
    genders: [Option<usize>; 4],
    birthdates: [Option<usize>; 4],
    score1: Option<usize>,
    score2: Option<usize>,
    notes: Option<usize>,
}

impl ColumnIndex {
    /// Build the index from a header row. Returns `None` (with a warning)
    /// when the sheet lacks the minimum player/score columns.
    fn from_headers(sheet: &str, headers: &[String], warnings: &mut Vec<String>) -> Option<Self> {
        let mut map: HashMap<String, usize> = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            let key = header.to_lowercase();
            if !key.is_empty() {
                map.insert(key, idx);
            }
        }

        let col = |name: &str| map.get(name).copied();
        let index = Self {
            players: [col("player1"), col("player2"), col("player3"), col("player4")],
            genders: [col("gender1"), col("gender2"), col("gender3"), col("gender4")],
            birthdates: [col("dob1"), col("dob2"), col("dob3"), col("dob4")],
            score1: col("score1"),
            score2: col("score2"),
            notes: col("notes"),
        };

        for required in ["player1", "player2", "score1", "score2"] {
            if col(required).is_none() {
                warnings.push(format!(
                    "Sheet '{}' skipped: missing required column '{}'",
                    sheet, required
                ));
                return None;
            }
        }
        Some(index)
    }
}

/// Classify and parse one data row. Returns `None` for rows excluded from
/// the workbook (bad player arity), with the reason recorded as a warning.
fn parse_row(
    tab: &str,
    row_number: u32,
    columns: &ColumnIndex,
    cells: &[String],
    warnings: &mut Vec<String>,
) -> Option<RawMatchRow> {
    let cell = |idx: Option<usize>| {
        idx.and_then(|i| cells.get(i))
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    };

    let mut refs: [Option<PlayerRef>; 4] = [None, None, None, None];
    for slot in 0..4 {
        if let Some(passport) = cell(columns.players[slot]) {
            let gender_override = cell(columns.genders[slot]).and_then(|raw| {
                let parsed = Gender::parse(raw);
                if parsed.is_none() {
                    warnings.push(format!(
                        "{}, row {}: unrecognized gender '{}' for {} ignored",
                        tab, row_number, raw, passport
                    ));
                }
                parsed
            });
            refs[slot] = Some(PlayerRef {
                passport: passport.to_string(),
                gender_override,
                birthdate_override: cell(columns.birthdates[slot]).map(str::to_string),
            });
        }
    }

    let present = refs.iter().filter(|r| r.is_some()).count();
    let [p1, p2, p3, p4] = refs;
    let (match_type, side1, side2) = match (p1, p2, p3, p4) {
        (Some(a), Some(b), None, None) => (MatchType::Singles, vec![a], vec![b]),
        (Some(a), Some(b), Some(c), Some(d)) => (MatchType::Doubles, vec![a, b], vec![c, d]),
        _ => {
            warnings.push(format!(
                "{}, row {}: expected 2 (singles) or 4 (doubles) players, found {}",
                tab, row_number, present
            ));
            return None;
        }
    };

    let score1 = parse_score(tab, row_number, "score1", cell(columns.score1), warnings);
    let score2 = parse_score(tab, row_number, "score2", cell(columns.score2), warnings);

    Some(RawMatchRow {
        tab: tab.to_string(),
        row_number,
        match_type,
        side1,
        side2,
        score1,
        score2,
        notes: cell(columns.notes).map(str::to_string),
    })
}

/// Parse a score cell as a non-negative integer. Missing cells are silent;
/// non-numeric or negative values get a warning. Either way the row stays
/// in the workbook as score-incomplete.
fn parse_score(
    tab: &str,
    row_number: u32,
    column: &str,
    raw: Option<&str>,
    warnings: &mut Vec<String>,
) -> Option<u32> {
    let raw = raw?;
    match raw.parse::<u32>() {
        Ok(v) => Some(v),
        Err(_) => {
            warnings.push(format!(
                "{}, row {}: {} '{}' is not a non-negative integer",
                tab, row_number, column, raw
            ));
            None
        }
    }
}

/// Convert a calamine cell to a string representation.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // Avoid trailing ".0" for whole numbers
            if *f == (*f as i64) as f64 && f.abs() < i64::MAX as f64 {
                format!("{}", *f as i64)
            } else {
                format!("{}", f)
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    }
}

/// Convert an Excel serial date number to YYYY-MM-DD, so date-of-birth
/// cells formatted as dates round-trip into the override format.
/// Excel epoch: 1899-12-30, with the 1900 leap year bug (serial 60 is the
/// nonexistent Feb 29, 1900).
fn excel_serial_to_date(serial: f64) -> String {
    let days = serial as i64;
    // 25569 = serial of 1970-01-01. Serials 1..=59 predate the phantom
    // Feb 29, 1900 and sit one day closer to the epoch.
    let unix_days = if days > 59 { days - 25569 } else { days - 25568 };
    let mut remaining = unix_days as i32;

    let mut year = 1970i32;
    if remaining >= 0 {
        loop {
            let diy = if is_leap(year) { 366 } else { 365 };
            if remaining < diy {
                break;
            }
            remaining -= diy;
            year += 1;
        }
    } else {
        loop {
            year -= 1;
            let diy = if is_leap(year) { 366 } else { 365 };
            remaining += diy;
            if remaining >= 0 {
                break;
            }
        }
    }

    let dim: [i32; 12] = if is_leap(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };

    let mut month = 1;
    for d in dim {
        if remaining < d {
            break;
        }
        remaining -= d;
        month += 1;
    }
    let day = remaining + 1;

    format!("{:04}-{:02}-{:02}", year, month, day)
}

fn is_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_singles() {
        let data = b"player1,player2,score1,score2\nCBSPZV,QXLMNA,11,7\nAAAAAA,BBBBBB,11,9\n";
        let wb = parse_workbook("open.csv", data).unwrap();
        assert_eq!(wb.tabs.len(), 1);
        assert_eq!(wb.tabs[0].name, "open");
        assert_eq!(wb.tabs[0].rows.len(), 2);
        assert!(wb.warnings.is_empty());

        let row = &wb.tabs[0].rows[0];
        assert_eq!(row.match_type, MatchType::Singles);
        assert_eq!(row.side1[0].passport, "CBSPZV");
        assert_eq!(row.side2[0].passport, "QXLMNA");
        assert_eq!(row.score1, Some(11));
        assert_eq!(row.score2, Some(7));
        assert_eq!(row.row_number, 2);
    }

    #[test]
    fn test_parse_csv_doubles() {
        let data =
            b"player1,player2,player3,player4,score1,score2\nAAAAAA,BBBBBB,CCCCCC,DDDDDD,11,5\n";
        let wb = parse_workbook("mixed.csv", data).unwrap();
        let row = &wb.tabs[0].rows[0];
        assert_eq!(row.match_type, MatchType::Doubles);
        assert_eq!(row.side1.len(), 2);
        assert_eq!(row.side2.len(), 2);
        assert_eq!(row.side2[1].passport, "DDDDDD");
    }

    #[test]
    fn test_bad_arity_excluded_with_warning() {
        let data = b"player1,player2,player3,player4,score1,score2\nAAAAAA,BBBBBB,CCCCCC,,11,5\nAAAAAA,BBBBBB,,,11,5\n";
        let wb = parse_workbook("t.csv", data).unwrap();
        // Three players is neither singles nor doubles
        assert_eq!(wb.tabs[0].rows.len(), 1);
        assert_eq!(wb.warnings.len(), 1);
        assert!(wb.warnings[0].contains("row 2"));
        assert!(wb.warnings[0].contains("found 3"));
    }

    #[test]
    fn test_all_invalid_rows_keep_tab() {
        let data = b"player1,player2,player3,player4,score1,score2\nAAAAAA,BBBBBB,CCCCCC,,11,5\n";
        let wb = parse_workbook("open.csv", data).unwrap();
        // The tab survives with zero matches; the warning explains why
        assert_eq!(wb.tabs.len(), 1);
        assert!(wb.tabs[0].rows.is_empty());
        assert_eq!(wb.warnings.len(), 1);
        assert!(wb.warnings[0].contains("found 3"));
    }

    #[test]
    fn test_headers_only_csv_is_empty() {
        let data = b"player1,player2,score1,score2\n";
        let result = parse_workbook("t.csv", data);
        assert!(matches!(result, Err(ParseError::EmptyWorkbook)));
    }

    #[test]
    fn test_non_numeric_score_kept_incomplete() {
        let data = b"player1,player2,score1,score2\nAAAAAA,BBBBBB,eleven,7\n";
        let wb = parse_workbook("t.csv", data).unwrap();
        let row = &wb.tabs[0].rows[0];
        assert_eq!(row.score1, None);
        assert_eq!(row.score2, Some(7));
        assert_eq!(wb.warnings.len(), 1);
    }

    #[test]
    fn test_missing_score_no_warning() {
        let data = b"player1,player2,score1,score2\nAAAAAA,BBBBBB,,7\n";
        let wb = parse_workbook("t.csv", data).unwrap();
        assert_eq!(wb.tabs[0].rows[0].score1, None);
        assert!(wb.warnings.is_empty());
    }

    #[test]
    fn test_gender_and_dob_overrides() {
        let data = b"player1,player2,score1,score2,gender1,dob1\nAAAAAA,BBBBBB,11,3,F,1990-04-12\n";
        let wb = parse_workbook("t.csv", data).unwrap();
        let row = &wb.tabs[0].rows[0];
        assert_eq!(row.side1[0].gender_override, Some(Gender::Female));
        assert_eq!(row.side1[0].birthdate_override.as_deref(), Some("1990-04-12"));
        assert!(row.side2[0].gender_override.is_none());
    }

    #[test]
    fn test_unrecognized_gender_warns() {
        let data = b"player1,player2,score1,score2,gender1\nAAAAAA,BBBBBB,11,3,X\n";
        let wb = parse_workbook("t.csv", data).unwrap();
        assert!(wb.tabs[0].rows[0].side1[0].gender_override.is_none());
        assert_eq!(wb.warnings.len(), 1);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = parse_workbook("matches.pdf", b"data");
        assert!(matches!(result, Err(ParseError::UnsupportedFileType(_))));
    }

    #[test]
    fn test_unreadable_xlsx() {
        let result = parse_workbook("matches.xlsx", b"not a zip archive");
        assert!(matches!(result, Err(ParseError::UnreadableWorkbook(_))));
    }

    #[test]
    fn test_header_case_insensitive() {
        let data = b"Player1,PLAYER2,Score1,SCORE2\nAAAAAA,BBBBBB,11,7\n";
        let wb = parse_workbook("t.csv", data).unwrap();
        assert_eq!(wb.tabs[0].rows.len(), 1);
    }

    #[test]
    fn test_excel_serial_to_date() {
        // 2020-01-01 is serial 43831
        assert_eq!(excel_serial_to_date(43831.0), "2020-01-01");
        // 1990-04-12 is serial 32975
        assert_eq!(excel_serial_to_date(32975.0), "1990-04-12");
    }
}
