//! # Device-ID CSV Files
//!
//! Reads the operator's device subset and writes device-ID batches.
//!
//! The format is deliberately narrow: comma-separated fields, optionally
//! double-quoted with `""` as an escaped quote, one record per line. The
//! header row must name a `deviceId` column. A quoted field may not span
//! lines: an embedded line break is reported as an unterminated quote on
//! the line where the field starts.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use regmig_core::DeviceId;
use thiserror::Error;

/// Header of the device-ID column.
pub const DEVICE_ID_HEADER: &str = "deviceId";

/// Errors reading a device-ID CSV.
#[derive(Error, Debug)]
pub enum CsvError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{} is empty", .path.display())]
    Empty { path: PathBuf },
    #[error("{} has no {DEVICE_ID_HEADER} column in its header row", .path.display())]
    MissingColumn { path: PathBuf },
    #[error("{}:{line}: unterminated quoted field", .path.display())]
    UnterminatedQuote { path: PathBuf, line: usize },
    #[error("{}:{line}: {reason}", .path.display())]
    InvalidId {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Split one CSV record into fields. `None` on an unterminated quote.
pub fn parse_record(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        match (quoted, c) {
            (true, '"') if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            (true, '"') => quoted = false,
            (true, c) => field.push(c),
            (false, '"') if field.trim().is_empty() => {
                field.clear();
                quoted = true;
            }
            (false, ',') => fields.push(std::mem::take(&mut field)),
            (false, c) => field.push(c),
        }
    }
    if quoted {
        return None;
    }
    fields.push(field);
    Some(fields)
}

/// Quote a field if it contains a comma, quote, or line break.
pub fn quote_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Parse device IDs from CSV text.
///
/// Blank rows are skipped, duplicates collapse to their first occurrence,
/// and whitespace around each ID is trimmed.
pub fn parse_device_ids(path: &Path, text: &str) -> Result<Vec<DeviceId>, CsvError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
        .filter(|(_, l)| !l.trim().is_empty());

    let (header_line, header) = lines.next().ok_or_else(|| CsvError::Empty {
        path: path.to_path_buf(),
    })?;
    let header = parse_record(header.trim_start_matches('\u{feff}')).ok_or_else(|| {
        CsvError::UnterminatedQuote {
            path: path.to_path_buf(),
            line: header_line,
        }
    })?;
    let column = header
        .iter()
        .position(|h| h.trim() == DEVICE_ID_HEADER)
        .ok_or_else(|| CsvError::MissingColumn {
            path: path.to_path_buf(),
        })?;

    let mut seen = BTreeSet::new();
    let mut ids = Vec::new();
    for (line, raw) in lines {
        let record = parse_record(raw).ok_or_else(|| CsvError::UnterminatedQuote {
            path: path.to_path_buf(),
            line,
        })?;
        let Some(value) = record.get(column).map(|v| v.trim()) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        let id = DeviceId::parse(value).map_err(|e| CsvError::InvalidId {
            path: path.to_path_buf(),
            line,
            reason: e.to_string(),
        })?;
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Read device IDs from a CSV file.
pub fn read_device_ids(path: &Path) -> Result<Vec<DeviceId>, CsvError> {
    let text = std::fs::read_to_string(path).map_err(|source| CsvError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_device_ids(path, &text)
}

/// Render device IDs as a single-column CSV with a `deviceId` header.
pub fn render_device_ids(ids: &[DeviceId]) -> String {
    let mut out = String::with_capacity(16 * (ids.len() + 1));
    out.push_str(DEVICE_ID_HEADER);
    out.push('\n');
    for id in ids {
        out.push_str(&quote_field(id.as_str()));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Vec<DeviceId>, CsvError> {
        parse_device_ids(Path::new("ids.csv"), text)
    }

    fn ids(list: &[&str]) -> Vec<DeviceId> {
        list.iter().map(|s| DeviceId::new(*s)).collect()
    }

    #[test]
    fn record_splitting_handles_quotes() {
        assert_eq!(
            parse_record(r#"a,"b,c","say ""hi""",d"#).unwrap(),
            vec!["a", "b,c", "say \"hi\"", "d"]
        );
        assert!(parse_record(r#"a,"open"#).is_none());
    }

    #[test]
    fn reads_device_id_column() {
        let text = "name,deviceId\nfirst, dev-1 \nsecond,dev-2\r\n";
        assert_eq!(parse(text).unwrap(), ids(&["dev-1", "dev-2"]));
    }

    #[test]
    fn skips_blank_rows_and_duplicates() {
        let text = "deviceId\n\ndev-1\n  \ndev-2\ndev-1\n";
        assert_eq!(parse(text).unwrap(), ids(&["dev-1", "dev-2"]));
    }

    #[test]
    fn header_without_device_id_is_rejected() {
        assert!(matches!(
            parse("id\ndev-1\n").unwrap_err(),
            CsvError::MissingColumn { .. }
        ));
    }

    #[test]
    fn empty_file_is_rejected() {
        assert!(matches!(parse("\n\n").unwrap_err(), CsvError::Empty { .. }));
    }

    #[test]
    fn invalid_id_reports_line() {
        let err = parse("deviceId\nok\nbad/id\n").unwrap_err();
        assert!(err.to_string().contains("ids.csv:3"));
    }

    #[test]
    fn quoted_line_break_is_unterminated() {
        let err = parse("deviceId\nok\n\"dev\n2\"\n").unwrap_err();
        assert!(matches!(err, CsvError::UnterminatedQuote { line: 3, .. }));
    }

    #[test]
    fn quote_field_only_when_needed() {
        assert_eq!(quote_field("plain"), "plain");
        assert_eq!(quote_field("a,b"), "\"a,b\"");
        assert_eq!(quote_field("say \"x\""), "\"say \"\"x\"\"\"");
    }

    #[test]
    fn rendered_ids_parse_back() {
        let list = ids(&["b", "a"]);
        let text = render_device_ids(&list);
        assert!(text.starts_with("deviceId\n"));
        assert_eq!(parse(&text).unwrap(), list);
    }
}
