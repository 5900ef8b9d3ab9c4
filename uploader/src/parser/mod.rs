//! CSV parser for roster uploads.
//!
//! Turns raw file text into ordered [`RowRecord`]s. The scanner is a single
//! left-to-right pass with an `in_quotes` flag:
//!
//! - `"` toggles quoting; `""` inside quotes is a literal quote
//! - `,` outside quotes ends a field
//! - `\r\n`, `\r` or `\n` outside quotes ends a row (`\r\n` counts once)
//! - rows whose fields are all blank are dropped
//!
//! The first surviving row gives the headers. Short rows are padded with `""`;
//! cells past the last header are ignored. A data row is dropped when every
//! value under a header is blank, even if it had text past the last header.

use std::path::Path;

use crate::config::MAX_FILE_SIZE;
use crate::error::{CsvError, CsvResult};
use crate::models::RowRecord;

/// Result of parsing with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    /// Parsed data rows
    pub records: Vec<RowRecord>,
    /// Trimmed column headers, in file order
    pub headers: Vec<String>,
    /// Detected or assumed encoding
    pub encoding: String,
}

/// Parse CSV text into row records.
///
/// Fails with [`CsvError::EmptyFile`] or [`CsvError::NoDataRows`] when no data
/// row survives.
///
/// # Example
/// ```
/// use rosterload::parser::parse;
///
/// let rows = parse("name,email\r\n\"Smith, John\",j@x.com\n").unwrap();
/// assert_eq!(rows.len(), 1);
/// assert_eq!(rows[0].value("name"), "Smith, John");
/// ```
pub fn parse(text: &str) -> CsvResult<Vec<RowRecord>> {
    parse_with_headers(text).map(|result| result.records)
}

/// Parse CSV text, keeping the header list.
pub fn parse_with_headers(text: &str) -> CsvResult<ParseResult> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut rows = scan(text).into_iter().filter(|cells| !is_blank_row(cells));

    let headers: Vec<String> = rows
        .next()
        .ok_or(CsvError::EmptyFile)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let records: Vec<RowRecord> = rows
        .map(|cells| {
            headers
                .iter()
                .enumerate()
                .map(|(i, header)| {
                    let value = cells.get(i).map(|c| c.trim()).unwrap_or("");
                    (header.clone(), value.to_string())
                })
                .collect::<RowRecord>()
        })
        .filter(|row| row.iter().any(|(_, value)| !value.is_empty()))
        .collect();

    if records.is_empty() {
        return Err(CsvError::NoDataRows);
    }

    log::debug!("Parsed {} rows with {} columns", records.len(), headers.len());

    Ok(ParseResult {
        records,
        headers,
        encoding: "utf-8".to_string(),
    })
}

/// Split text into raw rows of untrimmed fields.
fn scan(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => row.push(std::mem::take(&mut field)),
            '\r' | '\n' if !in_quotes => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    // File not terminated by a newline
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

fn is_blank_row(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_string()),
            Err(e) => {
                log::warn!("File is not valid UTF-8 ({}), decoding lossily", e);
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
        },
        // Excel exports labelled latin-1 are almost always windows-1252
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned())
        }
        other => match encoding_rs::Encoding::for_label(other.as_bytes()) {
            Some(enc) => {
                let (text, _, had_errors) = enc.decode(bytes);
                if had_errors {
                    log::warn!("Invalid {} byte sequences replaced", other);
                }
                Ok(text.into_owned())
            }
            None => {
                log::warn!("Unknown encoding '{}', decoding as UTF-8 lossily", other);
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
        },
    }
}

/// Parse raw file bytes with encoding auto-detection.
pub fn parse_bytes(bytes: &[u8]) -> CsvResult<ParseResult> {
    if bytes.len() > MAX_FILE_SIZE {
        return Err(CsvError::TooLarge {
            size: bytes.len(),
            limit: MAX_FILE_SIZE,
        });
    }

    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(CsvError::EmptyFile);
    }

    let (encoding, content) = match std::str::from_utf8(bytes) {
        Ok(text) => ("utf-8".to_string(), text.to_string()),
        Err(_) => {
            let encoding = detect_encoding(bytes);
            let content = decode_content(bytes, &encoding)?;
            (encoding, content)
        }
    };

    let mut result = parse_with_headers(&content)?;
    result.encoding = encoding;
    Ok(result)
}

/// Read and parse a CSV file.
pub fn parse_file<P: AsRef<Path>>(path: P) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes(&bytes)
}

/// Serialize rows back to CSV, quoting fields only where needed.
///
/// Columns follow `headers`; a row missing a column writes `""`.
pub fn to_csv(headers: &[String], rows: &[RowRecord]) -> CsvResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer
        .write_record(headers)
        .map_err(|e| CsvError::Write(e.to_string()))?;
    for row in rows {
        writer
            .write_record(headers.iter().map(|h| row.value(h)))
            .map_err(|e| CsvError::Write(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CsvError::Write(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CsvError::Write(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_quoted_comma_and_crlf() {
        let rows = parse("name,email\r\n\"Smith, John\",j@x.com\n").unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value("name"), "Smith, John");
        assert_eq!(rows[0].value("email"), "j@x.com");
        assert_eq!(rows[0].len(), 2);
    }

    #[test]
    fn test_blank_rows_dropped() {
        let result = parse_with_headers("a,b\n,\n1,2\n").unwrap();

        assert_eq!(result.headers, vec!["a", "b"]);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].value("a"), "1");
        assert_eq!(result.records[0].value("b"), "2");
    }

    #[test]
    fn test_leading_blank_lines_before_header() {
        let result = parse_with_headers("\n  ,  \r\nx,y\r\n3,4").unwrap();
        assert_eq!(result.headers, vec!["x", "y"]);
        assert_eq!(result.records[0].value("y"), "4");
    }

    #[test]
    fn test_escaped_quotes() {
        let rows = parse("quote,n\n\"She said \"\"hi\"\"\",1\n").unwrap();
        assert_eq!(rows[0].value("quote"), "She said \"hi\"");
    }

    #[test]
    fn test_newline_inside_quotes_is_kept() {
        let rows = parse("note,n\n\"line one\nline two\",1\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value("note"), "line one\nline two");
    }

    #[test]
    fn test_lone_cr_terminates_row() {
        let rows = parse("a,b\r1,2\r3,4").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].value("a"), "3");
    }

    #[test]
    fn test_headers_and_values_trimmed() {
        let rows = parse(" First Name , Last Name \n  Ann ,  Lee  \n").unwrap();
        assert_eq!(rows[0].value("First Name"), "Ann");
        assert_eq!(rows[0].value("Last Name"), "Lee");
    }

    #[test]
    fn test_short_row_padded() {
        let rows = parse("a,b,c\n1\n").unwrap();
        assert_eq!(rows[0].value("a"), "1");
        assert_eq!(rows[0].get("b"), Some(""));
        assert_eq!(rows[0].get("c"), Some(""));
    }

    #[test]
    fn test_extra_columns_ignored() {
        let rows = parse("a,b\n1,2,3,4").unwrap();
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[0].value("b"), "2");
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(matches!(parse(""), Err(CsvError::EmptyFile)));
        assert!(matches!(parse("\n , \n\r\n"), Err(CsvError::EmptyFile)));
    }

    #[test]
    fn test_header_only_fails() {
        assert!(matches!(parse("a,b\n"), Err(CsvError::NoDataRows)));
    }

    #[test]
    fn test_bom_is_stripped() {
        let rows = parse("\u{feff}Lastname,Level\nLee,Level 3\n").unwrap();
        assert_eq!(rows[0].value("Lastname"), "Lee");
    }

    #[test]
    fn test_round_trip_through_writer() {
        let sources = [
            "Title,Notes,Email Address\nDr,\"Head of Maths, KS5\",a@x.org\nMs,\"Says \"\"hello\"\"\",b@x.org\nMr,,c@x.org\n",
            "a,b\n,,x\n1,2\n",
            "a,b,c\n1\n,,,,tail\n\"\",\" \",\"\"\n2,\"line\nbreak\",3\n",
        ];

        for source in sources {
            let first = parse_with_headers(source).unwrap();

            let written = to_csv(&first.headers, &first.records).unwrap();
            let second = parse_with_headers(&written).unwrap();

            assert_eq!(first.headers, second.headers, "{:?}", source);
            assert_eq!(first.records, second.records, "{:?}", source);
        }
    }

    #[test]
    fn test_text_past_last_header_does_not_keep_row() {
        let result = parse_with_headers("a,b\n,,x\n1,2\n").unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].value("a"), "1");
    }

    #[test]
    fn test_non_utf8_bytes_are_decoded() {
        // 0xEB is "ë" in windows-1252 and invalid on its own in UTF-8
        let bytes: &[u8] = b"Firstname,Lastname\nZo\xEB,Bront\xEB\n";
        let result = parse_bytes(bytes).unwrap();
        assert_eq!(result.records.len(), 1);
        assert!(result.records[0].value("Lastname").starts_with("Bront"));
    }

    #[test]
    fn test_utf8_bytes_skip_detection() {
        let result = parse_bytes("Firstname\nZoë\n".as_bytes()).unwrap();
        assert_eq!(result.encoding, "utf-8");
        assert_eq!(result.records[0].value("Firstname"), "Zoë");
    }

    #[test]
    fn test_latin1_decoding() {
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_unknown_encoding_label_decodes_lossily() {
        let decoded = decode_content(b"Zo\xEB,Lee", "x-unknown-label").unwrap();
        assert_eq!(decoded, "Zo\u{FFFD},Lee");
    }

    #[test]
    fn test_parse_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Lastname,Student Email\r\nLee,lee@school.org\r\n").unwrap();

        let result = parse_file(file.path()).unwrap();
        assert_eq!(result.headers, vec!["Lastname", "Student Email"]);
        assert_eq!(result.records[0].value("Student Email"), "lee@school.org");
    }

    #[test]
    fn test_oversize_rejected() {
        let bytes = vec![b'a'; MAX_FILE_SIZE + 1];
        assert!(matches!(parse_bytes(&bytes), Err(CsvError::TooLarge { .. })));
    }
}
