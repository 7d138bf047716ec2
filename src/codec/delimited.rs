use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_DELIMITER, QUOTE_CHAR};

/// Layout of a delimiter-separated line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelimitedFormat {
    pub delimiter: char,
    /// Honour `"` enclosure; when false a quote is an ordinary character.
    pub quoted: bool,
    pub trim: bool,
    /// Stop tokenizing once this many fields were produced.
    pub max_fields: Option<usize>,
}

impl Default for DelimitedFormat {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            quoted: true,
            trim: true,
            max_fields: None,
        }
    }
}

/// A line that violates the quoting rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed line: {reason} Field ({field_index})")]
pub struct ParseError {
    pub field_index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    FieldStart,
    Unquoted,
    Quoted,
    // A quote was seen inside a quoted field: either an escaped quote or the closing one.
    QuoteSeen,
    AfterClosingQuote,
}

impl DelimitedFormat {
    pub fn with_delimiter(delimiter: char) -> Self {
        Self {
            delimiter,
            ..Self::default()
        }
    }

    pub fn parse(&self, line: &str) -> Result<Vec<String>, ParseError> {
        let mut fields = Vec::new();
        let mut current = String::new();
        let mut state = ScanState::FieldStart;

        for ch in line.chars() {
            match state {
                ScanState::FieldStart => {
                    if ch == self.delimiter {
                        if self.end_field(&mut fields, &mut current) {
                            return Ok(fields);
                        }
                    } else if self.quoted && ch == QUOTE_CHAR {
                        // only whitespace can precede the opening quote
                        current.clear();
                        state = ScanState::Quoted;
                    } else if self.trim && ch.is_whitespace() {
                        current.push(ch);
                    } else {
                        current.push(ch);
                        state = ScanState::Unquoted;
                    }
                }
                ScanState::Unquoted => {
                    if ch == self.delimiter {
                        if self.end_field(&mut fields, &mut current) {
                            return Ok(fields);
                        }
                        state = ScanState::FieldStart;
                    } else if self.quoted && ch == QUOTE_CHAR {
                        return Err(malformed(&fields, "Quote found inside an unquoted field."));
                    } else {
                        current.push(ch);
                    }
                }
                ScanState::Quoted => {
                    if ch == QUOTE_CHAR {
                        state = ScanState::QuoteSeen;
                    } else {
                        current.push(ch);
                    }
                }
                ScanState::QuoteSeen => {
                    if ch == QUOTE_CHAR {
                        current.push(QUOTE_CHAR);
                        state = ScanState::Quoted;
                    } else if ch == self.delimiter {
                        if self.end_field(&mut fields, &mut current) {
                            return Ok(fields);
                        }
                        state = ScanState::FieldStart;
                    } else if self.trim && ch.is_whitespace() {
                        state = ScanState::AfterClosingQuote;
                    } else {
                        return Err(malformed(&fields, "Unexpected text after closing quote."));
                    }
                }
                ScanState::AfterClosingQuote => {
                    if ch == self.delimiter {
                        if self.end_field(&mut fields, &mut current) {
                            return Ok(fields);
                        }
                        state = ScanState::FieldStart;
                    } else if !ch.is_whitespace() {
                        return Err(malformed(&fields, "Unexpected text after closing quote."));
                    }
                }
            }
        }

        if state == ScanState::Quoted {
            return Err(malformed(&fields, "Unterminated quoted field."));
        }
        self.end_field(&mut fields, &mut current);
        Ok(fields)
    }

    // Returns true once max_fields is reached.
    fn end_field(&self, fields: &mut Vec<String>, current: &mut String) -> bool {
        let value = if self.trim {
            current.trim().to_string()
        } else {
            current.clone()
        };
        current.clear();
        fields.push(value);
        matches!(self.max_fields, Some(max) if fields.len() >= max)
    }

    pub fn serialize<S: AsRef<str>>(&self, fields: &[S]) -> String {
        serialize_delimited(fields, self.delimiter)
    }
}

fn malformed(fields: &[String], reason: &str) -> ParseError {
    ParseError {
        field_index: fields.len(),
        reason: reason.to_string(),
    }
}

/// Tokenizes one delimited line with quoting enabled.
pub fn parse_delimited(line: &str, delimiter: char, trim: bool) -> Result<Vec<String>, ParseError> {
    DelimitedFormat {
        delimiter,
        trim,
        ..DelimitedFormat::default()
    }
    .parse(line)
}

/// Joins fields back into a line, quoting any field that contains the delimiter or a quote.
pub fn serialize_delimited<S: AsRef<str>>(fields: &[S], delimiter: char) -> String {
    let mut line = String::new();
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            line.push(delimiter);
        }
        let value = field.as_ref().replace(['\r', '\n'], " ");
        if value.contains(delimiter) || value.contains(QUOTE_CHAR) {
            line.push(QUOTE_CHAR);
            line.push_str(&value.replace('"', "\"\""));
            line.push(QUOTE_CHAR);
        } else {
            line.push_str(&value);
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_fields() {
        let fields = parse_delimited("3,c,x", ',', true).unwrap();
        assert_eq!(fields, vec!["3", "c", "x"]);
    }

    #[test]
    fn test_trailing_empty_field_is_kept() {
        assert_eq!(parse_delimited("a,", ',', true).unwrap(), vec!["a", ""]);
        assert_eq!(parse_delimited("", ',', true).unwrap(), vec![""]);
    }

    #[test]
    fn test_quoted_delimiter_and_escaped_quote() {
        let fields = parse_delimited(r#"1,"Smith, John","say ""hi""""#, ',', true).unwrap();
        assert_eq!(fields, vec!["1", "Smith, John", r#"say "hi""#]);
    }

    #[test]
    fn test_whitespace_trimming() {
        let fields = parse_delimited(r#"  a ,  "b c"  , d"#, ',', true).unwrap();
        assert_eq!(fields, vec!["a", "b c", "d"]);

        let untrimmed = parse_delimited(" a , d", ',', false).unwrap();
        assert_eq!(untrimmed, vec![" a ", " d"]);
    }

    #[test]
    fn test_unterminated_quote_is_malformed() {
        let err = parse_delimited(r#"a,b,"open"#, ',', true).unwrap_err();
        assert_eq!(err.field_index, 2);
        assert!(err.reason.contains("Unterminated"));
    }

    #[test]
    fn test_quote_inside_unquoted_field_is_malformed() {
        let err = parse_delimited(r#"a,b"c,d"#, ',', true).unwrap_err();
        assert_eq!(err.field_index, 1);
    }

    #[test]
    fn test_text_after_closing_quote_is_malformed() {
        let err = parse_delimited(r#""ab"c,d"#, ',', true).unwrap_err();
        assert_eq!(err.field_index, 0);
    }

    #[test]
    fn test_quoting_disabled_treats_quote_as_text() {
        let format = DelimitedFormat {
            quoted: false,
            ..DelimitedFormat::default()
        };
        assert_eq!(format.parse(r#"a"b,c"#).unwrap(), vec![r#"a"b"#, "c"]);
    }

    #[test]
    fn test_max_fields_discards_rest() {
        let format = DelimitedFormat {
            max_fields: Some(2),
            ..DelimitedFormat::default()
        };
        assert_eq!(format.parse(r#"a,b,"unterminated"#).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_tab_delimiter() {
        let fields = parse_delimited("1\tx\t", '\t', false).unwrap();
        assert_eq!(fields, vec!["1", "x", ""]);
    }

    #[test]
    fn test_serialize_quotes_when_needed() {
        let line = serialize_delimited(&["1", "Smith, John", "say \"hi\"", "a\nb"], ',');
        assert_eq!(line, r#"1,"Smith, John","say ""hi""",a b"#);
        assert_eq!(
            parse_delimited(&line, ',', true).unwrap(),
            vec!["1", "Smith, John", "say \"hi\"", "a b"]
        );
    }
}
