use serde::{Deserialize, Serialize};

/// Column widths (in characters) of a fixed-width line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedWidthFormat {
    pub widths: Vec<usize>,
    #[serde(default = "default_trim")]
    pub trim: bool,
}

fn default_trim() -> bool {
    true
}

impl FixedWidthFormat {
    pub fn new(widths: Vec<usize>) -> Self {
        Self { widths, trim: true }
    }

    pub fn total_width(&self) -> usize {
        self.widths.iter().sum()
    }

    pub fn parse(&self, line: &str) -> Vec<String> {
        parse_fixed_width(line, &self.widths, self.trim)
    }

    pub fn serialize<S: AsRef<str>>(&self, fields: &[S]) -> String {
        serialize_fixed_width(fields, &self.widths)
    }
}

/// Slices a line into one field per width. A line shorter than the layout
/// yields short (or empty) trailing fields; characters past the last column
/// are ignored.
pub fn parse_fixed_width(line: &str, widths: &[usize], trim: bool) -> Vec<String> {
    let mut chars = line.chars();
    widths
        .iter()
        .map(|&width| {
            let value: String = chars.by_ref().take(width).collect();
            if trim {
                value.trim().to_string()
            } else {
                value
            }
        })
        .collect()
}

/// Left-aligns each field in its column, truncating values that are too wide.
pub fn serialize_fixed_width<S: AsRef<str>>(fields: &[S], widths: &[usize]) -> String {
    let mut line = String::with_capacity(widths.iter().sum());
    for (idx, &width) in widths.iter().enumerate() {
        let value = fields.get(idx).map(|f| f.as_ref()).unwrap_or("");
        let mut written = 0;
        for ch in value.chars().take(width) {
            line.push(ch);
            written += 1;
        }
        line.extend(std::iter::repeat(' ').take(width - written));
    }
    line
}
