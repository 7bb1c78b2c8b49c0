use std::io::{self, Write};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::models::ChapterKey;

pub fn get_user_input(prompt: &str) -> io::Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// File extension of the last path segment of `url`, ignoring query and fragment.
pub fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Which chapters of a branch to download, e.g. `1-10,12,15.5`.
///
/// Empty input or `*` selects everything. Ranges are inclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum ChapterSelection {
    All,
    Ranges(Vec<(f64, f64)>),
}

impl ChapterSelection {
    pub fn contains(&self, key: ChapterKey) -> bool {
        match self {
            ChapterSelection::All => true,
            ChapterSelection::Ranges(ranges) => ranges
                .iter()
                .any(|&(from, to)| from <= key.value() && key.value() <= to),
        }
    }
}

impl FromStr for ChapterSelection {
    type Err = Error;

    fn from_str(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() || pattern == "*" {
            return Ok(ChapterSelection::All);
        }

        let number = |text: &str| {
            text.trim()
                .parse::<f64>()
                .map_err(|_| Error::parse("chapter_selection", format!("`{text}` is not a chapter number")))
        };

        let mut ranges = Vec::new();
        for item in pattern.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let range = match item.split_once('-') {
                Some((from, to)) => (number(from)?, number(to)?),
                None => {
                    let n = number(item)?;
                    (n, n)
                }
            };
            if range.0 > range.1 {
                return Err(Error::parse("chapter_selection", format!("range `{item}` is reversed")));
            }
            ranges.push(range);
        }
        Ok(ChapterSelection::Ranges(ranges))
    }
}
