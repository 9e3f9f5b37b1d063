//! Google Drive link parsing
//!
//! Users paste share links in a comma-separated list; this module pulls the
//! file or folder ID out of every URL shape Drive hands out and classifies
//! each link so folders can be expanded before downloading.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static FILE_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"https://drive\.google\.com/open\?id=([\w-]+)").expect("valid pattern"),
        Regex::new(r"https://drive\.google\.com/file/d/([\w-]+)").expect("valid pattern"),
        Regex::new(r"https://drive\.google\.com/uc\?id=([\w-]+)").expect("valid pattern"),
    ]
});

static FOLDER_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"https://drive\.google\.com/drive/folders/([\w-]+)").expect("valid pattern"),
        Regex::new(r"https://drive\.google\.com/drive/u/\d+/folders/([\w-]+)")
            .expect("valid pattern"),
        Regex::new(r"https://drive\.google\.com/folderview\?id=([\w-]+)").expect("valid pattern"),
    ]
});

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LinkError {
    #[error("no download links were provided")]
    Empty,

    #[error("`{0}` is not a recognized Google Drive link")]
    Unrecognized(String),
}

/// IDs extracted from one submission, split by kind.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedLinks {
    pub file_ids: Vec<String>,
    pub folder_ids: Vec<String>,
}

/// Extract the ID from a single Drive link, tagging whether it points at a
/// folder.
fn classify(link: &str) -> Result<(String, bool), LinkError> {
    for pattern in FOLDER_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(link) {
            return Ok((caps[1].to_string(), true));
        }
    }
    for pattern in FILE_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(link) {
            return Ok((caps[1].to_string(), false));
        }
    }
    Err(LinkError::Unrecognized(link.to_string()))
}

/// Parse a comma-separated list of share links. The whole submission is
/// rejected if any single link is unrecognized.
pub fn parse_links(raw: &str) -> Result<ParsedLinks, LinkError> {
    let mut parsed = ParsedLinks::default();

    for link in raw.split(',').map(str::trim).filter(|l| !l.is_empty()) {
        let (id, is_folder) = classify(link)?;
        if is_folder {
            parsed.folder_ids.push(id);
        } else {
            parsed.file_ids.push(id);
        }
    }

    if parsed.file_ids.is_empty() && parsed.folder_ids.is_empty() {
        return Err(LinkError::Empty);
    }
    Ok(parsed)
}
