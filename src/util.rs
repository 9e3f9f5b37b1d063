//! Small shared helpers: filename hygiene, human-readable sizes, and
//! destination file creation.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tokio::fs::{self, File};

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;
const TB: f64 = GB * 1024.0;
const PB: f64 = TB * 1024.0;
const EB: f64 = PB * 1024.0;
const ZB: f64 = EB * 1024.0;
const YB: f64 = ZB * 1024.0;

static ILLEGAL_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("valid filename regex"));

/// Replace characters that are unsafe in filenames with `_` and cap the
/// length at 255 characters.
pub fn sanitize_file_name(name: &str) -> String {
    ILLEGAL_FILENAME_CHARS
        .replace_all(name, "_")
        .chars()
        .take(255)
        .collect()
}

/// Render a byte count with two decimals and the largest fitting unit.
/// Counts below one KiB render with no unit suffix.
pub fn format_bytes(bytes: u64) -> String {
    let bytes = bytes as f64;
    for (threshold, unit) in [
        (YB, "YB"),
        (ZB, "ZB"),
        (EB, "EB"),
        (PB, "PB"),
        (TB, "TB"),
        (GB, "GB"),
        (MB, "MB"),
        (KB, "KB"),
    ] {
        if bytes >= threshold {
            let size = bytes / threshold;
            return format!("{size:.2} {unit}");
        }
    }
    format!("{bytes:.2} ")
}

/// One directory in the destination tree.
#[derive(Debug, Serialize)]
pub struct FolderNode {
    pub path: String,
    pub name: String,
    pub children: Vec<FolderNode>,
}

/// Build the directory tree rooted at `root`. Files are skipped; only
/// folders are destination candidates.
pub fn folder_tree(root: &Path) -> std::io::Result<FolderNode> {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());
    let mut node = FolderNode {
        path: root.display().to_string(),
        name,
        children: Vec::new(),
    };

    let mut entries = std::fs::read_dir(root)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        if entry.file_type()?.is_dir() {
            node.children.push(folder_tree(&entry.path())?);
        }
    }
    Ok(node)
}

/// Create the destination file, creating its parent directories first.
pub async fn create_dest_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    File::create(path).await
}
