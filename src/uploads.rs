// uploads.rs
// Uploaded documents land on disk under MEDIA_ROOT, partitioned by
// entity kind and the record's year/month. Only the relative path is
// stored on the record.

use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use slug::slugify;
use std::{env, fs, path::Path};
use uuid::Uuid;

use crate::error::ApiError;

fn media_root() -> String {
    env::var("MEDIA_ROOT").unwrap_or_else(|_| "./media".to_string())
}

/// Slug of the original file name with its extension preserved, prefixed
/// with a UUID so repeated uploads of the same name never collide.
fn stored_name(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(slugify)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext {
        Some(ext) if !ext.is_empty() => format!("{}_{stem}.{ext}", Uuid::new_v4()),
        _ => format!("{}_{stem}", Uuid::new_v4()),
    }
}

/// Write an uploaded document and return its path relative to MEDIA_ROOT.
pub fn store_document(
    kind: &str,
    date: NaiveDate,
    original_name: &str,
    bytes: &[u8],
) -> Result<String, ApiError> {
    let relative = format!(
        "{kind}/{:04}/{:02}/{}",
        date.year(),
        date.month(),
        stored_name(original_name)
    );
    let full = format!("{}/{relative}", media_root());
    if let Some(dir) = Path::new(&full).parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating upload directory {}", dir.display()))?;
    }
    fs::write(&full, bytes).with_context(|| format!("writing upload {full}"))?;
    Ok(relative)
}
