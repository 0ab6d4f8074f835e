use std::path::Path;

use time::{PrimitiveDateTime, format_description::FormatItem, macros::format_description};

use super::StoreError;

/// Local wall-clock time as stored in DATETIME columns.
pub type Timestamp = PrimitiveDateTime;

const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Render a timestamp in the stored `YYYY-MM-DD HH:MM:SS` form.
pub fn format_timestamp(value: Timestamp) -> String {
    value
        .format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| value.to_string())
}

/// Parse a stored timestamp.
pub fn parse_timestamp(value: &str) -> Result<Timestamp, StoreError> {
    PrimitiveDateTime::parse(value.trim(), TIMESTAMP_FORMAT)
        .map_err(|_| StoreError::InvalidTimestamp(value.to_string()))
}

pub(super) fn parse_optional_timestamp(
    value: Option<String>,
) -> Result<Option<Timestamp>, StoreError> {
    match value {
        Some(text) if !text.trim().is_empty() => parse_timestamp(&text).map(Some),
        _ => Ok(None),
    }
}

/// Quote an identifier for interpolation into SQL.
pub(super) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(super) fn create_parent_if_needed(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}
