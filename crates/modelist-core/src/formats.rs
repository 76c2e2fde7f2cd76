//! The set of model formats the library understands.
//!
//! Scanner, watcher and importer all filter through [`FileType::from_path`],
//! so this table is the only place an extension is ever listed.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

/// Lowercase extensions (without the dot) accepted by the library.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["stl", "3mf", "obj"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Stl,
    #[serde(rename = "3mf")]
    ThreeMf,
    Obj,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Stl => "stl",
            FileType::ThreeMf => "3mf",
            FileType::Obj => "obj",
        }
    }

    /// Classify a path by its extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<FileType> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        ext.parse().ok()
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stl" => Ok(FileType::Stl),
            "3mf" => Ok(FileType::ThreeMf),
            "obj" => Ok(FileType::Obj),
            other => Err(format!("unknown file type '{}'", other)),
        }
    }
}

impl ToSql for FileType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for FileType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

pub fn is_supported(path: &Path) -> bool {
    FileType::from_path(path).is_some()
}

/// True when any component of `path` below `root` starts with a dot.
pub fn is_hidden_below(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}
