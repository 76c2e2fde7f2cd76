use crate::formats::FileType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A catalog entry for one model file on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: i64,
    pub filename: String,
    pub filepath: String,
    pub display_name: Option<String>,
    pub file_size: i64,
    pub file_type: FileType,
    /// Legacy single-valued membership; `model_collections` is authoritative.
    pub collection_id: Option<i64>,
    /// Import time, bumped again whenever a thumbnail is recaptured so
    /// viewers refetch the image.
    pub created_at: String,
    pub modified_at: Option<String>,
    pub thumbnail_path: Option<String>,
    pub source_metadata: Option<SourceMetadata>,
}

/// Provenance details attached by the user. Stored as JSON, never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Values captured from the filesystem when a file is imported.
#[derive(Debug, Clone)]
pub struct NewModel {
    pub filename: String,
    pub filepath: String,
    pub file_size: i64,
    pub file_type: FileType,
    pub collection_id: Option<i64>,
}

/// Minimal row used when diffing a folder against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPath {
    pub id: i64,
    pub filepath: String,
    pub thumbnail_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelWithTags {
    #[serde(flatten)]
    pub model: Model,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Collection,
    Watched,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Collection => "collection",
            CollectionKind::Watched => "watched",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collection" => Ok(CollectionKind::Collection),
            "watched" => Ok(CollectionKind::Watched),
            other => Err(format!("unknown collection type '{}'", other)),
        }
    }
}

/// A user collection or a watched folder. Watched folders are retired by
/// clearing `is_active`, never by deleting the row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CollectionKind,
    pub folder_path: Option<String>,
    pub is_active: bool,
}

/// An active watched folder as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedFolder {
    pub id: i64,
    pub folder_path: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    Name,
    #[default]
    Created,
    Modified,
    Size,
}

impl SortBy {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            SortBy::Name => "m.filename",
            SortBy::Created => "m.created_at",
            SortBy::Modified => "m.modified_at",
            SortBy::Size => "m.file_size",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub(crate) fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filters for browsing the catalog. Every field is optional; an empty
/// `FilterOptions` lists everything, newest first.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub collection_id: Option<i64>,
    /// A model must carry every listed tag.
    pub tag_ids: Vec<i64>,
    pub file_type: Option<FileType>,
    /// Substring match on filename or display name.
    pub search_query: Option<String>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}
