use super::models::*;
use super::sqlite::Catalog;
use crate::error::Error;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::HashMap;
use tracing::{debug, warn};

const MODEL_COLUMNS: &str = "m.id, m.filename, m.filepath, m.display_name, m.file_size, \
     m.file_type, m.collection_id, m.created_at, m.modified_at, m.thumbnail_path, \
     m.source_metadata";

fn model_from_row(row: &Row<'_>) -> rusqlite::Result<Model> {
    let id: i64 = row.get(0)?;
    let metadata: Option<String> = row.get(10)?;
    let source_metadata = match metadata.as_deref() {
        Some(json) => match serde_json::from_str::<SourceMetadata>(json) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Ignoring unreadable source metadata on model {}: {}", id, e);
                None
            }
        },
        None => None,
    };
    Ok(Model {
        id,
        filename: row.get(1)?,
        filepath: row.get(2)?,
        display_name: row.get(3)?,
        file_size: row.get(4)?,
        file_type: row.get(5)?,
        collection_id: row.get(6)?,
        created_at: row.get(7)?,
        modified_at: row.get(8)?,
        thumbnail_path: row.get(9)?,
        source_metadata,
    })
}

fn collection_from_row(row: &Row<'_>) -> rusqlite::Result<Collection> {
    let kind: String = row.get(2)?;
    Ok(Collection {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: kind.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?,
        folder_path: row.get(3)?,
        is_active: row.get(4)?,
    })
}

fn find_model(conn: &Connection, clause: &str, value: Value) -> rusqlite::Result<Option<Model>> {
    match conn.query_row(
        &format!("SELECT {} FROM models m WHERE {} = ?1", MODEL_COLUMNS, clause),
        params![value],
        model_from_row,
    ) {
        Ok(model) => Ok(Some(model)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

impl Catalog {
    // ── Models ───────────────────────────────────────────────────

    /// Insert a model row. Returns `None` when a model with the same filepath
    /// already exists; the existing row is left untouched.
    pub fn insert_model(&self, model: &NewModel) -> Result<Option<i64>, Error> {
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let inserted = tx.execute(
                "INSERT INTO models (filename, filepath, file_size, file_type, collection_id, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(filepath) DO NOTHING",
                params![
                    model.filename,
                    model.filepath,
                    model.file_size,
                    model.file_type,
                    model.collection_id,
                    now
                ],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            let id = tx.last_insert_rowid();
            if let Some(collection_id) = model.collection_id {
                tx.execute(
                    "INSERT OR IGNORE INTO model_collections (model_id, collection_id) VALUES (?1, ?2)",
                    params![id, collection_id],
                )?;
            }
            tx.commit()?;
            Ok(Some(id))
        })
    }

    /// Delete a model row; tag and collection memberships cascade.
    pub fn delete_model(&self, id: i64) -> Result<bool, Error> {
        let deleted =
            self.with_conn(|conn| conn.execute("DELETE FROM models WHERE id = ?1", params![id]))?;
        Ok(deleted > 0)
    }

    pub fn get_model(&self, id: i64) -> Result<Option<Model>, Error> {
        self.with_conn(|conn| find_model(conn, "m.id", Value::Integer(id)))
    }

    pub fn find_model_by_filepath(&self, filepath: &str) -> Result<Option<Model>, Error> {
        self.with_conn(|conn| find_model(conn, "m.filepath", Value::Text(filepath.to_string())))
    }

    /// Models belonging to a collection, through either the join table or
    /// the legacy `collection_id` column.
    pub fn list_models_by_collection(&self, collection_id: i64) -> Result<Vec<ModelPath>, Error> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.filepath, m.thumbnail_path FROM models m \
                 WHERE m.collection_id = ?1 \
                    OR EXISTS (SELECT 1 FROM model_collections mc \
                               WHERE mc.model_id = m.id AND mc.collection_id = ?1) \
                 ORDER BY m.id",
            )?;
            let rows = stmt
                .query_map(params![collection_id], |row| {
                    Ok(ModelPath {
                        id: row.get(0)?,
                        filepath: row.get(1)?,
                        thumbnail_path: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Every model in insertion order.
    pub fn list_all_models(&self) -> Result<Vec<Model>, Error> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM models m ORDER BY m.id", MODEL_COLUMNS))?;
            let models = stmt
                .query_map([], model_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(models)
        })
    }

    pub fn count_models(&self) -> Result<i64, Error> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM models", [], |row| row.get(0)))
    }

    pub fn update_thumbnail_path(&self, id: i64, thumbnail_path: &str) -> Result<(), Error> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE models SET thumbnail_path = ?1 WHERE id = ?2",
                params![thumbnail_path, id],
            )
        })?;
        Ok(())
    }

    /// Point a model at a recaptured thumbnail. `created_at` is bumped too so
    /// viewers holding the old image refetch it.
    pub fn replace_thumbnail_path(&self, id: i64, thumbnail_path: &str) -> Result<(), Error> {
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE models SET thumbnail_path = ?1, created_at = ?2 WHERE id = ?3",
                params![thumbnail_path, now, id],
            )
        })?;
        Ok(())
    }

    pub fn update_display_name(&self, id: i64, display_name: Option<&str>) -> Result<(), Error> {
        let now = chrono::Utc::now().to_rfc3339();
        let updated = self.with_conn(|conn| {
            conn.execute(
                "UPDATE models SET display_name = ?1, modified_at = ?2 WHERE id = ?3",
                params![display_name, now, id],
            )
        })?;
        if updated == 0 {
            return Err(Error::ModelNotFound(id));
        }
        Ok(())
    }

    pub fn update_source_metadata(
        &self,
        id: i64,
        metadata: Option<&SourceMetadata>,
    ) -> Result<(), Error> {
        let json = metadata.map(serde_json::to_string).transpose()?;
        let now = chrono::Utc::now().to_rfc3339();
        let updated = self.with_conn(|conn| {
            conn.execute(
                "UPDATE models SET source_metadata = ?1, modified_at = ?2 WHERE id = ?3",
                params![json, now, id],
            )
        })?;
        if updated == 0 {
            return Err(Error::ModelNotFound(id));
        }
        Ok(())
    }

    /// Browse the catalog with explicit filters, attaching each model's tags.
    pub fn query_models(&self, filters: &FilterOptions) -> Result<Vec<ModelWithTags>, Error> {
        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(collection_id) = filters.collection_id {
            values.push(Value::Integer(collection_id));
            let n = values.len();
            conditions.push(format!(
                "(m.collection_id = ?{n} OR EXISTS (SELECT 1 FROM model_collections mc \
                  WHERE mc.model_id = m.id AND mc.collection_id = ?{n}))"
            ));
        }
        for tag_id in &filters.tag_ids {
            values.push(Value::Integer(*tag_id));
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM model_tags mt WHERE mt.model_id = m.id AND mt.tag_id = ?{})",
                values.len()
            ));
        }
        if let Some(file_type) = filters.file_type {
            values.push(Value::Text(file_type.as_str().to_string()));
            conditions.push(format!("m.file_type = ?{}", values.len()));
        }
        if let Some(query) = filters.search_query.as_deref().map(str::trim) {
            if !query.is_empty() {
                values.push(Value::Text(format!("%{}%", query)));
                let n = values.len();
                conditions.push(format!("(m.filename LIKE ?{n} OR m.display_name LIKE ?{n})"));
            }
        }

        let mut sql = format!("SELECT {} FROM models m", MODEL_COLUMNS);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        let order = filters.sort_order.keyword();
        sql.push_str(&format!(
            " ORDER BY {} {}, m.id {}",
            filters.sort_by.column(),
            order,
            order
        ));
        debug!("query_models: {}", sql);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let models = stmt
                .query_map(params_from_iter(values.iter()), model_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut tags_by_model: HashMap<i64, Vec<Tag>> = HashMap::new();
            let mut tag_stmt = conn.prepare(
                "SELECT mt.model_id, t.id, t.name, t.color FROM model_tags mt \
                 JOIN tags t ON t.id = mt.tag_id ORDER BY t.name",
            )?;
            let rows = tag_stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    Tag {
                        id: row.get(1)?,
                        name: row.get(2)?,
                        color: row.get(3)?,
                    },
                ))
            })?;
            for row in rows {
                let (model_id, tag) = row?;
                tags_by_model.entry(model_id).or_default().push(tag);
            }

            Ok(models
                .into_iter()
                .map(|model| {
                    let tags = tags_by_model.remove(&model.id).unwrap_or_default();
                    ModelWithTags { model, tags }
                })
                .collect())
        })
    }

    // ── Tags ─────────────────────────────────────────────────────

    pub fn create_tag(&self, name: &str, color: &str) -> Result<Tag, Error> {
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tags (name, color) VALUES (?1, ?2)",
                params![name, color],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(Tag {
            id,
            name: name.to_string(),
            color: color.to_string(),
        })
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, color FROM tags ORDER BY name")?;
            let tags = stmt
                .query_map([], |row| {
                    Ok(Tag {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        color: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tags)
        })
    }

    pub fn add_tag_to_model(&self, model_id: i64, tag_id: i64) -> Result<(), Error> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO model_tags (model_id, tag_id) VALUES (?1, ?2)",
                params![model_id, tag_id],
            )
        })?;
        Ok(())
    }

    pub fn remove_tag_from_model(&self, model_id: i64, tag_id: i64) -> Result<(), Error> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM model_tags WHERE model_id = ?1 AND tag_id = ?2",
                params![model_id, tag_id],
            )
        })?;
        Ok(())
    }

    // ── Collections ──────────────────────────────────────────────

    pub fn create_collection(&self, name: &str) -> Result<Collection, Error> {
        self.insert_collection(name, CollectionKind::Collection, None)
    }

    pub fn create_watched_collection(&self, name: &str, folder_path: &str) -> Result<Collection, Error> {
        self.insert_collection(name, CollectionKind::Watched, Some(folder_path))
    }

    fn insert_collection(
        &self,
        name: &str,
        kind: CollectionKind,
        folder_path: Option<&str>,
    ) -> Result<Collection, Error> {
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO collections (name, type, folder_path, is_active) VALUES (?1, ?2, ?3, 1)",
                params![name, kind.as_str(), folder_path],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(Collection {
            id,
            name: name.to_string(),
            kind,
            folder_path: folder_path.map(str::to_string),
            is_active: true,
        })
    }

    pub fn get_collection(&self, id: i64) -> Result<Option<Collection>, Error> {
        self.with_conn(|conn| {
            match conn.query_row(
                "SELECT id, name, type, folder_path, is_active FROM collections WHERE id = ?1",
                params![id],
                collection_from_row,
            ) {
                Ok(collection) => Ok(Some(collection)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    /// Active collections of both kinds, ordered by name.
    pub fn list_collections(&self) -> Result<Vec<Collection>, Error> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, type, folder_path, is_active FROM collections \
                 WHERE is_active = 1 ORDER BY name",
            )?;
            let collections = stmt
                .query_map([], collection_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(collections)
        })
    }

    pub fn list_active_watched_collections(&self) -> Result<Vec<WatchedFolder>, Error> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, folder_path FROM collections \
                 WHERE type = 'watched' AND is_active = 1 AND folder_path IS NOT NULL \
                 ORDER BY id",
            )?;
            let folders = stmt
                .query_map([], |row| {
                    Ok(WatchedFolder {
                        id: row.get(0)?,
                        folder_path: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(folders)
        })
    }

    pub fn deactivate_collection(&self, id: i64) -> Result<(), Error> {
        let updated = self.with_conn(|conn| {
            conn.execute(
                "UPDATE collections SET is_active = 0 WHERE id = ?1",
                params![id],
            )
        })?;
        if updated == 0 {
            return Err(Error::CollectionNotFound(id));
        }
        Ok(())
    }

    /// True when the model is also filed under an active watched folder
    /// other than `collection_id`.
    pub fn is_in_other_watched_folder(&self, model_id: i64, collection_id: i64) -> Result<bool, Error> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM collections c \
                 WHERE c.id != ?2 AND c.type = 'watched' AND c.is_active = 1 \
                   AND (c.id IN (SELECT mc.collection_id FROM model_collections mc WHERE mc.model_id = ?1) \
                        OR c.id = (SELECT m.collection_id FROM models m WHERE m.id = ?1)))",
                params![model_id, collection_id],
                |row| row.get(0),
            )
        })
    }

    /// Returns `false` when the model already belonged to the collection.
    pub fn add_model_to_collection(&self, model_id: i64, collection_id: i64) -> Result<bool, Error> {
        let inserted = self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO model_collections (model_id, collection_id) VALUES (?1, ?2)",
                params![model_id, collection_id],
            )
        })?;
        Ok(inserted > 0)
    }

    pub fn remove_model_from_collection(
        &self,
        model_id: i64,
        collection_id: i64,
    ) -> Result<(), Error> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM model_collections WHERE model_id = ?1 AND collection_id = ?2",
                params![model_id, collection_id],
            )?;
            tx.execute(
                "UPDATE models SET collection_id = NULL WHERE id = ?1 AND collection_id = ?2",
                params![model_id, collection_id],
            )?;
            tx.commit()
        })?;
        Ok(())
    }
}
