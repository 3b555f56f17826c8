use crate::domain::calendar::parse_date;
use crate::domain::models::{GroupKind, GroupRecord, ItemKind, ItemRecord};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persistence for items and groups. Writes of `own_active` fail with
/// `NotFound` when the row does not exist.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn load_item(&self, item_id: &str) -> Result<Option<ItemRecord>, InfraError>;

    async fn load_group(&self, group_id: &str) -> Result<Option<GroupRecord>, InfraError>;

    async fn list_members(&self, group_id: &str) -> Result<Vec<ItemRecord>, InfraError>;

    async fn save_item(&self, record: &ItemRecord) -> Result<(), InfraError>;

    async fn save_group(&self, record: &GroupRecord) -> Result<(), InfraError>;

    async fn write_item_active(&self, item_id: &str, active: bool) -> Result<(), InfraError>;

    async fn write_group_active(&self, group_id: &str, active: bool) -> Result<(), InfraError>;
}

type RawItemRow = (String, String, bool, Option<String>, Option<String>, Option<String>);
type RawGroupRow = (String, String, bool, Option<String>, Option<String>);

const ITEM_COLUMNS: &str = "id, kind, is_active, scheduling_config, parent_id, start_date";
const GROUP_COLUMNS: &str = "id, kind, is_active, scheduling_config, start_date";

#[derive(Debug, Clone)]
pub struct SqliteItemStore {
    db_path: PathBuf,
}

impl SqliteItemStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }
}

fn config_column(id: &str, raw: Option<String>) -> Option<serde_json::Value> {
    let raw = raw?;
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(error) => {
            // Kept as a string so the lenient reader records the issue and falls back to daily.
            tracing::warn!(id, %error, "scheduling_config is not valid JSON");
            Some(serde_json::Value::String(raw))
        }
    }
}

fn config_text(value: &Option<serde_json::Value>) -> Result<Option<String>, InfraError> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(InfraError::from)
}

fn item_from_row(row: RawItemRow) -> Result<ItemRecord, InfraError> {
    let (id, kind, is_active, config, parent_id, start_date) = row;
    let kind = ItemKind::parse(&kind)
        .ok_or_else(|| InfraError::Store(format!("unknown item kind '{kind}' for {id}")))?;
    Ok(ItemRecord {
        schedule_config: config_column(&id, config),
        kind,
        own_active: is_active,
        parent_id,
        start_date: start_date.as_deref().and_then(parse_date),
        id,
    })
}

fn group_from_row(row: RawGroupRow) -> Result<GroupRecord, InfraError> {
    let (id, kind, is_active, config, start_date) = row;
    let kind = GroupKind::parse(&kind)
        .ok_or_else(|| InfraError::Store(format!("unknown group kind '{kind}' for {id}")))?;
    Ok(GroupRecord {
        schedule_config: config_column(&id, config),
        kind,
        own_active: is_active,
        start_date: start_date.as_deref().and_then(parse_date),
        id,
    })
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn load_item(&self, item_id: &str) -> Result<Option<ItemRecord>, InfraError> {
        let connection = self.connect()?;
        let row: Option<RawItemRow> = connection
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM schedule_items WHERE id = ?1"),
                params![item_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?;
        row.map(item_from_row).transpose()
    }

    async fn load_group(&self, group_id: &str) -> Result<Option<GroupRecord>, InfraError> {
        let connection = self.connect()?;
        let row: Option<RawGroupRow> = connection
            .query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM schedule_groups WHERE id = ?1"),
                params![group_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;
        row.map(group_from_row).transpose()
    }

    async fn list_members(&self, group_id: &str) -> Result<Vec<ItemRecord>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM schedule_items WHERE parent_id = ?1 ORDER BY id"
        ))?;
        let rows = statement
            .query_map(params![group_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<Result<Vec<RawItemRow>, _>>()?;
        rows.into_iter().map(item_from_row).collect()
    }

    async fn save_item(&self, record: &ItemRecord) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO schedule_items (id, kind, is_active, scheduling_config, parent_id, start_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
               kind = excluded.kind,
               is_active = excluded.is_active,
               scheduling_config = excluded.scheduling_config,
               parent_id = excluded.parent_id,
               start_date = excluded.start_date,
               updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![
                record.id,
                record.kind.as_str(),
                record.own_active,
                config_text(&record.schedule_config)?,
                record.parent_id,
                record.start_date.map(|date| date.to_string()),
            ],
        )?;
        Ok(())
    }

    async fn save_group(&self, record: &GroupRecord) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO schedule_groups (id, kind, is_active, scheduling_config, start_date)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               kind = excluded.kind,
               is_active = excluded.is_active,
               scheduling_config = excluded.scheduling_config,
               start_date = excluded.start_date,
               updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![
                record.id,
                record.kind.as_str(),
                record.own_active,
                config_text(&record.schedule_config)?,
                record.start_date.map(|date| date.to_string()),
            ],
        )?;
        Ok(())
    }

    async fn write_item_active(&self, item_id: &str, active: bool) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE schedule_items
             SET is_active = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?1",
            params![item_id, active],
        )?;
        if changed == 0 {
            return Err(InfraError::NotFound(format!("item {item_id}")));
        }
        Ok(())
    }

    async fn write_group_active(&self, group_id: &str, active: bool) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE schedule_groups
             SET is_active = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?1",
            params![group_id, active],
        )?;
        if changed == 0 {
            return Err(InfraError::NotFound(format!("group {group_id}")));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryItemStore {
    items: Mutex<HashMap<String, ItemRecord>>,
    groups: Mutex<HashMap<String, GroupRecord>>,
}

impl InMemoryItemStore {
    fn lock_items(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, ItemRecord>>, InfraError> {
        self.items
            .lock()
            .map_err(|error| InfraError::Store(format!("item store lock poisoned: {error}")))
    }

    fn lock_groups(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, GroupRecord>>, InfraError> {
        self.groups
            .lock()
            .map_err(|error| InfraError::Store(format!("group store lock poisoned: {error}")))
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn load_item(&self, item_id: &str) -> Result<Option<ItemRecord>, InfraError> {
        Ok(self.lock_items()?.get(item_id).cloned())
    }

    async fn load_group(&self, group_id: &str) -> Result<Option<GroupRecord>, InfraError> {
        Ok(self.lock_groups()?.get(group_id).cloned())
    }

    async fn list_members(&self, group_id: &str) -> Result<Vec<ItemRecord>, InfraError> {
        let items = self.lock_items()?;
        let mut members = items
            .values()
            .filter(|record| record.parent_id.as_deref() == Some(group_id))
            .cloned()
            .collect::<Vec<_>>();
        members.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(members)
    }

    async fn save_item(&self, record: &ItemRecord) -> Result<(), InfraError> {
        self.lock_items()?.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn save_group(&self, record: &GroupRecord) -> Result<(), InfraError> {
        self.lock_groups()?.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn write_item_active(&self, item_id: &str, active: bool) -> Result<(), InfraError> {
        let mut items = self.lock_items()?;
        let record = items
            .get_mut(item_id)
            .ok_or_else(|| InfraError::NotFound(format!("item {item_id}")))?;
        record.own_active = active;
        Ok(())
    }

    async fn write_group_active(&self, group_id: &str, active: bool) -> Result<(), InfraError> {
        let mut groups = self.lock_groups()?;
        let record = groups
            .get_mut(group_id)
            .ok_or_else(|| InfraError::NotFound(format!("group {group_id}")))?;
        record.own_active = active;
        Ok(())
    }
}
