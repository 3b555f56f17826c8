pub mod application;
pub mod domain;
pub mod infrastructure;

use application::bootstrap::bootstrap_workspace;
use application::commands::{
    create_group_impl, create_item_impl, resolve_group_members_impl, resolve_item_impl,
    retry_cascade_impl, set_group_active_impl, set_item_active_impl, set_timezone_impl,
    update_item_schedule_impl,
};
use serde::Serialize;
use std::path::PathBuf;

pub use application::cascade::{CascadeCoordinator, CascadeReport, FailedMember, RetryPolicy};
pub use application::commands::{
    AppState, CascadeResponse, GroupOverviewResponse, ItemStatusResponse,
};
pub use domain::models::{GroupEntity, GroupKind, ItemKind, SchedulableItem};
pub use domain::schedule::{is_due_on, next_due_on, SchedulingConfig, WeekOrdinal};
pub use domain::status::{resolve, resolve_detailed, resolve_group, EffectiveStatus};
pub use infrastructure::error::InfraError;

#[derive(Debug, Serialize)]
pub struct BootstrapResponse {
    pub app_name: String,
    pub workspace_root: String,
    pub database_path: String,
}

pub fn bootstrap(root: Option<String>) -> Result<BootstrapResponse, String> {
    let workspace_root = match root {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };

    let result = bootstrap_workspace(&workspace_root).map_err(|error| error.to_string())?;
    Ok(BootstrapResponse {
        app_name: result.config.app_name,
        workspace_root: result.workspace_root.display().to_string(),
        database_path: result.database_path.display().to_string(),
    })
}

/// Opens the workspace at `root` (or the current directory) for the command surface below.
pub fn open(root: Option<String>) -> Result<AppState, String> {
    let workspace_root = match root {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };
    AppState::new(workspace_root).map_err(|error| error.to_string())
}

pub async fn create_group(
    state: &AppState,
    kind: String,
    schedule_config: Option<serde_json::Value>,
    start_date: Option<String>,
) -> Result<GroupEntity, String> {
    create_group_impl(state, kind, schedule_config, start_date)
        .await
        .map_err(|error| state.command_error("create_group", &error))
}

pub async fn create_item(
    state: &AppState,
    kind: String,
    parent_id: Option<String>,
    schedule_config: Option<serde_json::Value>,
    start_date: Option<String>,
) -> Result<SchedulableItem, String> {
    create_item_impl(state, kind, parent_id, schedule_config, start_date)
        .await
        .map_err(|error| state.command_error("create_item", &error))
}

pub async fn update_item_schedule(
    state: &AppState,
    item_id: String,
    schedule_config: Option<serde_json::Value>,
    start_date: Option<String>,
) -> Result<SchedulableItem, String> {
    update_item_schedule_impl(state, item_id, schedule_config, start_date)
        .await
        .map_err(|error| state.command_error("update_item_schedule", &error))
}

pub async fn set_item_active(
    state: &AppState,
    item_id: String,
    active: bool,
) -> Result<ItemStatusResponse, String> {
    set_item_active_impl(state, item_id, active)
        .await
        .map_err(|error| state.command_error("set_item_active", &error))
}

pub async fn resolve_item(state: &AppState, item_id: String) -> Result<ItemStatusResponse, String> {
    resolve_item_impl(state, item_id)
        .await
        .map_err(|error| state.command_error("resolve_item", &error))
}

pub async fn resolve_group_members(
    state: &AppState,
    group_id: String,
) -> Result<GroupOverviewResponse, String> {
    resolve_group_members_impl(state, group_id)
        .await
        .map_err(|error| state.command_error("resolve_group_members", &error))
}

pub async fn set_group_active(
    state: &AppState,
    group_id: String,
    active: bool,
) -> Result<CascadeResponse, String> {
    set_group_active_impl(state, group_id, active)
        .await
        .map_err(|error| state.command_error("set_group_active", &error))
}

pub async fn retry_cascade(
    state: &AppState,
    group_id: String,
    active: bool,
    item_ids: Vec<String>,
) -> Result<CascadeResponse, String> {
    retry_cascade_impl(state, group_id, active, item_ids)
        .await
        .map_err(|error| state.command_error("retry_cascade", &error))
}

pub fn set_timezone(state: &AppState, timezone: String) -> Result<String, String> {
    set_timezone_impl(state, timezone).map_err(|error| state.command_error("set_timezone", &error))
}
