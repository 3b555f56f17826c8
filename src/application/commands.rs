use crate::application::bootstrap::bootstrap_workspace;
use crate::application::cascade::{CascadeCoordinator, CascadeReport, RetryPolicy};
use crate::domain::calendar::parse_date;
use crate::domain::models::{
    GroupEntity, GroupKind, GroupRecord, ItemKind, ItemRecord, SchedulableItem,
};
use crate::domain::schedule::{next_due_on, ScheduleParse, SchedulingConfig};
use crate::domain::status::{resolve_detailed, resolve_group, EffectiveStatus, ScheduleSource};
use crate::infrastructure::clock::{local_today, system_now, NowProvider};
use crate::infrastructure::config::save_timezone;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::item_store::{ItemStore, SqliteItemStore};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

const NEXT_DUE_HORIZON_DAYS: u32 = 366;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    timezone: RwLock<Tz>,
    now_provider: NowProvider,
    store: Arc<SqliteItemStore>,
    coordinator: CascadeCoordinator<SqliteItemStore>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let store = Arc::new(SqliteItemStore::new(&bootstrap.database_path));
        let coordinator = CascadeCoordinator::new(Arc::clone(&store))
            .with_retry_policy(RetryPolicy::from(&bootstrap.config.cascade))
            .with_concurrency(bootstrap.config.cascade.concurrency);

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            timezone: RwLock::new(bootstrap.config.timezone),
            now_provider: system_now(),
            store,
            coordinator,
            log_guard: Mutex::new(()),
        })
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    /// Local calendar date, sampled once per command and reused for every item it touches.
    pub fn today(&self) -> NaiveDate {
        local_today((self.now_provider)(), self.timezone())
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
            .read()
            .map(|timezone| *timezone)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatusResponse {
    pub item_id: String,
    pub status: EffectiveStatus,
    pub badge: String,
    pub governed_by: ScheduleSource,
    pub schedule_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_due: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupOverviewResponse {
    pub group_id: String,
    pub date: String,
    pub status: EffectiveStatus,
    pub badge: String,
    pub schedule_summary: String,
    pub members: Vec<ItemStatusResponse>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CascadeResponse {
    pub report: CascadeReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<GroupOverviewResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview_error: Option<String>,
}

/// The report is returned even when the refreshed overview cannot be read, so
/// failed member ids always reach the caller.
fn cascade_response(
    state: &AppState,
    command: &str,
    report: CascadeReport,
    overview: Result<GroupOverviewResponse, InfraError>,
) -> CascadeResponse {
    match overview {
        Ok(overview) => CascadeResponse {
            report,
            overview: Some(overview),
            overview_error: None,
        },
        Err(error) => {
            state.log_error(
                command,
                &format!("group_id={} overview unavailable: {error}", report.group_id),
            );
            CascadeResponse {
                report,
                overview: None,
                overview_error: Some(error.to_string()),
            }
        }
    }
}

fn item_status(
    item: &SchedulableItem,
    parent: Option<&GroupEntity>,
    today: NaiveDate,
) -> ItemStatusResponse {
    let resolution = resolve_detailed(item, parent, today);
    let (schedule, anchor) = match (resolution.governed_by, parent) {
        (ScheduleSource::Parent, Some(parent)) => (&parent.schedule, parent.start_date),
        _ => (&item.schedule, item.start_date),
    };
    let next_due = match resolution.status {
        EffectiveStatus::Standby => next_due_on(schedule, anchor, today, NEXT_DUE_HORIZON_DAYS)
            .map(|date| date.to_string()),
        _ => None,
    };

    ItemStatusResponse {
        item_id: item.id.clone(),
        status: resolution.status,
        badge: resolution.status.badge_label().to_string(),
        governed_by: resolution.governed_by,
        schedule_summary: schedule.describe(),
        phase: resolution.phase.map(|phase| phase.to_string()),
        next_due,
    }
}

async fn load_overview(
    state: &AppState,
    group_id: &str,
    today: NaiveDate,
) -> Result<GroupOverviewResponse, InfraError> {
    let group = state
        .store
        .load_group(group_id)
        .await?
        .ok_or_else(|| InfraError::NotFound(format!("group {group_id}")))?
        .into_group();
    let members = state
        .store
        .list_members(group_id)
        .await?
        .into_iter()
        .map(ItemRecord::into_item)
        .map(|item| item_status(&item, Some(&group), today))
        .collect::<Vec<_>>();
    let status = resolve_group(&group, today);

    Ok(GroupOverviewResponse {
        group_id: group.id.clone(),
        date: today.to_string(),
        status,
        badge: status.badge_label().to_string(),
        schedule_summary: group.schedule.describe(),
        members,
    })
}

/// Form input must describe a valid rule; coercion to daily is only for stored data.
fn schedule_from_input(
    value: Option<serde_json::Value>,
) -> Result<(SchedulingConfig, Option<NaiveDate>), InfraError> {
    let parsed = ScheduleParse::from_value(value.as_ref());
    if let Some(issue) = parsed.issue {
        return Err(InfraError::InvalidConfig(issue));
    }
    Ok((parsed.config, parsed.start_date))
}

fn start_date_from_input(value: Option<String>) -> Result<Option<NaiveDate>, InfraError> {
    match value.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(raw) => parse_date(raw)
            .map(Some)
            .ok_or_else(|| InfraError::InvalidConfig(format!("startDate must be YYYY-MM-DD: {raw}"))),
    }
}

pub async fn create_group_impl(
    state: &AppState,
    kind: String,
    schedule_config: Option<serde_json::Value>,
    start_date: Option<String>,
) -> Result<GroupEntity, InfraError> {
    let kind = GroupKind::parse(&kind)
        .ok_or_else(|| InfraError::InvalidConfig(format!("unknown group kind: {kind}")))?;
    let (schedule, embedded_start) = schedule_from_input(schedule_config)?;

    let mut group = GroupEntity::new(next_id(kind.as_str()), kind);
    group.schedule = schedule;
    group.start_date = embedded_start.or(start_date_from_input(start_date)?);
    group.validate().map_err(InfraError::InvalidConfig)?;

    state.store.save_group(&GroupRecord::from_group(&group)?).await?;
    state.log_info("create_group", &format!("created group_id={}", group.id));
    Ok(group)
}

pub async fn create_item_impl(
    state: &AppState,
    kind: String,
    parent_id: Option<String>,
    schedule_config: Option<serde_json::Value>,
    start_date: Option<String>,
) -> Result<SchedulableItem, InfraError> {
    let kind = ItemKind::parse(&kind)
        .ok_or_else(|| InfraError::InvalidConfig(format!("unknown item kind: {kind}")))?;
    let (schedule, embedded_start) = schedule_from_input(schedule_config)?;
    let parent_id = parent_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    if let Some(parent_id) = parent_id.as_deref() {
        if state.store.load_group(parent_id).await?.is_none() {
            return Err(InfraError::NotFound(format!("group {parent_id}")));
        }
    }

    let mut item = SchedulableItem::new(next_id(kind.as_str()), kind);
    item.schedule = schedule;
    item.start_date = embedded_start.or(start_date_from_input(start_date)?);
    item.parent_id = parent_id;
    item.validate().map_err(InfraError::InvalidConfig)?;

    state.store.save_item(&ItemRecord::from_item(&item)?).await?;
    state.log_info("create_item", &format!("created item_id={}", item.id));
    Ok(item)
}

pub async fn update_item_schedule_impl(
    state: &AppState,
    item_id: String,
    schedule_config: Option<serde_json::Value>,
    start_date: Option<String>,
) -> Result<SchedulableItem, InfraError> {
    let mut item = state
        .store
        .load_item(&item_id)
        .await?
        .ok_or_else(|| InfraError::NotFound(format!("item {item_id}")))?
        .into_item();
    let (schedule, embedded_start) = schedule_from_input(schedule_config)?;
    item.schedule = schedule;
    if let Some(start_date) = embedded_start.or(start_date_from_input(start_date)?) {
        item.start_date = Some(start_date);
    }
    item.validate().map_err(InfraError::InvalidConfig)?;

    state.store.save_item(&ItemRecord::from_item(&item)?).await?;
    state.log_info(
        "update_item_schedule",
        &format!("item_id={item_id} schedule={}", item.schedule.describe()),
    );
    Ok(item)
}

pub fn set_timezone_impl(state: &AppState, timezone: String) -> Result<String, InfraError> {
    let timezone = save_timezone(&state.config_dir, &timezone)?;
    let mut current = state
        .timezone
        .write()
        .map_err(|error| InfraError::Store(format!("timezone lock poisoned: {error}")))?;
    *current = timezone;
    drop(current);
    state.log_info("set_timezone", &format!("timezone={}", timezone.name()));
    Ok(timezone.name().to_string())
}

/// Manual pause switch for a single item; never touches the parent group.
pub async fn set_item_active_impl(
    state: &AppState,
    item_id: String,
    active: bool,
) -> Result<ItemStatusResponse, InfraError> {
    state.store.write_item_active(&item_id, active).await?;
    state.log_info("set_item_active", &format!("item_id={item_id} active={active}"));
    resolve_item_impl(state, item_id).await
}

pub async fn resolve_item_impl(
    state: &AppState,
    item_id: String,
) -> Result<ItemStatusResponse, InfraError> {
    let today = state.today();
    let item = state
        .store
        .load_item(&item_id)
        .await?
        .ok_or_else(|| InfraError::NotFound(format!("item {item_id}")))?
        .into_item();

    let parent = match item.parent_id.as_deref() {
        Some(parent_id) => {
            let parent = state.store.load_group(parent_id).await?;
            if parent.is_none() {
                tracing::warn!(item_id = %item.id, parent_id, "parent group missing, resolving standalone");
            }
            parent.map(GroupRecord::into_group)
        }
        None => None,
    };

    Ok(item_status(&item, parent.as_ref(), today))
}

pub async fn resolve_group_members_impl(
    state: &AppState,
    group_id: String,
) -> Result<GroupOverviewResponse, InfraError> {
    let today = state.today();
    load_overview(state, &group_id, today).await
}

pub async fn set_group_active_impl(
    state: &AppState,
    group_id: String,
    active: bool,
) -> Result<CascadeResponse, InfraError> {
    let report = state.coordinator.set_group_active(&group_id, active).await?;
    if report.is_complete() {
        state.log_info(
            "set_group_active",
            &format!(
                "group_id={group_id} active={active} members={}",
                report.updated.len()
            ),
        );
    } else {
        state.log_error(
            "set_group_active",
            &format!(
                "group_id={group_id} active={active} failed={}",
                report.failed_ids().join(",")
            ),
        );
    }

    let today = state.today();
    let overview = load_overview(state, &group_id, today).await;
    Ok(cascade_response(state, "set_group_active", report, overview))
}

pub async fn retry_cascade_impl(
    state: &AppState,
    group_id: String,
    active: bool,
    item_ids: Vec<String>,
) -> Result<CascadeResponse, InfraError> {
    let report = state
        .coordinator
        .retry_members(&group_id, active, &item_ids)
        .await?;
    state.log_info(
        "retry_cascade",
        &format!(
            "group_id={group_id} retried={} still_failed={}",
            report.updated.len(),
            report.failed.len()
        ),
    );

    let today = state.today();
    let overview = load_overview(state, &group_id, today).await;
    Ok(cascade_response(state, "retry_cascade", report, overview))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::fixed_now;
    use chrono::DateTime;
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::AtomicUsize;

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "protocol-schedule-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn app_state_at(&self, now: &str) -> AppState {
            let now = DateTime::parse_from_rfc3339(now)
                .expect("valid datetime")
                .with_timezone(&Utc);
            AppState::new(self.path.clone())
                .expect("initialize app state")
                .with_now_provider(fixed_now(now))
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[tokio::test]
    async fn bootstrap_creates_workspace_layout() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state_at("2024-01-01T12:00:00Z");
        assert!(state.config_dir().join("app.json").exists());
        assert!(state.database_path().exists());
    }

    #[tokio::test]
    async fn create_item_rejects_malformed_schedule() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state_at("2024-01-01T12:00:00Z");
        let result = create_item_impl(
            &state,
            "habit".to_string(),
            None,
            Some(json!({"type": "interval", "everyDays": 0})),
            None,
        )
        .await;
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn create_item_rejects_unknown_parent() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state_at("2024-01-01T12:00:00Z");
        let result =
            create_item_impl(&state, "habit".to_string(), Some("proto-x".to_string()), None, None)
                .await;
        assert!(matches!(result, Err(InfraError::NotFound(_))));
    }

    #[tokio::test]
    async fn standalone_item_resolves_against_its_own_schedule() {
        let workspace = TempWorkspace::new();
        // 2024-01-02 is a Tuesday.
        let state = workspace.app_state_at("2024-01-02T08:00:00Z");
        let item = create_item_impl(
            &state,
            "supplement".to_string(),
            None,
            Some(json!({"type": "weekly", "days": ["Mon", "Wed"]})),
            None,
        )
        .await
        .expect("create item");

        let status = resolve_item_impl(&state, item.id.clone())
            .await
            .expect("resolve item");
        assert_eq!(status.status, EffectiveStatus::Standby);
        assert_eq!(status.badge, "Standby");
        assert_eq!(status.next_due.as_deref(), Some("2024-01-03"));
    }

    #[tokio::test]
    async fn item_with_missing_parent_resolves_standalone() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state_at("2024-01-02T08:00:00Z");
        let mut item = SchedulableItem::new("hab-orphan", ItemKind::Habit);
        item.parent_id = Some("proto-deleted".to_string());
        state
            .store
            .save_item(&ItemRecord::from_item(&item).expect("encode"))
            .await
            .expect("save orphan");

        let status = resolve_item_impl(&state, "hab-orphan".to_string())
            .await
            .expect("resolve orphan");
        assert_eq!(status.status, EffectiveStatus::Active);
        assert_eq!(status.governed_by, ScheduleSource::Own);
    }

    #[tokio::test]
    async fn today_follows_configured_timezone() {
        let workspace = TempWorkspace::new();
        fs::create_dir_all(workspace.path.join("config")).expect("config dir");
        fs::write(
            workspace.path.join("config").join("app.json"),
            r#"{"schema": 1, "timezone": "Asia/Tokyo"}"#,
        )
        .expect("seed config");
        let state = workspace.app_state_at("2024-01-01T20:00:00Z");
        assert_eq!(
            state.today(),
            NaiveDate::from_ymd_opt(2024, 1, 2).expect("valid date")
        );
    }

    #[tokio::test]
    async fn set_timezone_moves_today_and_persists() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state_at("2024-01-01T20:00:00Z");
        assert_eq!(
            state.today(),
            NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date")
        );

        let saved = set_timezone_impl(&state, "Asia/Tokyo".to_string()).expect("set timezone");
        assert_eq!(saved, "Asia/Tokyo");
        assert_eq!(
            state.today(),
            NaiveDate::from_ymd_opt(2024, 1, 2).expect("valid date")
        );

        let reopened = workspace.app_state_at("2024-01-01T20:00:00Z");
        assert_eq!(reopened.timezone(), chrono_tz::Asia::Tokyo);
        assert!(set_timezone_impl(&state, "Mars/Olympus".to_string()).is_err());
    }

    #[tokio::test]
    async fn protocol_cadence_governs_member_badges() {
        let workspace = TempWorkspace::new();
        // 2024-01-06 is day 5 of a 5-on/2-off loop anchored 2024-01-01.
        let state = workspace.app_state_at("2024-01-06T09:00:00Z");
        let protocol = create_group_impl(
            &state,
            "protocol".to_string(),
            Some(json!({"type": "cycle", "onDays": 5, "offDays": 2})),
            Some("2024-01-01".to_string()),
        )
        .await
        .expect("create protocol");
        create_item_impl(&state, "habit".to_string(), Some(protocol.id.clone()), None, None)
            .await
            .expect("create habit");

        let overview = resolve_group_members_impl(&state, protocol.id.clone())
            .await
            .expect("overview");
        assert_eq!(overview.date, "2024-01-06");
        assert_eq!(overview.status, EffectiveStatus::Standby);
        assert_eq!(overview.members.len(), 1);
        let member = &overview.members[0];
        assert_eq!(member.status, EffectiveStatus::Standby);
        assert_eq!(member.governed_by, ScheduleSource::Parent);
        assert_eq!(member.phase.as_deref(), Some("Rest, 1/2"));
        assert_eq!(member.next_due.as_deref(), Some("2024-01-08"));
    }

    #[tokio::test]
    async fn group_toggle_cascades_and_overwrites_member_pauses() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state_at("2024-01-01T09:00:00Z");
        let stack = create_group_impl(&state, "stack".to_string(), None, None)
            .await
            .expect("create stack");
        let first = create_item_impl(&state, "supplement".to_string(), Some(stack.id.clone()), None, None)
            .await
            .expect("create first");
        let second = create_item_impl(&state, "supplement".to_string(), Some(stack.id.clone()), None, None)
            .await
            .expect("create second");

        let paused = set_item_active_impl(&state, second.id.clone(), false)
            .await
            .expect("pause second");
        assert_eq!(paused.status, EffectiveStatus::Paused);

        let response = set_group_active_impl(&state, stack.id.clone(), false)
            .await
            .expect("pause stack");
        assert!(response.report.is_complete());
        let overview = response.overview.expect("overview after pause");
        assert_eq!(overview.badge, "Paused");
        assert!(overview
            .members
            .iter()
            .all(|member| member.status == EffectiveStatus::Paused));

        let resumed = set_group_active_impl(&state, stack.id.clone(), true)
            .await
            .expect("resume stack");
        assert!(resumed
            .overview
            .expect("overview after resume")
            .members
            .iter()
            .all(|member| member.status == EffectiveStatus::Active));
        let second_status = resolve_item_impl(&state, second.id.clone())
            .await
            .expect("resolve second");
        assert_eq!(second_status.badge, "Bio-Active");
        let first_status = resolve_item_impl(&state, first.id)
            .await
            .expect("resolve first");
        assert_eq!(first_status.status, EffectiveStatus::Active);
    }

    #[tokio::test]
    async fn cascade_commands_are_logged() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state_at("2024-01-01T09:00:00Z");
        let protocol = create_group_impl(&state, "protocol".to_string(), None, None)
            .await
            .expect("create protocol");
        set_group_active_impl(&state, protocol.id.clone(), false)
            .await
            .expect("pause protocol");

        let log = fs::read_to_string(workspace.path.join("logs").join("commands.log"))
            .expect("read command log");
        let last = log.lines().last().expect("at least one entry");
        let entry: serde_json::Value = serde_json::from_str(last).expect("json log line");
        assert_eq!(entry["command"], json!("set_group_active"));
        assert_eq!(entry["level"], json!("info"));
    }

    #[tokio::test]
    async fn retry_cascade_is_refused_after_opposite_toggle() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state_at("2024-01-01T09:00:00Z");
        let protocol = create_group_impl(&state, "protocol".to_string(), None, None)
            .await
            .expect("create protocol");
        set_group_active_impl(&state, protocol.id.clone(), false)
            .await
            .expect("pause protocol");

        let result = retry_cascade_impl(&state, protocol.id.clone(), true, Vec::new()).await;
        assert!(matches!(result, Err(InfraError::StaleCascade { .. })));
    }

    #[tokio::test]
    async fn schedule_edit_without_date_keeps_anchor() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state_at("2024-01-04T09:00:00Z");
        let item = create_item_impl(
            &state,
            "habit".to_string(),
            None,
            Some(json!({"type": "interval", "everyDays": 2})),
            Some("2024-01-01".to_string()),
        )
        .await
        .expect("create item");

        let updated = update_item_schedule_impl(
            &state,
            item.id.clone(),
            Some(json!({"type": "interval", "everyDays": 3})),
            None,
        )
        .await
        .expect("update schedule");
        assert_eq!(updated.start_date, parse_date("2024-01-01"));

        // Day 3 from the kept anchor.
        let status = resolve_item_impl(&state, item.id.clone())
            .await
            .expect("resolve item");
        assert_eq!(status.status, EffectiveStatus::Active);

        let moved = update_item_schedule_impl(
            &state,
            item.id,
            Some(json!({"type": "interval", "everyDays": 3, "startDate": "2024-01-02"})),
            None,
        )
        .await
        .expect("move anchor");
        assert_eq!(moved.start_date, parse_date("2024-01-02"));
    }

    #[tokio::test]
    async fn cascade_report_survives_unreadable_overview() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state_at("2024-01-01T09:00:00Z");
        let report = CascadeReport {
            group_id: "proto-1".to_string(),
            active: false,
            updated: Vec::new(),
            failed: vec![crate::application::cascade::FailedMember {
                item_id: "hab-2".to_string(),
                error: "database busy".to_string(),
            }],
        };

        let response = cascade_response(
            &state,
            "set_group_active",
            report,
            Err(InfraError::Store("database is locked".to_string())),
        );
        assert_eq!(response.report.failed_ids(), vec!["hab-2".to_string()]);
        assert!(response.overview.is_none());
        assert!(response
            .overview_error
            .as_deref()
            .is_some_and(|error| error.contains("database is locked")));

        let encoded = serde_json::to_value(&response).expect("encode response");
        assert_eq!(encoded["report"]["failed"][0]["itemId"], json!("hab-2"));
        assert!(encoded.get("overview").is_none());

        let log = fs::read_to_string(workspace.path.join("logs").join("commands.log"))
            .expect("read command log");
        let last = log.lines().last().expect("at least one entry");
        let entry: serde_json::Value = serde_json::from_str(last).expect("json log line");
        assert_eq!(entry["level"], json!("error"));
    }
}
