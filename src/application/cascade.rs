use crate::domain::models::ActiveFlagUpdate;
use crate::infrastructure::config::CascadeSettings;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::item_store::ItemStore;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration as TokioDuration};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
        }
    }
}

impl From<&CascadeSettings> for RetryPolicy {
    fn from(settings: &CascadeSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay_ms: settings.base_delay_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailedMember {
    pub item_id: String,
    pub error: String,
}

/// Outcome of one cascade. The group flag is already written when this exists;
/// `failed` lists members the caller should hand to `retry_members`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub group_id: String,
    pub active: bool,
    pub updated: Vec<ActiveFlagUpdate>,
    pub failed: Vec<FailedMember>,
}

impl CascadeReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.failed
            .iter()
            .map(|failed| failed.item_id.clone())
            .collect()
    }
}

const DEFAULT_CONCURRENCY: usize = 4;

type GroupLock = Arc<tokio::sync::Mutex<()>>;
type GroupLockTable = Arc<Mutex<HashMap<String, GroupLock>>>;

pub struct CascadeCoordinator<S>
where
    S: ItemStore + 'static,
{
    store: Arc<S>,
    retry_policy: RetryPolicy,
    concurrency: usize,
    group_locks: GroupLockTable,
}

impl<S> CascadeCoordinator<S>
where
    S: ItemStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            retry_policy: RetryPolicy::default(),
            concurrency: DEFAULT_CONCURRENCY,
            group_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Overwrite the group's flag and then every current member's flag with `active`.
    ///
    /// Member-level pauses are not remembered: re-activating a group re-activates
    /// members that were paused on their own. Cascades on the same group never
    /// interleave; cascades on different groups run independently. Once started,
    /// a cascade runs to completion even if the caller stops waiting for it.
    pub async fn set_group_active(
        &self,
        group_id: &str,
        active: bool,
    ) -> Result<CascadeReport, InfraError> {
        self.run_locked(group_id, move |run, group_id| async move {
            run.apply(&group_id, active).await
        })
        .await
    }

    /// Rewrite only `item_ids`; the group flag is left untouched. Ids that are no
    /// longer members of the group are skipped.
    pub async fn retry_members(
        &self,
        group_id: &str,
        active: bool,
        item_ids: &[String],
    ) -> Result<CascadeReport, InfraError> {
        let item_ids = item_ids.to_vec();
        self.run_locked(group_id, move |run, group_id| async move {
            run.retry(&group_id, active, &item_ids).await
        })
        .await
    }

    /// Runs `work` under the group's lock on its own task, so dropping the
    /// returned future never aborts member writes halfway.
    async fn run_locked<F, Fut>(&self, group_id: &str, work: F) -> Result<CascadeReport, InfraError>
    where
        F: FnOnce(CascadeRun<S>, String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<CascadeReport, InfraError>> + Send + 'static,
    {
        let lock = self.group_lock(group_id)?;
        let locks = Arc::clone(&self.group_locks);
        let run = CascadeRun {
            store: Arc::clone(&self.store),
            retry_policy: self.retry_policy.clone(),
            concurrency: self.concurrency,
        };
        let group_id = group_id.to_string();

        let handle = tokio::spawn(async move {
            let result = {
                let _guard = lock.lock().await;
                work(run, group_id.clone()).await
            };
            release_group_lock(&locks, &group_id, lock);
            result
        });

        handle
            .await
            .map_err(|error| InfraError::Store(format!("cascade task did not complete: {error}")))?
    }

    fn group_lock(&self, group_id: &str) -> Result<GroupLock, InfraError> {
        let mut locks = self
            .group_locks
            .lock()
            .map_err(|error| InfraError::Store(format!("cascade lock table poisoned: {error}")))?;
        Ok(Arc::clone(locks.entry(group_id.to_string()).or_default()))
    }
}

/// Drops the table entry once no other cascade holds or waits on it.
fn release_group_lock(locks: &Mutex<HashMap<String, GroupLock>>, group_id: &str, lock: GroupLock) {
    let Ok(mut table) = locks.lock() else {
        tracing::warn!(group_id, "cascade lock table poisoned, entry kept");
        return;
    };
    // One reference lives in the table, the other is `lock`. Both checks and the
    // drop happen under the table mutex so concurrent releases see a settled count.
    let unused = Arc::strong_count(&lock) == 2;
    drop(lock);
    if unused {
        table.remove(group_id);
    }
}

/// Everything one cascade needs, owned so it can outlive the caller.
struct CascadeRun<S> {
    store: Arc<S>,
    retry_policy: RetryPolicy,
    concurrency: usize,
}

impl<S> CascadeRun<S>
where
    S: ItemStore + 'static,
{
    async fn apply(&self, group_id: &str, active: bool) -> Result<CascadeReport, InfraError> {
        if self.store.load_group(group_id).await?.is_none() {
            return Err(InfraError::NotFound(format!("group {group_id}")));
        }
        let member_ids = self
            .store
            .list_members(group_id)
            .await?
            .into_iter()
            .map(|record| record.id)
            .collect::<Vec<_>>();

        write_with_retry(&self.retry_policy, || {
            self.store.write_group_active(group_id, active)
        })
        .await?;

        let report = self.fan_out(group_id, active, member_ids).await;
        log_report(&report);
        Ok(report)
    }

    async fn retry(
        &self,
        group_id: &str,
        active: bool,
        item_ids: &[String],
    ) -> Result<CascadeReport, InfraError> {
        let group = self
            .store
            .load_group(group_id)
            .await?
            .ok_or_else(|| InfraError::NotFound(format!("group {group_id}")))?;
        if group.own_active != active {
            return Err(InfraError::StaleCascade {
                group_id: group_id.to_string(),
                stored: group.own_active,
                requested: active,
            });
        }

        let current_members = self
            .store
            .list_members(group_id)
            .await?
            .into_iter()
            .map(|record| record.id)
            .collect::<HashSet<_>>();
        let mut seen = HashSet::new();
        let retry_ids = item_ids
            .iter()
            .filter(|id| current_members.contains(*id))
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect::<Vec<_>>();
        if retry_ids.len() < item_ids.len() {
            tracing::debug!(
                group_id,
                requested = item_ids.len(),
                retried = retry_ids.len(),
                "skipping ids that are no longer group members"
            );
        }

        let report = self.fan_out(group_id, active, retry_ids).await;
        log_report(&report);
        Ok(report)
    }

    async fn fan_out(&self, group_id: &str, active: bool, member_ids: Vec<String>) -> CascadeReport {
        let mut write_tasks: JoinSet<(usize, Result<(), InfraError>)> = JoinSet::new();
        let mut outcomes: Vec<Option<Result<(), String>>> = vec![None; member_ids.len()];

        for (index, item_id) in member_ids.iter().enumerate() {
            let store = Arc::clone(&self.store);
            let retry_policy = self.retry_policy.clone();
            let item_id = item_id.clone();

            write_tasks.spawn(async move {
                let result = write_with_retry(&retry_policy, || {
                    store.write_item_active(&item_id, active)
                })
                .await;
                (index, result)
            });

            if write_tasks.len() >= self.concurrency {
                collect_member_outcome(&mut write_tasks, &mut outcomes).await;
            }
        }

        while !write_tasks.is_empty() {
            collect_member_outcome(&mut write_tasks, &mut outcomes).await;
        }

        let mut updated = Vec::new();
        let mut failed = Vec::new();
        for (item_id, outcome) in member_ids.into_iter().zip(outcomes) {
            match outcome {
                Some(Ok(())) => updated.push(ActiveFlagUpdate {
                    id: item_id,
                    own_active: active,
                }),
                Some(Err(error)) => failed.push(FailedMember { item_id, error }),
                None => failed.push(FailedMember {
                    item_id,
                    error: "member write task did not complete".to_string(),
                }),
            }
        }

        CascadeReport {
            group_id: group_id.to_string(),
            active,
            updated,
            failed,
        }
    }
}

async fn collect_member_outcome(
    write_tasks: &mut JoinSet<(usize, Result<(), InfraError>)>,
    outcomes: &mut [Option<Result<(), String>>],
) {
    let Some(join_result) = write_tasks.join_next().await else {
        return;
    };
    match join_result {
        Ok((index, result)) => {
            outcomes[index] = Some(result.map_err(|error| error.to_string()));
        }
        // The slot stays `None` and is reported as failed.
        Err(error) => tracing::error!(%error, "member write task failed to join"),
    }
}

async fn write_with_retry<F, Fut>(retry_policy: &RetryPolicy, mut write: F) -> Result<(), InfraError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), InfraError>>,
{
    let max_attempts = retry_policy.max_attempts.max(1);
    let mut attempt: u8 = 0;

    loop {
        match write().await {
            Ok(()) => return Ok(()),
            Err(error) if error.is_transient() && attempt + 1 < max_attempts => {
                let delay = retry_policy
                    .base_delay_ms
                    .saturating_mul(2u64.saturating_pow(attempt as u32));
                sleep(TokioDuration::from_millis(delay)).await;
                attempt = attempt.saturating_add(1);
            }
            Err(error) => return Err(error),
        }
    }
}

fn log_report(report: &CascadeReport) {
    if report.is_complete() {
        tracing::info!(
            group_id = %report.group_id,
            active = report.active,
            members = report.updated.len(),
            "cascade applied"
        );
    } else {
        let failed = report
            .failed
            .iter()
            .map(|failed| failed.item_id.as_str())
            .collect::<BTreeSet<_>>();
        tracing::warn!(
            group_id = %report.group_id,
            active = report.active,
            updated = report.updated.len(),
            failed = ?failed,
            "cascade partially applied"
        );
    }
}
