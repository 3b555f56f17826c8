use crate::domain::schedule::{ScheduleParse, SchedulingConfig};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Habit,
    Supplement,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Protocol,
    Stack,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Habit => "habit",
            Self::Supplement => "supplement",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "habit" => Some(Self::Habit),
            "supplement" => Some(Self::Supplement),
            _ => None,
        }
    }
}

impl GroupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Stack => "stack",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "protocol" => Some(Self::Protocol),
            "stack" => Some(Self::Stack),
            _ => None,
        }
    }
}

/// A habit or supplement. `parent_id` is a lookup into groups, never ownership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulableItem {
    pub id: String,
    pub kind: ItemKind,
    pub own_active: bool,
    pub schedule: SchedulingConfig,
    pub start_date: Option<NaiveDate>,
    pub parent_id: Option<String>,
}

impl SchedulableItem {
    pub fn new(id: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id: id.into(),
            kind,
            own_active: true,
            schedule: SchedulingConfig::Daily,
            start_date: None,
            parent_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "item.id")?;
        if let Some(parent_id) = &self.parent_id {
            validate_non_empty(parent_id, "item.parent_id")?;
            if parent_id == &self.id {
                return Err("item.parent_id must not reference the item itself".to_string());
            }
        }
        self.schedule.validate()
    }
}

/// A protocol (groups habits) or a stack (groups supplements).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupEntity {
    pub id: String,
    pub kind: GroupKind,
    pub own_active: bool,
    pub schedule: SchedulingConfig,
    pub start_date: Option<NaiveDate>,
}

impl GroupEntity {
    pub fn new(id: impl Into<String>, kind: GroupKind) -> Self {
        Self {
            id: id.into(),
            kind,
            own_active: true,
            schedule: SchedulingConfig::Daily,
            start_date: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "group.id")?;
        self.schedule.validate()
    }
}

/// Row shape exchanged with persistence. `schedule_config` stays raw JSON so
/// malformed rows can still be read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: String,
    pub kind: ItemKind,
    pub own_active: bool,
    pub schedule_config: Option<serde_json::Value>,
    pub parent_id: Option<String>,
    pub start_date: Option<NaiveDate>,
}

impl ItemRecord {
    pub fn into_item(self) -> SchedulableItem {
        let parsed = ScheduleParse::from_value(self.schedule_config.as_ref());
        if let Some(issue) = &parsed.issue {
            tracing::warn!(item_id = %self.id, issue = %issue, "item schedule coerced to daily");
        }
        SchedulableItem {
            id: self.id,
            kind: self.kind,
            own_active: self.own_active,
            schedule: parsed.config,
            start_date: parsed.start_date.or(self.start_date),
            parent_id: self
                .parent_id
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        }
    }

    pub fn from_item(item: &SchedulableItem) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: item.id.clone(),
            kind: item.kind,
            own_active: item.own_active,
            schedule_config: Some(serde_json::to_value(&item.schedule)?),
            parent_id: item.parent_id.clone(),
            start_date: item.start_date,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub id: String,
    pub kind: GroupKind,
    pub own_active: bool,
    pub schedule_config: Option<serde_json::Value>,
    pub start_date: Option<NaiveDate>,
}

impl GroupRecord {
    pub fn into_group(self) -> GroupEntity {
        let parsed = ScheduleParse::from_value(self.schedule_config.as_ref());
        if let Some(issue) = &parsed.issue {
            tracing::warn!(group_id = %self.id, issue = %issue, "group schedule coerced to daily");
        }
        GroupEntity {
            id: self.id,
            kind: self.kind,
            own_active: self.own_active,
            schedule: parsed.config,
            start_date: parsed.start_date.or(self.start_date),
        }
    }

    pub fn from_group(group: &GroupEntity) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: group.id.clone(),
            kind: group.kind,
            own_active: group.own_active,
            schedule_config: Some(serde_json::to_value(&group.schedule)?),
            start_date: group.start_date,
        })
    }
}

/// One entry of a cascade write batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveFlagUpdate {
    pub id: String,
    pub own_active: bool,
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::parse_date;
    use crate::domain::schedule::WeekOrdinal;
    use chrono::Weekday;
    use serde_json::json;

    fn sample_record() -> ItemRecord {
        ItemRecord {
            id: "hab-1".to_string(),
            kind: ItemKind::Habit,
            own_active: true,
            schedule_config: Some(json!({"type": "interval", "everyDays": 2})),
            parent_id: Some("proto-1".to_string()),
            start_date: parse_date("2024-01-01"),
        }
    }

    #[test]
    fn new_entities_start_active_and_daily() {
        let item = SchedulableItem::new("hab-1", ItemKind::Habit);
        assert!(item.own_active);
        assert_eq!(item.schedule, SchedulingConfig::Daily);
        assert!(item.parent_id.is_none());

        let group = GroupEntity::new("proto-1", GroupKind::Protocol);
        assert!(group.own_active);
        assert_eq!(group.schedule, SchedulingConfig::Daily);
    }

    #[test]
    fn item_validate_rejects_self_parent_and_empty_id() {
        let mut item = SchedulableItem::new("hab-1", ItemKind::Habit);
        item.parent_id = Some("hab-1".to_string());
        assert!(item.validate().is_err());

        let blank = SchedulableItem::new("  ", ItemKind::Supplement);
        assert!(blank.validate().is_err());
    }

    #[test]
    fn group_validate_checks_schedule() {
        let mut group = GroupEntity::new("stack-1", GroupKind::Stack);
        group.schedule = SchedulingConfig::Interval { every_days: 0 };
        assert!(group.validate().is_err());
    }

    #[test]
    fn record_reads_camel_case_shape() {
        let raw = json!({
            "id": "sup-1",
            "kind": "supplement",
            "ownActive": false,
            "scheduleConfig": {"type": "weekly", "days": ["Mon"]},
            "parentId": "stack-1",
            "startDate": "2024-02-01"
        });
        let record: ItemRecord = serde_json::from_value(raw).expect("deserialize record");
        let item = record.into_item();
        assert!(!item.own_active);
        assert_eq!(
            item.schedule,
            SchedulingConfig::Weekly {
                days: vec![Weekday::Mon]
            }
        );
        assert_eq!(item.parent_id.as_deref(), Some("stack-1"));
        assert_eq!(item.start_date, parse_date("2024-02-01"));
    }

    #[test]
    fn record_with_malformed_schedule_becomes_daily() {
        let mut record = sample_record();
        record.schedule_config = Some(json!({"type": "cycle", "onDays": 0}));
        assert_eq!(record.into_item().schedule, SchedulingConfig::Daily);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn coerced_schedule_warns_once_with_entity_id() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let mut record = sample_record();
        record.schedule_config = Some(json!({"type": "fortnightly"}));

        let item = tracing::subscriber::with_default(subscriber, || record.into_item());
        assert_eq!(item.schedule, SchedulingConfig::Daily);

        let output = String::from_utf8(logs.0.lock().expect("log buffer").clone()).expect("utf8 logs");
        assert_eq!(output.matches("WARN").count(), 1, "{output}");
        assert!(output.contains("hab-1"), "{output}");
        assert!(output.contains("fortnightly"), "{output}");
    }

    #[test]
    fn record_prefers_schedule_embedded_start_date() {
        let mut record = sample_record();
        record.schedule_config =
            Some(json!({"type": "interval", "everyDays": 2, "startDate": "2024-05-05"}));
        assert_eq!(record.into_item().start_date, parse_date("2024-05-05"));
    }

    #[test]
    fn blank_parent_id_means_standalone() {
        let mut record = sample_record();
        record.parent_id = Some("   ".to_string());
        assert!(record.into_item().parent_id.is_none());
    }

    #[test]
    fn group_record_roundtrip_preserves_schedule() {
        let mut group = GroupEntity::new("proto-1", GroupKind::Protocol);
        group.schedule = SchedulingConfig::MonthlyRelative {
            week_num: WeekOrdinal::Last,
            weekday: Weekday::Sat,
        };
        group.start_date = parse_date("2024-01-01");
        let record = GroupRecord::from_group(&group).expect("encode group");
        assert_eq!(record.into_group(), group);
    }
}
