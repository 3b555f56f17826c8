use crate::domain::models::{GroupEntity, SchedulableItem};
use crate::domain::schedule::{cycle_phase, is_due_on, CyclePhase, SchedulingConfig};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveStatus {
    Active,
    Standby,
    Paused,
}

impl EffectiveStatus {
    pub fn badge_label(self) -> &'static str {
        match self {
            Self::Active => "Bio-Active",
            Self::Standby => "Standby",
            Self::Paused => "Paused",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSource {
    Own,
    Parent,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Resolution {
    pub status: EffectiveStatus,
    pub governed_by: ScheduleSource,
    pub phase: Option<CyclePhase>,
}

struct Governing<'a> {
    source: ScheduleSource,
    schedule: &'a SchedulingConfig,
    anchor: Option<NaiveDate>,
}

fn governing_schedule<'a>(
    item: &'a SchedulableItem,
    parent: Option<&'a GroupEntity>,
) -> Governing<'a> {
    match parent {
        Some(parent) if !parent.schedule.is_degenerate() => Governing {
            source: ScheduleSource::Parent,
            schedule: &parent.schedule,
            anchor: parent.start_date,
        },
        _ => Governing {
            source: ScheduleSource::Own,
            schedule: &item.schedule,
            anchor: item.start_date,
        },
    }
}

/// Only a group the item actually points at counts as its parent.
fn matching_parent<'a>(
    item: &SchedulableItem,
    parent: Option<&'a GroupEntity>,
) -> Option<&'a GroupEntity> {
    let parent = parent?;
    match item.parent_id.as_deref() {
        Some(parent_id) if parent_id == parent.id => Some(parent),
        _ => None,
    }
}

pub fn resolve(
    item: &SchedulableItem,
    parent: Option<&GroupEntity>,
    today: NaiveDate,
) -> EffectiveStatus {
    resolve_detailed(item, parent, today).status
}

pub fn resolve_detailed(
    item: &SchedulableItem,
    parent: Option<&GroupEntity>,
    today: NaiveDate,
) -> Resolution {
    let parent = matching_parent(item, parent);
    let governing = governing_schedule(item, parent);
    let phase = match governing.schedule {
        SchedulingConfig::Cycle { on_days, off_days } => {
            cycle_phase(*on_days, *off_days, governing.anchor, today)
        }
        _ => None,
    };

    let paused = !item.own_active || parent.is_some_and(|parent| !parent.own_active);
    let status = if paused {
        EffectiveStatus::Paused
    } else if is_due_on(governing.schedule, governing.anchor, today) {
        EffectiveStatus::Active
    } else {
        EffectiveStatus::Standby
    };

    Resolution {
        status,
        governed_by: governing.source,
        phase,
    }
}

/// A group's own badge: its pause switch, then its own cadence.
pub fn resolve_group(group: &GroupEntity, today: NaiveDate) -> EffectiveStatus {
    if !group.own_active {
        EffectiveStatus::Paused
    } else if is_due_on(&group.schedule, group.start_date, today) {
        EffectiveStatus::Active
    } else {
        EffectiveStatus::Standby
    }
}
