use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_CYCLE_LENGTH: u32 = 28;
pub const DEFAULT_PERIOD_LENGTH: u32 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProfileId(pub Uuid);

impl ProfileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FlowIntensity {
    None,
    Light,
    Medium,
    Heavy,
}

impl FlowIntensity {
    /// `None` is an explicit "no flow" mark, not a flow day.
    pub fn is_flow(self) -> bool {
        !matches!(self, FlowIntensity::None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleSettings {
    pub reference_period_start: Option<NaiveDate>,
    pub average_cycle_length: u32,
    pub average_period_length: u32,
    #[serde(default)]
    pub custom_sensations: Vec<String>,
}

impl CycleSettings {
    pub fn with_lengths(average_cycle_length: u32, average_period_length: u32) -> Self {
        Self {
            reference_period_start: None,
            average_cycle_length,
            average_period_length,
            custom_sensations: Vec::new(),
        }
    }
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::with_lengths(DEFAULT_CYCLE_LENGTH, DEFAULT_PERIOD_LENGTH)
    }
}

/// One logged calendar day. An empty `flow_intensity` means the day was
/// logged for other reasons (mood, sensations) and carries no flow mark.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleEntry {
    pub date: NaiveDate,
    pub flow_intensity: Option<FlowIntensity>,
    #[serde(default)]
    pub sensations: BTreeSet<String>,
    pub mood: Option<u8>,
    #[serde(default)]
    pub notes: String,
}

impl CycleEntry {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            flow_intensity: None,
            sensations: BTreeSet::new(),
            mood: None,
            notes: String::new(),
        }
    }

    pub fn is_flow_day(&self) -> bool {
        self.flow_intensity.is_some_and(FlowIntensity::is_flow)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Phase {
    Menstrual,
    Follicular,
    Ovulation,
    Luteal,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CyclePosition {
    pub current_cycle_day: Option<u32>,
    pub current_phase: Phase,
}

/// Inclusive calendar bounds of a target month.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonthRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MonthRange {
    pub fn of(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }?;
        Some(Self {
            start,
            end: next.pred_opt()?,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Day-of-month of `date` if it lies inside the range.
    pub fn day_of(&self, date: NaiveDate) -> Option<u32> {
        self.contains(date).then(|| date.day())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonthProjection {
    pub predicted_period_days: BTreeSet<u32>,
    pub predicted_window_days: BTreeSet<u32>,
    pub fertile_days: BTreeSet<u32>,
}

impl MonthProjection {
    pub fn is_empty(&self) -> bool {
        self.predicted_period_days.is_empty()
            && self.predicted_window_days.is_empty()
            && self.fertile_days.is_empty()
    }
}

/// Display classification of a single day once logged flow and
/// predictions are reconciled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DayMark {
    LoggedFlow,
    Fertile,
    PredictedPeriod,
    PredictedWindow,
    None,
}

/// A maximal run of consecutive logged flow days.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeriodRun {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl PeriodRun {
    pub fn length(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleStats {
    pub total_periods: usize,
    pub avg_cycle_length: Option<f32>,
    pub avg_period_length: Option<f32>,
    pub shortest_cycle: Option<i64>,
    pub longest_cycle: Option<i64>,
    pub last_period_start: Option<NaiveDate>,
    pub last_period_end: Option<NaiveDate>,
}

/// Everything stored for one profile; also the export format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProfileData {
    pub settings: CycleSettings,
    #[serde(default)]
    pub entries: BTreeMap<NaiveDate, CycleEntry>,
}

impl ProfileData {
    pub fn with_settings(settings: CycleSettings) -> Self {
        Self {
            settings,
            entries: BTreeMap::new(),
        }
    }
}

/// Settings returned to callers together with the derived position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingsView {
    pub settings: CycleSettings,
    pub position: CyclePosition,
    pub next_period_start: Option<NaiveDate>,
}

/// Data returned for a month view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthView {
    pub month: MonthRange,
    pub entries: Vec<CycleEntry>,
    pub projection: MonthProjection,
    pub days: BTreeMap<u32, DayMark>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn flow_day_is_derived_from_intensity() {
        let mut entry = CycleEntry::empty(date("2024-03-01"));
        assert!(!entry.is_flow_day());

        entry.flow_intensity = Some(FlowIntensity::None);
        assert!(!entry.is_flow_day());

        for intensity in [FlowIntensity::Light, FlowIntensity::Medium, FlowIntensity::Heavy] {
            entry.flow_intensity = Some(intensity);
            assert!(entry.is_flow_day());
        }
    }

    #[test]
    fn month_range_bounds() {
        let feb = MonthRange::of(2024, 2).unwrap();
        assert_eq!(feb.start, date("2024-02-01"));
        assert_eq!(feb.end, date("2024-02-29"));

        let dec = MonthRange::of(2023, 12).unwrap();
        assert_eq!(dec.end, date("2023-12-31"));

        assert!(MonthRange::of(2024, 13).is_none());
        assert_eq!(feb.day_of(date("2024-02-29")), Some(29));
        assert_eq!(feb.day_of(date("2024-03-01")), None);
    }

    #[test]
    fn default_settings_have_no_reference() {
        let settings = CycleSettings::default();
        assert_eq!(settings.reference_period_start, None);
        assert_eq!(settings.average_cycle_length, 28);
        assert_eq!(settings.average_period_length, 5);
    }
}
