use std::collections::HashSet;
use std::ops::RangeInclusive;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{CycleEntry, CycleSettings, FlowIntensity};

pub const CYCLE_LENGTH_RANGE: RangeInclusive<u32> = 21..=45;
pub const PERIOD_LENGTH_RANGE: RangeInclusive<u32> = 1..=10;
pub const MOOD_RANGE: RangeInclusive<u8> = 0..=4;
pub const MAX_NOTES_CHARS: usize = 1000;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("average cycle length {0} is outside 21-45 days")]
    CycleLength(u32),
    #[error("average period length {0} is outside 1-10 days")]
    PeriodLength(u32),
    #[error("period length {period} must be shorter than cycle length {cycle}")]
    PeriodNotShorterThanCycle { period: u32, cycle: u32 },
    #[error("mood {0} is outside 0-4")]
    Mood(u8),
    #[error("notes exceed 1000 characters")]
    NotesTooLong,
    #[error("sensation tags must not be blank")]
    BlankSensation,
    #[error("invalid month {year}-{month}")]
    Month { year: i32, month: u32 },
}

pub fn validate_lengths(cycle: u32, period: u32) -> Result<(), ValidationError> {
    if !CYCLE_LENGTH_RANGE.contains(&cycle) {
        return Err(ValidationError::CycleLength(cycle));
    }
    if !PERIOD_LENGTH_RANGE.contains(&period) {
        return Err(ValidationError::PeriodLength(period));
    }
    if period >= cycle {
        return Err(ValidationError::PeriodNotShorterThanCycle { period, cycle });
    }
    Ok(())
}

pub fn validate_settings(settings: &CycleSettings) -> Result<(), ValidationError> {
    validate_lengths(settings.average_cycle_length, settings.average_period_length)?;
    validate_tags(&settings.custom_sensations)
}

fn validate_tags<'a, I>(tags: I) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = &'a String>,
{
    if tags.into_iter().any(|t| t.trim().is_empty()) {
        return Err(ValidationError::BlankSensation);
    }
    Ok(())
}

/// Distinguishes an absent field from an explicit `null`.
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial settings edit. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettingsUpdate {
    pub average_cycle_length: Option<u32>,
    pub average_period_length: Option<u32>,
    /// `Some(None)` clears the reference date.
    #[serde(default, deserialize_with = "explicit_null")]
    pub reference_period_start: Option<Option<NaiveDate>>,
    pub custom_sensations: Option<Vec<String>>,
}

impl SettingsUpdate {
    /// Merge onto `current` and validate the result as a whole; `current` is
    /// untouched on error.
    pub fn apply(&self, current: &CycleSettings) -> Result<CycleSettings, ValidationError> {
        let mut merged = current.clone();
        if let Some(cycle) = self.average_cycle_length {
            merged.average_cycle_length = cycle;
        }
        if let Some(period) = self.average_period_length {
            merged.average_period_length = period;
        }
        if let Some(reference) = self.reference_period_start {
            merged.reference_period_start = reference;
        }
        if let Some(tags) = &self.custom_sensations {
            let mut seen = HashSet::new();
            merged.custom_sensations = tags
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| seen.insert(t.clone()))
                .collect();
        }
        validate_settings(&merged)?;
        Ok(merged)
    }
}

/// A day to log. Fields left as `None` keep the stored value of an existing
/// entry, or take the empty default for a new one. `Some(None)` on flow or
/// mood clears the stored value; an empty sensation list clears the tags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryInput {
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "explicit_null")]
    pub flow_intensity: Option<Option<FlowIntensity>>,
    pub sensations: Option<Vec<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub mood: Option<Option<u8>>,
    pub notes: Option<String>,
}

impl EntryInput {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            flow_intensity: None,
            sensations: None,
            mood: None,
            notes: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(Some(mood)) = self.mood {
            if !MOOD_RANGE.contains(&mood) {
                return Err(ValidationError::Mood(mood));
            }
        }
        if let Some(notes) = &self.notes {
            if notes.chars().count() > MAX_NOTES_CHARS {
                return Err(ValidationError::NotesTooLong);
            }
        }
        if let Some(tags) = &self.sensations {
            validate_tags(tags)?;
        }
        Ok(())
    }

    /// Upsert onto an existing entry, or an empty one for the date.
    pub fn merge_into(self, existing: Option<CycleEntry>) -> CycleEntry {
        let mut entry = existing.unwrap_or_else(|| CycleEntry::empty(self.date));
        if let Some(flow) = self.flow_intensity {
            entry.flow_intensity = flow;
        }
        if let Some(tags) = self.sensations {
            entry.sensations = tags.into_iter().map(|t| t.trim().to_string()).collect();
        }
        if let Some(mood) = self.mood {
            entry.mood = mood;
        }
        if let Some(notes) = self.notes {
            entry.notes = notes;
        }
        entry
    }
}
