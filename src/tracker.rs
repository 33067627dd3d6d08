use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::models::*;
use crate::prediction;
use crate::validation::{self, EntryInput, SettingsUpdate, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("unknown profile {0}")]
    UnknownProfile(ProfileId),
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("profile store lock poisoned")]
    Poisoned,
}

/// Per-profile settings and entries held in memory. Every operation takes
/// the lock once, so reads see settings and entries from the same moment.
pub struct Tracker {
    defaults: CycleSettings,
    profiles: Mutex<HashMap<ProfileId, ProfileData>>,
}

impl Tracker {
    pub fn new(defaults: CycleSettings) -> Result<Self, TrackerError> {
        validation::validate_settings(&defaults)?;
        Ok(Self {
            defaults,
            profiles: Mutex::new(HashMap::new()),
        })
    }

    fn profiles(&self) -> Result<MutexGuard<'_, HashMap<ProfileId, ProfileData>>, TrackerError> {
        self.profiles.lock().map_err(|_| TrackerError::Poisoned)
    }

    pub fn create_profile(&self) -> Result<ProfileId, TrackerError> {
        let id = ProfileId::new();
        self.profiles()?
            .insert(id, ProfileData::with_settings(self.defaults.clone()));
        info!(profile = %id, "created profile");
        Ok(id)
    }

    pub fn settings(&self, profile: ProfileId, today: NaiveDate) -> Result<SettingsView, TrackerError> {
        let profiles = self.profiles()?;
        let data = profiles
            .get(&profile)
            .ok_or(TrackerError::UnknownProfile(profile))?;
        Ok(settings_view(&data.settings, today))
    }

    pub fn update_settings(
        &self,
        profile: ProfileId,
        update: &SettingsUpdate,
        today: NaiveDate,
    ) -> Result<SettingsView, TrackerError> {
        let mut profiles = self.profiles()?;
        let data = profiles
            .get_mut(&profile)
            .ok_or(TrackerError::UnknownProfile(profile))?;

        data.settings = update.apply(&data.settings).map_err(|e| {
            warn!(profile = %profile, error = %e, "rejected settings update");
            e
        })?;
        debug!(profile = %profile, settings = ?data.settings, "settings updated");
        Ok(settings_view(&data.settings, today))
    }

    /// Upsert the entry for `input.date`. A flow day whose previous day is
    /// not a flow day may move the reference period start.
    pub fn log_entry(&self, profile: ProfileId, input: EntryInput) -> Result<CycleEntry, TrackerError> {
        input.validate().map_err(|e| {
            warn!(profile = %profile, date = %input.date, error = %e, "rejected entry");
            e
        })?;

        let mut profiles = self.profiles()?;
        let data = profiles
            .get_mut(&profile)
            .ok_or(TrackerError::UnknownProfile(profile))?;

        let date = input.date;
        let entry = input.merge_into(data.entries.remove(&date));
        data.entries.insert(date, entry.clone());
        debug!(profile = %profile, %date, flow = entry.is_flow_day(), "entry saved");

        if entry.is_flow_day() {
            let previous_is_flow = date
                .pred_opt()
                .and_then(|prev| data.entries.get(&prev))
                .is_some_and(CycleEntry::is_flow_day);

            let applied =
                prediction::apply_logged_flow_day(&data.settings, date, true, previous_is_flow);
            let runs = prediction::period_runs(data.entries.values());
            let settled = prediction::settle_reference(&applied, &runs);

            if settled.reference_period_start != data.settings.reference_period_start {
                info!(
                    profile = %profile,
                    from = ?data.settings.reference_period_start,
                    to = ?settled.reference_period_start,
                    "reference period start moved"
                );
                data.settings = settled;
            }
        }

        Ok(entry)
    }

    /// The stored entry, or an empty one when nothing is logged that day.
    pub fn entry(&self, profile: ProfileId, date: NaiveDate) -> Result<CycleEntry, TrackerError> {
        let profiles = self.profiles()?;
        let data = profiles
            .get(&profile)
            .ok_or(TrackerError::UnknownProfile(profile))?;
        Ok(data
            .entries
            .get(&date)
            .cloned()
            .unwrap_or_else(|| CycleEntry::empty(date)))
    }

    /// Deleting never moves the reference period start.
    pub fn delete_entry(&self, profile: ProfileId, date: NaiveDate) -> Result<bool, TrackerError> {
        let mut profiles = self.profiles()?;
        let data = profiles
            .get_mut(&profile)
            .ok_or(TrackerError::UnknownProfile(profile))?;
        let removed = data.entries.remove(&date).is_some();
        debug!(profile = %profile, %date, removed, "entry deleted");
        Ok(removed)
    }

    pub fn month(&self, profile: ProfileId, year: i32, month: u32) -> Result<MonthView, TrackerError> {
        let range = MonthRange::of(year, month).ok_or(ValidationError::Month { year, month })?;

        let profiles = self.profiles()?;
        let data = profiles
            .get(&profile)
            .ok_or(TrackerError::UnknownProfile(profile))?;

        let entries: Vec<CycleEntry> = data
            .entries
            .range(range.start..=range.end)
            .map(|(_, e)| e.clone())
            .collect();
        let projection = prediction::project_month(&data.settings, &range);
        let days = prediction::reconcile(&range, &projection, &entries);

        Ok(MonthView {
            month: range,
            entries,
            projection,
            days,
        })
    }

    pub fn history(&self, profile: ProfileId) -> Result<CycleStats, TrackerError> {
        let profiles = self.profiles()?;
        let data = profiles
            .get(&profile)
            .ok_or(TrackerError::UnknownProfile(profile))?;
        Ok(prediction::cycle_stats(&prediction::period_runs(
            data.entries.values(),
        )))
    }

    pub fn export(&self, profile: ProfileId) -> Result<String, TrackerError> {
        let profiles = self.profiles()?;
        let data = profiles
            .get(&profile)
            .ok_or(TrackerError::UnknownProfile(profile))?;
        Ok(serde_json::to_string_pretty(data)?)
    }

    /// Load a profile snapshot under a fresh id. Stored settings are kept
    /// as they are, including a reference period start set by hand.
    pub fn import(&self, mut data: ProfileData) -> Result<ProfileId, TrackerError> {
        validation::validate_settings(&data.settings)?;
        data.entries.retain(|date, entry| *date == entry.date);

        let id = ProfileId::new();
        info!(profile = %id, entries = data.entries.len(), "imported profile");
        self.profiles()?.insert(id, data);
        Ok(id)
    }
}

fn settings_view(settings: &CycleSettings, today: NaiveDate) -> SettingsView {
    SettingsView {
        settings: settings.clone(),
        position: prediction::current_position(settings, today),
        next_period_start: prediction::next_period_start(settings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn flow_input(day: &str, flow: FlowIntensity) -> EntryInput {
        EntryInput {
            flow_intensity: Some(Some(flow)),
            ..EntryInput::new(date(day))
        }
    }

    fn setup() -> (Tracker, ProfileId) {
        let tracker = Tracker::new(CycleSettings::default()).unwrap();
        let id = tracker.create_profile().unwrap();
        (tracker, id)
    }

    fn reference(tracker: &Tracker, id: ProfileId) -> Option<NaiveDate> {
        tracker
            .settings(id, date("2024-03-10"))
            .unwrap()
            .settings
            .reference_period_start
    }

    #[test]
    fn rejects_invalid_defaults() {
        let result = Tracker::new(CycleSettings::with_lengths(28, 28));
        assert!(matches!(
            result,
            Err(TrackerError::Validation(ValidationError::PeriodNotShorterThanCycle { .. }))
        ));
    }

    #[test]
    fn new_profile_has_no_position() {
        let (tracker, id) = setup();
        let view = tracker.settings(id, date("2024-03-10")).unwrap();
        assert_eq!(view.position.current_phase, Phase::Unknown);
        assert_eq!(view.next_period_start, None);
    }

    #[test]
    fn profiles_are_isolated() {
        let (tracker, a) = setup();
        let b = tracker.create_profile().unwrap();
        tracker
            .log_entry(a, flow_input("2024-03-01", FlowIntensity::Heavy))
            .unwrap();

        assert_eq!(reference(&tracker, a), Some(date("2024-03-01")));
        assert_eq!(reference(&tracker, b), None);
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let (tracker, _) = setup();
        let stranger = ProfileId::new();
        assert!(matches!(
            tracker.entry(stranger, date("2024-03-01")),
            Err(TrackerError::UnknownProfile(id)) if id == stranger
        ));
    }

    #[test]
    fn continuation_days_do_not_move_reference() {
        let (tracker, id) = setup();
        for day in ["2024-03-01", "2024-03-02", "2024-03-03"] {
            tracker
                .log_entry(id, flow_input(day, FlowIntensity::Medium))
                .unwrap();
        }
        tracker
            .log_entry(id, flow_input("2024-03-01", FlowIntensity::Light))
            .unwrap();
        assert_eq!(reference(&tracker, id), Some(date("2024-03-01")));
    }

    #[test]
    fn out_of_order_logging_settles_on_run_start() {
        let (tracker, id) = setup();
        for day in ["2024-03-03", "2024-03-02", "2024-03-01"] {
            tracker
                .log_entry(id, flow_input(day, FlowIntensity::Medium))
                .unwrap();
        }
        assert_eq!(reference(&tracker, id), Some(date("2024-03-01")));
    }

    #[test]
    fn removing_flow_keeps_reference() {
        let (tracker, id) = setup();
        tracker
            .log_entry(id, flow_input("2024-03-01", FlowIntensity::Medium))
            .unwrap();
        let cleared = tracker
            .log_entry(id, flow_input("2024-03-01", FlowIntensity::None))
            .unwrap();
        assert!(!cleared.is_flow_day());
        assert_eq!(reference(&tracker, id), Some(date("2024-03-01")));

        assert!(tracker.delete_entry(id, date("2024-03-01")).unwrap());
        assert!(!tracker.delete_entry(id, date("2024-03-01")).unwrap());
        assert_eq!(reference(&tracker, id), Some(date("2024-03-01")));
    }

    #[test]
    fn upsert_keeps_fields_not_sent() {
        let (tracker, id) = setup();
        let mut first = flow_input("2024-03-05", FlowIntensity::Light);
        first.sensations = Some(vec!["cramps".into(), "fatigue".into()]);
        tracker.log_entry(id, first).unwrap();

        let mut second = EntryInput::new(date("2024-03-05"));
        second.mood = Some(Some(3));
        let entry = tracker.log_entry(id, second).unwrap();

        assert!(entry.is_flow_day());
        assert_eq!(entry.sensations.len(), 2);
        assert_eq!(entry.mood, Some(3));
        assert_eq!(tracker.entry(id, date("2024-03-05")).unwrap(), entry);
        assert_eq!(
            tracker.entry(id, date("2024-03-06")).unwrap(),
            CycleEntry::empty(date("2024-03-06"))
        );
    }

    #[test]
    fn invalid_entry_is_not_stored() {
        let (tracker, id) = setup();
        let mut input = flow_input("2024-03-01", FlowIntensity::Heavy);
        input.mood = Some(Some(9));
        assert!(tracker.log_entry(id, input).is_err());
        assert_eq!(reference(&tracker, id), None);
        assert_eq!(
            tracker.entry(id, date("2024-03-01")).unwrap(),
            CycleEntry::empty(date("2024-03-01"))
        );
    }

    #[test]
    fn update_settings_recomputes_position() {
        let (tracker, id) = setup();
        let update = SettingsUpdate {
            average_cycle_length: Some(30),
            reference_period_start: Some(Some(date("2024-01-01"))),
            ..Default::default()
        };
        let view = tracker.update_settings(id, &update, date("2024-01-15")).unwrap();
        assert_eq!(view.position.current_cycle_day, Some(15));
        assert_eq!(view.position.current_phase, Phase::Ovulation);
        assert_eq!(view.next_period_start, Some(date("2024-01-31")));

        let bad = SettingsUpdate {
            average_period_length: Some(0),
            ..Default::default()
        };
        assert!(tracker.update_settings(id, &bad, date("2024-01-15")).is_err());
        assert_eq!(
            tracker.settings(id, date("2024-01-15")).unwrap().settings.average_cycle_length,
            30
        );
    }

    #[test]
    fn month_view_reconciles_logged_flow() {
        let (tracker, id) = setup();
        for day in ["2024-01-01", "2024-01-02", "2024-01-30"] {
            tracker
                .log_entry(id, flow_input(day, FlowIntensity::Medium))
                .unwrap();
        }
        // Jan 30 starts a new run, so the reference moved there
        assert_eq!(reference(&tracker, id), Some(date("2024-01-30")));

        let view = tracker.month(id, 2024, 1).unwrap();
        assert_eq!(view.entries.len(), 3);
        assert_eq!(view.days[&1], DayMark::LoggedFlow);
        assert_eq!(view.days[&30], DayMark::LoggedFlow);
        assert!(view.projection.predicted_period_days.is_empty());

        assert!(matches!(
            tracker.month(id, 2024, 13),
            Err(TrackerError::Validation(ValidationError::Month { .. }))
        ));
    }

    #[test]
    fn history_uses_logged_runs() {
        let (tracker, id) = setup();
        for day in ["2024-01-01", "2024-01-02", "2024-01-29"] {
            tracker
                .log_entry(id, flow_input(day, FlowIntensity::Medium))
                .unwrap();
        }
        let stats = tracker.history(id).unwrap();
        assert_eq!(stats.total_periods, 2);
        assert_eq!(stats.avg_cycle_length, Some(28.0));
    }

    fn round_trip(tracker: &Tracker, id: ProfileId) -> ProfileId {
        let json = tracker.export(id).unwrap();
        let data: ProfileData = serde_json::from_str(&json).unwrap();
        tracker.import(data).unwrap()
    }

    #[test]
    fn export_import_keeps_profile() {
        let (tracker, id) = setup();
        for day in ["2024-02-01", "2024-02-02"] {
            tracker
                .log_entry(id, flow_input(day, FlowIntensity::Heavy))
                .unwrap();
        }

        let copy = round_trip(&tracker, id);
        assert_ne!(copy, id);
        assert_eq!(reference(&tracker, copy), Some(date("2024-02-01")));
        assert_eq!(tracker.history(copy).unwrap().total_periods, 1);
    }

    #[test]
    fn unflagged_run_start_survives_round_trip() {
        let (tracker, id) = setup();
        for day in ["2024-03-01", "2024-03-02", "2024-03-03"] {
            tracker
                .log_entry(id, flow_input(day, FlowIntensity::Medium))
                .unwrap();
        }
        tracker
            .log_entry(id, flow_input("2024-03-01", FlowIntensity::None))
            .unwrap();
        assert_eq!(reference(&tracker, id), Some(date("2024-03-01")));

        let copy = round_trip(&tracker, id);
        assert_eq!(reference(&tracker, copy), Some(date("2024-03-01")));
    }

    #[test]
    fn manual_reference_survives_round_trip() {
        let (tracker, id) = setup();
        tracker
            .log_entry(id, flow_input("2024-03-01", FlowIntensity::Medium))
            .unwrap();
        let update = SettingsUpdate {
            reference_period_start: Some(Some(date("2024-02-01"))),
            ..Default::default()
        };
        tracker.update_settings(id, &update, date("2024-03-10")).unwrap();

        let copy = round_trip(&tracker, id);
        assert_eq!(reference(&tracker, copy), Some(date("2024-02-01")));
    }

    #[test]
    fn import_rejects_invalid_settings() {
        let (tracker, _) = setup();
        let data = ProfileData::with_settings(CycleSettings::with_lengths(50, 5));
        assert!(matches!(
            tracker.import(data),
            Err(TrackerError::Validation(ValidationError::CycleLength(50)))
        ));
    }
}
