use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::{
    CycleEntry, CyclePosition, CycleSettings, CycleStats, DayMark, MonthProjection, MonthRange,
    PeriodRun, Phase,
};

/// Ovulation is estimated this many days before the next period starts.
const LUTEAL_LENGTH: i64 = 14;
const FERTILE_DAYS_BEFORE_OVULATION: i64 = 5;
const FERTILE_DAYS_AFTER_OVULATION: i64 = 1;
/// Half-width of the uncertainty band around a predicted period start.
const WINDOW_RADIUS: i64 = 2;
const FOLLICULAR_LAST_DAY: u32 = 13;
const OVULATION_LAST_DAY: u32 = 16;

/// Validation rejects a zero cycle length; the floor only keeps callers that
/// skip validation from dividing by zero.
fn cycle_days(settings: &CycleSettings) -> i64 {
    i64::from(settings.average_cycle_length.max(1))
}

/// `None` past the ends of the supported calendar.
fn shift(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::days(days))
}

/// Compute the 1-based day of the current cycle and its phase.
pub fn current_position(settings: &CycleSettings, today: NaiveDate) -> CyclePosition {
    let Some(reference) = settings.reference_period_start else {
        return CyclePosition {
            current_cycle_day: None,
            current_phase: Phase::Unknown,
        };
    };

    let elapsed = (today - reference).num_days().unsigned_abs();
    let cycle = cycle_days(settings).unsigned_abs();
    let day = (elapsed % cycle) as u32 + 1;

    CyclePosition {
        current_cycle_day: Some(day),
        current_phase: phase_for_day(day, settings.average_period_length),
    }
}

/// Thresholds past the period are fixed and do not scale with cycle length.
pub fn phase_for_day(day: u32, average_period_length: u32) -> Phase {
    if day <= average_period_length {
        Phase::Menstrual
    } else if day <= FOLLICULAR_LAST_DAY {
        Phase::Follicular
    } else if day <= OVULATION_LAST_DAY {
        Phase::Ovulation
    } else {
        Phase::Luteal
    }
}

pub fn next_period_start(settings: &CycleSettings) -> Option<NaiveDate> {
    settings
        .reference_period_start
        .and_then(|reference| shift(reference, cycle_days(settings)))
}

/// Decide whether a freshly logged day moves the reference period start.
///
/// A flow day starts a period when the day before it is not a logged flow
/// day. Only a start strictly later than the current reference replaces it,
/// so repeating the same call leaves the settings as they are.
pub fn apply_logged_flow_day(
    settings: &CycleSettings,
    date: NaiveDate,
    is_flow_day: bool,
    previous_day_is_flow: bool,
) -> CycleSettings {
    let mut updated = settings.clone();
    if !is_flow_day || previous_day_is_flow {
        return updated;
    }

    if updated
        .reference_period_start
        .map_or(true, |reference| date > reference)
    {
        updated.reference_period_start = Some(date);
    }
    updated
}

/// Move a reference that sits inside a logged run back to the run's start.
///
/// Happens when days are logged out of order: the later day was taken as a
/// start before the day preceding it was logged.
pub fn settle_reference(settings: &CycleSettings, runs: &[PeriodRun]) -> CycleSettings {
    let mut updated = settings.clone();
    if let Some(reference) = updated.reference_period_start {
        if let Some(run) = runs
            .iter()
            .find(|r| r.start_date < reference && reference <= r.end_date)
        {
            updated.reference_period_start = Some(run.start_date);
        }
    }
    updated
}

/// Re-evaluate every logged flow day. The result does not depend on the
/// order in which the entries were logged.
pub fn reference_from_entries<'a, I>(settings: &CycleSettings, entries: I) -> CycleSettings
where
    I: IntoIterator<Item = &'a CycleEntry>,
{
    let runs = period_runs(entries);
    let settled = settle_reference(settings, &runs);
    runs.iter().fold(settled, |acc, run| {
        apply_logged_flow_day(&acc, run.start_date, true, false)
    })
}

/// Start date of the cycle that contains `date`, stepping from `reference`
/// in whole cycles in either direction.
fn anchor_cycle_start(reference: NaiveDate, cycle: i64, date: NaiveDate) -> Option<NaiveDate> {
    let cycles = (date - reference).num_days().div_euclid(cycle);
    shift(reference, cycles * cycle)
}

/// Fertile days of the cycle starting at `cycle_start`. Cycle day `d` falls on
/// `cycle_start + (d - 1)`.
fn fertile_dates(cycle_start: NaiveDate, cycle: i64) -> impl Iterator<Item = NaiveDate> {
    let ovulation_day = cycle - LUTEAL_LENGTH;
    let first = ovulation_day - FERTILE_DAYS_BEFORE_OVULATION;
    let last = ovulation_day + FERTILE_DAYS_AFTER_OVULATION;
    (first..=last).filter_map(move |day| shift(cycle_start, day - 1))
}

fn clip_into<I>(days: &mut BTreeSet<u32>, month: &MonthRange, dates: I)
where
    I: IntoIterator<Item = NaiveDate>,
{
    days.extend(dates.into_iter().filter_map(|d| month.day_of(d)));
}

/// Project predicted period, window and fertile days onto one month.
pub fn project_month(settings: &CycleSettings, month: &MonthRange) -> MonthProjection {
    let mut projection = MonthProjection::default();
    let Some(reference) = settings.reference_period_start else {
        return projection;
    };

    let cycle = cycle_days(settings);
    let period = i64::from(settings.average_period_length);

    if let Some(predicted_start) = shift(reference, cycle) {
        // the following cycle's period can spill into a month that ends late
        for start in [Some(predicted_start), shift(predicted_start, cycle)]
            .into_iter()
            .flatten()
        {
            clip_into(
                &mut projection.predicted_period_days,
                month,
                (0..period).filter_map(|i| shift(start, i)),
            );
        }

        clip_into(
            &mut projection.predicted_window_days,
            month,
            (-WINDOW_RADIUS..=WINDOW_RADIUS).filter_map(|i| shift(predicted_start, i)),
        );
    }

    // A fertile window always ends before its own cycle does, so walking
    // forward from the cycle holding the month start covers every window
    // that can reach the month.
    let mut cycle_start = anchor_cycle_start(reference, cycle, month.start);
    while let Some(start) = cycle_start.filter(|s| *s <= month.end) {
        clip_into(
            &mut projection.fertile_days,
            month,
            fertile_dates(start, cycle),
        );
        cycle_start = shift(start, cycle);
    }

    projection
}

/// Classify every day of `month`. Logged flow wins over fertile, fertile
/// over predicted period, predicted period over the window band.
pub fn reconcile<'a, I>(
    month: &MonthRange,
    projection: &MonthProjection,
    entries: I,
) -> BTreeMap<u32, DayMark>
where
    I: IntoIterator<Item = &'a CycleEntry>,
{
    let logged_flow: BTreeSet<u32> = entries
        .into_iter()
        .filter(|e| e.is_flow_day())
        .filter_map(|e| month.day_of(e.date))
        .collect();

    month
        .start
        .iter_days()
        .take_while(|d| *d <= month.end)
        .map(|d| {
            let day = d.day();
            let mark = if logged_flow.contains(&day) {
                DayMark::LoggedFlow
            } else if projection.fertile_days.contains(&day) {
                DayMark::Fertile
            } else if projection.predicted_period_days.contains(&day) {
                DayMark::PredictedPeriod
            } else if projection.predicted_window_days.contains(&day) {
                DayMark::PredictedWindow
            } else {
                DayMark::None
            };
            (day, mark)
        })
        .collect()
}

/// Group logged flow days into runs of consecutive calendar days.
pub fn period_runs<'a, I>(entries: I) -> Vec<PeriodRun>
where
    I: IntoIterator<Item = &'a CycleEntry>,
{
    let mut flow_days: Vec<NaiveDate> = entries
        .into_iter()
        .filter(|e| e.is_flow_day())
        .map(|e| e.date)
        .collect();
    flow_days.sort();
    flow_days.dedup();

    let mut runs: Vec<PeriodRun> = Vec::new();
    for day in flow_days {
        match runs.last_mut() {
            Some(run) if (day - run.end_date).num_days() == 1 => run.end_date = day,
            _ => runs.push(PeriodRun {
                start_date: day,
                end_date: day,
            }),
        }
    }
    runs
}

/// Observed history for the insights view.
pub fn cycle_stats(runs: &[PeriodRun]) -> CycleStats {
    let Some(last) = runs.last() else {
        return CycleStats {
            total_periods: 0,
            avg_cycle_length: None,
            avg_period_length: None,
            shortest_cycle: None,
            longest_cycle: None,
            last_period_start: None,
            last_period_end: None,
        };
    };

    let period_lengths: Vec<i64> = runs.iter().map(PeriodRun::length).collect();
    let cycle_lengths: Vec<i64> = runs
        .windows(2)
        .map(|w| (w[1].start_date - w[0].start_date).num_days())
        .collect();

    CycleStats {
        total_periods: runs.len(),
        avg_cycle_length: mean(&cycle_lengths),
        avg_period_length: mean(&period_lengths),
        shortest_cycle: cycle_lengths.iter().copied().min(),
        longest_cycle: cycle_lengths.iter().copied().max(),
        last_period_start: Some(last.start_date),
        last_period_end: Some(last.end_date),
    }
}

fn mean(values: &[i64]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<i64>() as f32 / values.len() as f32)
}
