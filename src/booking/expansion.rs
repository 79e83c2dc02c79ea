//! Projection of the weekly template onto concrete calendar slots.

use std::iter::FusedIterator;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use serde::Serialize;

use super::schedule::{weekday_name, SlotTime, TimeSlot, WeeklySchedule};

pub const DEFAULT_HORIZON_WEEKS: u32 = 4;

/// One bookable occurrence of a template slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotInstance {
    pub date: NaiveDate,
    pub day: &'static str,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
}

/// First date on or after `from` that falls on `day`.
pub fn next_occurrence(from: NaiveDate, day: Weekday) -> NaiveDate {
    let ahead = (day.num_days_from_monday() + 7 - from.weekday().num_days_from_monday()) % 7;
    from + Duration::days(i64::from(ahead))
}

/// Lazy walk over `(template slot, week)` pairs.
///
/// Yields each template slot once per week for `weeks` weeks starting at its
/// next occurrence on or after `now`'s date. An occurrence whose start is
/// already behind `now` is skipped; only week 0 can hit that.
pub struct SlotExpansion<'a> {
    template: Vec<(Weekday, &'a TimeSlot)>,
    now: NaiveDateTime,
    weeks: u32,
    pair: usize,
    week: u32,
}

pub fn expand(schedule: &WeeklySchedule, now: NaiveDateTime, weeks: u32) -> SlotExpansion<'_> {
    let template = schedule
        .days()
        .iter()
        .flat_map(|d| d.slots.iter().map(move |s| (d.day, s)))
        .collect();

    SlotExpansion {
        template,
        now,
        weeks,
        pair: 0,
        week: 0,
    }
}

impl Iterator for SlotExpansion<'_> {
    type Item = SlotInstance;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (day, slot) = *self.template.get(self.pair)?;

            if self.week >= self.weeks {
                self.pair += 1;
                self.week = 0;
                continue;
            }

            let week = self.week;
            self.week += 1;

            let date = next_occurrence(self.now.date(), day) + Duration::weeks(i64::from(week));
            if week == 0 && date.and_time(slot.start_time.as_naive()) < self.now {
                continue;
            }

            return Some(SlotInstance {
                date,
                day: weekday_name(day),
                start_time: slot.start_time,
                end_time: slot.end_time,
            });
        }
    }
}

impl FusedIterator for SlotExpansion<'_> {}
