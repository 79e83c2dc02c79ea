//! Weekly availability template of a doctor.
//!
//! The template is always replaced as a whole: callers build a
//! [`WeeklySchedule`] from raw input, which validates every slot, and the
//! store overwrites the stored document in one write.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::BookingError;

/// Wall-clock time of a slot boundary, `HH:MM` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotTime(NaiveTime);

impl SlotTime {
    pub fn parse(raw: &str) -> Result<Self, BookingError> {
        raw.parse()
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for SlotTime {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(SlotTime)
            .map_err(|_| BookingError::validation(format!("invalid time {s:?}, expected HH:MM")))
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl Serialize for SlotTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn parse_weekday(raw: &str) -> Result<Weekday, BookingError> {
    raw.trim()
        .parse::<Weekday>()
        .map_err(|_| BookingError::validation(format!("unknown day {raw:?}")))
}

mod weekday_serde {
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(day: &Weekday, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(super::weekday_name(*day))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Weekday, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_weekday(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    /// Legacy template flag. Booking state lives on appointments, so this is
    /// always false.
    #[serde(default)]
    pub is_booked: bool,
}

impl TimeSlot {
    pub fn new(start_time: SlotTime, end_time: SlotTime) -> Result<Self, BookingError> {
        if start_time >= end_time {
            return Err(BookingError::validation(format!(
                "slot {start_time}-{end_time}: startTime must be before endTime"
            )));
        }
        Ok(Self {
            start_time,
            end_time,
            is_booked: false,
        })
    }

    /// Half-open overlap, so back-to-back slots do not collide.
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAvailability {
    #[serde(with = "weekday_serde")]
    pub day: Weekday,
    pub slots: Vec<TimeSlot>,
}

/* -------------------------
   Raw input (PUT body)
--------------------------*/

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotInput {
    pub start_time: String,
    pub end_time: String,
    #[allow(dead_code)]
    pub is_booked: Option<bool>, // accepted, ignored
}

#[derive(Debug, Deserialize)]
pub struct DayInput {
    pub day: String,
    pub slots: Vec<SlotInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklySchedule(Vec<DayAvailability>);

impl WeeklySchedule {
    /// Validate and normalize a full replacement template.
    ///
    /// Duplicate day entries are merged, slots are sorted by start time and
    /// days Monday first. Inverted or overlapping slots are rejected.
    pub fn build(input: Vec<DayInput>) -> Result<Self, BookingError> {
        let mut days: Vec<DayAvailability> = Vec::new();

        for d in input {
            let day = parse_weekday(&d.day)?;
            let mut slots = Vec::with_capacity(d.slots.len());
            for s in d.slots {
                let start = SlotTime::parse(&s.start_time)?;
                let end = SlotTime::parse(&s.end_time)?;
                slots.push(TimeSlot::new(start, end)?);
            }

            match days.iter_mut().find(|existing| existing.day == day) {
                Some(existing) => existing.slots.extend(slots),
                None => days.push(DayAvailability { day, slots }),
            }
        }

        for d in &mut days {
            d.slots.sort_by_key(|s| s.start_time);
            if let Some(pair) = d.slots.windows(2).find(|w| w[0].overlaps(&w[1])) {
                return Err(BookingError::validation(format!(
                    "{}: slot {}-{} overlaps {}-{}",
                    weekday_name(d.day),
                    pair[0].start_time,
                    pair[0].end_time,
                    pair[1].start_time,
                    pair[1].end_time,
                )));
            }
        }

        days.retain(|d| !d.slots.is_empty());
        days.sort_by_key(|d| d.day.num_days_from_monday());

        Ok(WeeklySchedule(days))
    }

    pub fn days(&self) -> &[DayAvailability] {
        &self.0
    }

    /// Template slots for one weekday, empty when the doctor is off.
    pub fn slots_on(&self, day: Weekday) -> &[TimeSlot] {
        self.0
            .iter()
            .find(|d| d.day == day)
            .map(|d| d.slots.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn day(day: &str, slots: &[(&str, &str)]) -> DayInput {
    DayInput {
        day: day.to_string(),
        slots: slots
            .iter()
            .map(|(s, e)| SlotInput {
                start_time: s.to_string(),
                end_time: e.to_string(),
                is_booked: None,
            })
            .collect(),
    }
}
