use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::models::{Category, LunchPlan, MealLibrary, PlanEntry};

/// Which slot of a [`PlanEntry`] an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanField {
    Breakfast,
    Dinner,
    LunchMain,
    LunchVeg1,
    LunchVeg2,
    LunchMeat,
}

impl PlanField {
    pub const ALL: [PlanField; 6] = [
        PlanField::Breakfast,
        PlanField::LunchMain,
        PlanField::LunchVeg1,
        PlanField::LunchVeg2,
        PlanField::LunchMeat,
        PlanField::Dinner,
    ];

    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Dinner => "dinner",
            Self::LunchMain => "lunch_main",
            Self::LunchVeg1 => "lunch_veg1",
            Self::LunchVeg2 => "lunch_veg2",
            Self::LunchMeat => "lunch_meat",
        }
    }

    /// Library category the field's value resolves in.
    #[must_use]
    pub fn category(self) -> Category {
        match self {
            Self::Breakfast => Category::BreakfastCombos,
            Self::Dinner => Category::DinnerCombos,
            Self::LunchMain => Category::LunchMains,
            Self::LunchVeg1 => Category::LunchVeg1,
            Self::LunchVeg2 => Category::LunchVeg2,
            Self::LunchMeat => Category::LunchMeat,
        }
    }
}

impl FromStr for PlanField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase().replace('-', "_");
        PlanField::ALL
            .into_iter()
            .find(|f| f.key() == key)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid plan field '{s}'. Must be one of: {}",
                    PlanField::ALL.map(PlanField::key).join(", ")
                )
            })
    }
}

/// A plan key: a calendar date or a weekday slot of the repeating week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKey {
    Date(NaiveDate),
    Weekday(Weekday),
}

fn weekday_name(day: Weekday) -> &'static str {
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

impl DateKey {
    /// Accepts `YYYY-MM-DD` or an English weekday name in any case.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self::Date(date));
        }
        let lower = s.to_lowercase();
        let mut day = Weekday::Mon;
        for _ in 0..7 {
            if weekday_name(day).to_lowercase() == lower {
                return Ok(Self::Weekday(day));
            }
            day = day.succ();
        }
        bail!("Invalid date key '{s}'. Use YYYY-MM-DD or a weekday name like Monday")
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Weekday(w) => f.write_str(weekday_name(*w)),
        }
    }
}

/// Longest calendar range a single query may span.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Every key from `start` to `end` inclusive. Weekdays run Monday first.
pub fn date_keys_between(start: DateKey, end: DateKey) -> Result<Vec<DateKey>> {
    match (start, end) {
        (DateKey::Date(a), DateKey::Date(b)) => {
            if b < a {
                bail!("End date {b} is before start date {a}");
            }
            let days = (b - a).num_days() + 1;
            if days > MAX_RANGE_DAYS {
                bail!("Range spans {days} days; at most {MAX_RANGE_DAYS} are allowed");
            }
            Ok(a.iter_days().take_while(|d| *d <= b).map(DateKey::Date).collect())
        }
        (DateKey::Weekday(a), DateKey::Weekday(b)) => {
            let (from, to) = (a.num_days_from_monday(), b.num_days_from_monday());
            if to < from {
                bail!("{} comes before {} in the week", weekday_name(b), weekday_name(a));
            }
            let mut keys = Vec::new();
            let mut day = a;
            for _ in from..=to {
                keys.push(DateKey::Weekday(day));
                day = day.succ();
            }
            Ok(keys)
        }
        _ => bail!("Cannot mix calendar dates and weekday names in one range"),
    }
}

/// Human label for a range, stored on generated and archived lists.
#[must_use]
pub fn period_label(start: DateKey, end: DateKey) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start} to {end}")
    }
}

impl PlanEntry {
    /// A fresh entry preselecting the first item of each category.
    #[must_use]
    pub fn with_library_defaults(date_key: &str, library: &MealLibrary) -> Self {
        Self {
            date_key: date_key.to_string(),
            breakfast: library.first_name(Category::BreakfastCombos),
            lunch: LunchPlan {
                main: library.first_name(Category::LunchMains),
                veg1: library.first_name(Category::LunchVeg1),
                veg2: library.first_name(Category::LunchVeg2),
                meat: library.first_name(Category::LunchMeat),
            },
            dinner: library.first_name(Category::DinnerCombos),
        }
    }

    pub fn set_field(&mut self, field: PlanField, value: &str) {
        let slot = match field {
            PlanField::Breakfast => &mut self.breakfast,
            PlanField::Dinner => &mut self.dinner,
            PlanField::LunchMain => &mut self.lunch.main,
            PlanField::LunchVeg1 => &mut self.lunch.veg1,
            PlanField::LunchVeg2 => &mut self.lunch.veg2,
            PlanField::LunchMeat => &mut self.lunch.meat,
        };
        *slot = value.to_string();
    }

    #[must_use]
    pub fn field(&self, field: PlanField) -> &str {
        match field {
            PlanField::Breakfast => &self.breakfast,
            PlanField::Dinner => &self.dinner,
            PlanField::LunchMain => &self.lunch.main,
            PlanField::LunchVeg1 => &self.lunch.veg1,
            PlanField::LunchVeg2 => &self.lunch.veg2,
            PlanField::LunchMeat => &self.lunch.meat,
        }
    }
}

/// Plan entries keyed by canonical date key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MealPlan(pub BTreeMap<String, PlanEntry>);

impl MealPlan {
    #[must_use]
    pub fn get(&self, date_key: &str) -> Option<&PlanEntry> {
        let key = DateKey::parse(date_key).map_or_else(|_| date_key.to_string(), |k| k.to_string());
        self.0.get(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlanEntry> {
        self.0.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Set one field of the entry for `date_key`, creating the entry from the
    /// library defaults when it does not exist yet. Returns the stored entry.
    pub fn upsert_field(
        &mut self,
        date_key: &str,
        field: PlanField,
        value: &str,
        library: &MealLibrary,
    ) -> Result<PlanEntry> {
        let key = DateKey::parse(date_key)?.to_string();
        let entry = self
            .0
            .entry(key.clone())
            .or_insert_with(|| PlanEntry::with_library_defaults(&key, library));
        entry.set_field(field, value);
        Ok(entry.clone())
    }

    /// Drop the entry for `date_key`. Returns whether one existed.
    pub fn clear_day(&mut self, date_key: &str) -> Result<bool> {
        let key = DateKey::parse(date_key)?.to_string();
        Ok(self.0.remove(&key).is_some())
    }

    /// Entries for every key in the inclusive range; keys with no entry are skipped.
    pub fn entries_in_range(&self, start: &str, end: &str) -> Result<Vec<PlanEntry>> {
        let keys = date_keys_between(DateKey::parse(start)?, DateKey::parse(end)?)?;
        Ok(keys
            .into_iter()
            .filter_map(|k| self.0.get(&k.to_string()).cloned())
            .collect())
    }
}
