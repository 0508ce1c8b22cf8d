use serde::{Deserialize, Serialize};

use super::model::{BiasRecord, MarkRecord, ScoreRecord};

/// Selector value meaning "no filter on this dimension" (municipality, school).
pub const ALL: &str = "Все";

// ---------------------------------------------------------------------------
// Filter state: one selected value per dimension
// ---------------------------------------------------------------------------

/// Current selection. All selectors are strings, as picked in the UI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    pub year: String,
    pub grade: String,
    pub subject: String,
    pub municipality: String,
    pub school: String,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            year: "2023".to_string(),
            grade: "4".to_string(),
            subject: "Русский язык".to_string(),
            municipality: ALL.to_string(),
            school: ALL.to_string(),
        }
    }
}

/// A partial change to [`FilterState`]; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterUpdate {
    pub year: Option<String>,
    pub grade: Option<String>,
    pub subject: Option<String>,
    pub municipality: Option<String>,
    pub school: Option<String>,
}

impl FilterState {
    /// Merge `update` into a new state.
    ///
    /// A municipality different from the current one resets the school to
    /// [`ALL`], even when the same update also names a school.
    pub fn apply(&self, update: FilterUpdate) -> FilterState {
        let municipality_changed = update
            .municipality
            .as_ref()
            .is_some_and(|m| *m != self.municipality);

        let mut next = FilterState {
            year: update.year.unwrap_or_else(|| self.year.clone()),
            grade: update.grade.unwrap_or_else(|| self.grade.clone()),
            subject: update.subject.unwrap_or_else(|| self.subject.clone()),
            municipality: update
                .municipality
                .unwrap_or_else(|| self.municipality.clone()),
            school: update.school.unwrap_or_else(|| self.school.clone()),
        };
        if municipality_changed {
            next.school = ALL.to_string();
        }
        next
    }

    /// The selected year as a number, `None` when it does not parse.
    /// Surrounding whitespace is ignored; every year comparison goes through here.
    pub fn year_number(&self) -> Option<i32> {
        self.year.trim().parse().ok()
    }

    pub fn all_municipalities(&self) -> bool {
        self.municipality == ALL
    }

    pub fn all_schools(&self) -> bool {
        self.school == ALL
    }

    fn place_matches(&self, year: i32, municipality: &str, school_name: &str) -> bool {
        self.year_number() == Some(year)
            && (self.all_municipalities() || municipality == self.municipality)
            && (self.all_schools() || school_name == self.school)
    }

    fn class_matches(&self, grade: u32, subject: &str) -> bool {
        grade.to_string() == self.grade && subject == self.subject
    }
}

// ---------------------------------------------------------------------------
// Predicates per record type
// ---------------------------------------------------------------------------

/// A record that can be tested against the current [`FilterState`].
pub trait Filterable {
    fn matches(&self, filters: &FilterState) -> bool;
}

impl Filterable for MarkRecord {
    fn matches(&self, filters: &FilterState) -> bool {
        filters.place_matches(self.year, &self.municipality, &self.school_name)
            && filters.class_matches(self.grade, &self.subject)
    }
}

impl Filterable for ScoreRecord {
    fn matches(&self, filters: &FilterState) -> bool {
        filters.place_matches(self.year, &self.municipality, &self.school_name)
            && filters.class_matches(self.grade, &self.subject)
    }
}

/// Bias is tracked per school and year, so grade and subject are ignored.
impl Filterable for BiasRecord {
    fn matches(&self, filters: &FilterState) -> bool {
        filters.place_matches(self.year, &self.municipality, &self.school_name)
    }
}

/// Return indices of records that pass all active filters, in source order.
pub fn filtered_indices<R: Filterable>(records: &[R], filters: &FilterState) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.matches(filters))
        .map(|(i, _)| i)
        .collect()
}

/// Return the records that pass all active filters, in source order.
pub fn filtered<'a, R: Filterable>(records: &'a [R], filters: &FilterState) -> Vec<&'a R> {
    records.iter().filter(|r| r.matches(filters)).collect()
}
