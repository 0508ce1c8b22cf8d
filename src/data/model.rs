use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::filter::ALL;

// ---------------------------------------------------------------------------
// Records – one row per school/year(/grade/subject)
// ---------------------------------------------------------------------------

/// Mark distribution of one school for one grade/subject in one year.
///
/// `mark2`..`mark5` are percentages of participants per tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    pub year: i32,
    pub grade: u32,
    pub subject: String,
    pub municipality: String,
    /// Stable school identifier.
    pub login: String,
    pub school_name: String,
    pub participants: u32,
    pub mark2: f64,
    pub mark3: f64,
    pub mark4: f64,
    pub mark5: f64,
}

/// Primary score distribution: score band → percentage of participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub year: i32,
    pub grade: u32,
    pub subject: String,
    pub municipality: String,
    pub login: String,
    pub school_name: String,
    pub participants: u32,
    pub scores: BTreeMap<u32, f64>,
}

/// Objectivity markers raised for a school in a given year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiasRecord {
    pub year: i32,
    pub login: String,
    pub municipality: String,
    pub school_name: String,
    pub total_markers: u32,
    /// Subject/grade label (e.g. `"РУ 4"`) → marker count.
    #[serde(default)]
    pub markers: BTreeMap<String, u32>,
}

impl BiasRecord {
    /// Sum of the per-label marker counts.
    pub fn markers_sum(&self) -> u32 {
        self.markers.values().sum()
    }

    pub fn is_flagged(&self) -> bool {
        self.total_markers > 0
    }
}

// ---------------------------------------------------------------------------
// FilterOptions – selectable values for each dimension
// ---------------------------------------------------------------------------

/// Values a user can pick for each filter, derived from the mark records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOptions {
    /// Newest first.
    pub years: Vec<i32>,
    pub grades: Vec<u32>,
    pub subjects: Vec<String>,
    pub municipalities: Vec<String>,
    /// School names per municipality.
    schools_by_municipality: BTreeMap<String, BTreeSet<String>>,
}

impl FilterOptions {
    pub fn from_marks(marks: &[MarkRecord]) -> Self {
        let mut years = BTreeSet::new();
        let mut grades = BTreeSet::new();
        let mut subjects = BTreeSet::new();
        let mut schools_by_municipality: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for m in marks {
            years.insert(m.year);
            grades.insert(m.grade);
            subjects.insert(m.subject.clone());
            schools_by_municipality
                .entry(m.municipality.clone())
                .or_default()
                .insert(m.school_name.clone());
        }

        FilterOptions {
            years: years.into_iter().rev().collect(),
            grades: grades.into_iter().collect(),
            subjects: subjects.into_iter().collect(),
            municipalities: schools_by_municipality.keys().cloned().collect(),
            schools_by_municipality,
        }
    }

    /// Sorted school names, scoped to `municipality` unless it is [`ALL`].
    pub fn schools(&self, municipality: &str) -> Vec<String> {
        if municipality == ALL {
            let all: BTreeSet<&String> = self.schools_by_municipality.values().flatten().collect();
            return all.into_iter().cloned().collect();
        }
        self.schools_by_municipality
            .get(municipality)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// RecordStore – the complete loaded dataset
// ---------------------------------------------------------------------------

/// All records of a session. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    pub marks: Vec<MarkRecord>,
    pub scores: Vec<ScoreRecord>,
    pub bias: Vec<BiasRecord>,
    pub options: FilterOptions,
}

impl RecordStore {
    /// Build the option index from the loaded collections.
    pub fn new(marks: Vec<MarkRecord>, scores: Vec<ScoreRecord>, bias: Vec<BiasRecord>) -> Self {
        let options = FilterOptions::from_marks(&marks);
        RecordStore {
            marks,
            scores,
            bias,
            options,
        }
    }

    /// Total number of records across the three collections.
    pub fn len(&self) -> usize {
        self.marks.len() + self.scores.len() + self.bias.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
