//! Filter/aggregate engine.
//!
//! Every function here is a pure function of `(records, filters)`. Missing
//! data never fails: it degrades to zero, empty, or `None`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::data::filter::{FilterState, filtered};
use crate::data::model::{BiasRecord, MarkRecord, RecordStore, ScoreRecord};

/// Number of years, ending at the selected one, in the bias-rate series.
pub const BIAS_SERIES_YEARS: i32 = 3;

/// Number of years strictly before the selected one searched for history.
pub const BIAS_HISTORY_YEARS: i32 = 2;

// ---------------------------------------------------------------------------
// Aggregate statistics over mark records
// ---------------------------------------------------------------------------

/// Headline numbers for the current selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub participants: u64,
    /// Participant-weighted share of marks 3, 4 and 5, in percent.
    pub success_rate: f64,
    /// Participant-weighted share of marks 4 and 5, in percent.
    pub quality_rate: f64,
    /// Participant-weighted mean mark on the 2..5 scale.
    pub avg_mark: f64,
    /// Number of records aggregated.
    pub count: usize,
}

/// Aggregate filtered mark records.
///
/// Returns `None` when there are no records or no participants; callers
/// render that as zero.
pub fn aggregate_stats(marks: &[&MarkRecord]) -> Option<AggregateStats> {
    let participants: u64 = marks.iter().map(|m| m.participants as u64).sum();
    if participants == 0 {
        return None;
    }

    let mut success = 0.0;
    let mut quality = 0.0;
    let mut mark_points = 0.0;
    let mut mark_weight = 0.0;
    for m in marks {
        let p = m.participants as f64;
        success += (m.mark3 + m.mark4 + m.mark5) * p / 100.0;
        quality += (m.mark4 + m.mark5) * p / 100.0;
        mark_points += (2.0 * m.mark2 + 3.0 * m.mark3 + 4.0 * m.mark4 + 5.0 * m.mark5) * p;
        mark_weight += (m.mark2 + m.mark3 + m.mark4 + m.mark5) * p;
    }

    let total = participants as f64;
    Some(AggregateStats {
        participants,
        success_rate: as_percent(success / total * 100.0),
        quality_rate: as_percent(quality / total * 100.0),
        avg_mark: if mark_weight > 0.0 {
            mark_points / mark_weight
        } else {
            0.0
        },
        count: marks.len(),
    })
}

/// Mark tiers are not validated on load, so rates are clamped into range.
fn as_percent(v: f64) -> f64 {
    if v.is_finite() { v.clamp(0.0, 100.0) } else { 0.0 }
}

// ---------------------------------------------------------------------------
// Chart series
// ---------------------------------------------------------------------------

/// Participant-weighted share of each mark tier, in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkShare {
    pub mark: u8,
    pub percentage: f64,
}

/// Weighted mark distribution; empty when there are no participants.
pub fn mark_distribution(marks: &[&MarkRecord]) -> Vec<MarkShare> {
    let total: f64 = marks.iter().map(|m| m.participants as f64).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    let tiers: [(u8, fn(&MarkRecord) -> f64); 4] = [
        (2, |m| m.mark2),
        (3, |m| m.mark3),
        (4, |m| m.mark4),
        (5, |m| m.mark5),
    ];
    tiers
        .iter()
        .map(|(mark, tier)| MarkShare {
            mark: *mark,
            percentage: marks
                .iter()
                .map(|m| tier(*m) * m.participants as f64)
                .sum::<f64>()
                / total,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreShare {
    pub score: u32,
    pub percentage: f64,
}

/// Weighted share of participants per primary score band, ordered by band.
/// A record without a band contributes zero to it.
pub fn score_distribution(scores: &[&ScoreRecord]) -> Vec<ScoreShare> {
    let total: f64 = scores.iter().map(|s| s.participants as f64).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    let mut weighted: BTreeMap<u32, f64> = BTreeMap::new();
    for s in scores {
        for (band, pct) in &s.scores {
            *weighted.entry(*band).or_default() += pct * s.participants as f64;
        }
    }
    weighted
        .into_iter()
        .map(|(score, sum)| ScoreShare {
            score,
            percentage: sum / total,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Bias analysis
// ---------------------------------------------------------------------------

/// Objectivity view for the selected school.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SchoolBias {
    /// No single school is selected.
    SelectSchool,
    #[serde(rename_all = "camelCase")]
    School {
        school_name: String,
        total_markers: u32,
        markers: BTreeMap<String, u32>,
        /// Flagged records of the same school in the preceding years.
        history: Vec<BiasRecord>,
    },
}

impl SchoolBias {
    /// Years in which the selected school was flagged before, oldest first.
    pub fn history_years(&self) -> Vec<i32> {
        match self {
            SchoolBias::SelectSchool => Vec::new(),
            SchoolBias::School { history, .. } => history.iter().map(|b| b.year).collect(),
        }
    }
}

/// Look up the selected school in the full bias set.
///
/// The school is matched by display name across all municipalities. A school
/// without a record for the selected year has zero markers.
pub fn school_bias(bias: &[BiasRecord], filters: &FilterState) -> SchoolBias {
    if filters.all_schools() {
        return SchoolBias::SelectSchool;
    }
    let year = filters.year_number();
    let current =
        year.and_then(|y| bias.iter().find(|b| b.school_name == filters.school && b.year == y));

    // A year too small to look back from has no history.
    let window = year.and_then(|y| Some((y.checked_sub(BIAS_HISTORY_YEARS)?, y)));
    let history = match window {
        Some((from, to)) => bias
            .iter()
            .filter(|b| {
                b.school_name == filters.school
                    && b.year >= from
                    && b.year < to
                    && b.is_flagged()
            })
            .cloned()
            .collect(),
        None => Vec::new(),
    };

    SchoolBias::School {
        school_name: filters.school.clone(),
        total_markers: current.map_or(0, |b| b.total_markers),
        markers: current.map(|b| b.markers.clone()).unwrap_or_default(),
        history,
    }
}

/// Share of flagged schools in one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BiasYearRate {
    pub year: i32,
    pub flagged_schools: usize,
    pub total_schools: usize,
    /// Percent, rounded to one decimal. Zero when no schools are in scope.
    pub percentage: f64,
}

/// Flagged-school share for each year of the series ending at the selected
/// year, scoped by municipality only. Schools are counted by login.
pub fn bias_rate_by_year(store: &RecordStore, filters: &FilterState) -> Vec<BiasYearRate> {
    let Some(current) = filters.year_number() else {
        return Vec::new();
    };
    let Some(first) = current.checked_sub(BIAS_SERIES_YEARS - 1) else {
        return Vec::new();
    };
    let in_scope = |municipality: &str| {
        filters.all_municipalities() || municipality == filters.municipality
    };

    (first..=current)
        .map(|year| {
            let schools: BTreeSet<&str> = store
                .marks
                .iter()
                .filter(|m| m.year == year && in_scope(m.municipality.as_str()))
                .map(|m| m.login.as_str())
                .collect();
            let flagged: BTreeSet<&str> = store
                .bias
                .iter()
                .filter(|b| {
                    b.year == year && b.is_flagged() && in_scope(b.municipality.as_str())
                })
                .map(|b| b.login.as_str())
                .collect();

            let percentage = if schools.is_empty() {
                0.0
            } else {
                round1(flagged.len() as f64 / schools.len() as f64 * 100.0)
            };
            BiasYearRate {
                year,
                flagged_schools: flagged.len(),
                total_schools: schools.len(),
                percentage,
            }
        })
        .collect()
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Flagged records, most markers first. Ties keep their source order.
pub fn flagged_schools(bias: &[&BiasRecord]) -> Vec<BiasRecord> {
    let mut flagged: Vec<BiasRecord> = bias
        .iter()
        .filter(|b| b.is_flagged())
        .map(|b| (*b).clone())
        .collect();
    flagged.sort_by(|a, b| b.total_markers.cmp(&a.total_markers));
    flagged
}

// ---------------------------------------------------------------------------
// DashboardView – everything the presentation layer needs
// ---------------------------------------------------------------------------

/// Derived view model for one filter state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub filters: FilterState,
    pub stats: Option<AggregateStats>,
    pub mark_distribution: Vec<MarkShare>,
    pub score_distribution: Vec<ScoreShare>,
    pub school_bias: SchoolBias,
    pub bias_by_year: Vec<BiasYearRate>,
    pub flagged_schools: Vec<BiasRecord>,
}

impl DashboardView {
    /// Run the whole pipeline.
    pub fn compute(store: &RecordStore, filters: &FilterState) -> Self {
        let marks = filtered(&store.marks, filters);
        let scores = filtered(&store.scores, filters);
        let bias = filtered(&store.bias, filters);
        Self::from_filtered(store, filters, &marks, &scores, &bias)
    }

    /// Build the view from already filtered subsets.
    pub fn from_filtered(
        store: &RecordStore,
        filters: &FilterState,
        marks: &[&MarkRecord],
        scores: &[&ScoreRecord],
        bias: &[&BiasRecord],
    ) -> Self {
        DashboardView {
            filters: filters.clone(),
            stats: aggregate_stats(marks),
            mark_distribution: mark_distribution(marks),
            score_distribution: score_distribution(scores),
            school_bias: school_bias(&store.bias, filters),
            bias_by_year: bias_rate_by_year(store, filters),
            flagged_schools: flagged_schools(bias),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::{ALL, FilterUpdate};
    use crate::data::generator::generate_mock;

    fn mark(login: &str, participants: u32, tiers: [f64; 4]) -> MarkRecord {
        MarkRecord {
            year: 2023,
            grade: 4,
            subject: "Математика".to_string(),
            municipality: "А".to_string(),
            login: login.to_string(),
            school_name: login.to_string(),
            participants,
            mark2: tiers[0],
            mark3: tiers[1],
            mark4: tiers[2],
            mark5: tiers[3],
        }
    }

    fn bias(year: i32, muni: &str, school: &str, total: u32) -> BiasRecord {
        BiasRecord {
            year,
            login: format!("{muni}/{school}"),
            municipality: muni.to_string(),
            school_name: school.to_string(),
            total_markers: total,
            markers: BTreeMap::from([("РУ 4".to_string(), total)]),
        }
    }

    fn mock_filters(muni: &str, school: &str) -> FilterState {
        FilterState {
            municipality: muni.to_string(),
            school: school.to_string(),
            ..FilterState::default()
        }
    }

    #[test]
    fn rates_are_participant_weighted() {
        let a = mark("a", 100, [10.0, 40.0, 30.0, 20.0]);
        let b = mark("b", 300, [50.0, 30.0, 20.0, 0.0]);
        let stats = aggregate_stats(&[&a, &b]).unwrap();
        assert_eq!(stats.participants, 400);
        assert_eq!(stats.count, 2);
        // (90 + 150) / 400 and (50 + 60) / 400
        assert!((stats.success_rate - 60.0).abs() < 1e-9);
        assert!((stats.quality_rate - 27.5).abs() < 1e-9);
        // simple mean of percentages would give 70 here
        assert!((stats.success_rate - 70.0).abs() > 1.0);
    }

    #[test]
    fn avg_mark_uses_tier_weights() {
        let a = mark("a", 10, [0.0, 0.0, 50.0, 50.0]);
        let stats = aggregate_stats(&[&a]).unwrap();
        assert!((stats.avg_mark - 4.5).abs() < 1e-9);
    }

    #[test]
    fn empty_selection_has_no_stats() {
        assert_eq!(aggregate_stats(&[]), None);
        let nobody = mark("a", 0, [0.0, 50.0, 50.0, 0.0]);
        assert_eq!(aggregate_stats(&[&nobody]), None);
        assert!(mark_distribution(&[]).is_empty());
        assert!(score_distribution(&[]).is_empty());
    }

    #[test]
    fn rates_stay_within_bounds_on_inconsistent_tiers() {
        let broken = mark("a", 10, [0.0, 80.0, 80.0, 80.0]);
        let stats = aggregate_stats(&[&broken]).unwrap();
        assert_eq!(stats.success_rate, 100.0);
        assert_eq!(stats.quality_rate, 100.0);
    }

    #[test]
    fn mark_distribution_weights_by_participants() {
        let a = mark("a", 100, [10.0, 40.0, 30.0, 20.0]);
        let b = mark("b", 300, [50.0, 30.0, 20.0, 0.0]);
        let dist = mark_distribution(&[&a, &b]);
        assert_eq!(dist.iter().map(|s| s.mark).collect::<Vec<_>>(), vec![2, 3, 4, 5]);
        assert!((dist[0].percentage - 40.0).abs() < 1e-9);
        assert!((dist[3].percentage - 5.0).abs() < 1e-9);
    }

    #[test]
    fn score_distribution_treats_missing_band_as_zero() {
        let base = ScoreRecord {
            year: 2023,
            grade: 4,
            subject: "Математика".to_string(),
            municipality: "А".to_string(),
            login: "a".to_string(),
            school_name: "a".to_string(),
            participants: 100,
            scores: BTreeMap::from([(10, 20.0), (20, 80.0)]),
        };
        let other = ScoreRecord {
            participants: 100,
            scores: BTreeMap::from([(20, 60.0), (30, 40.0)]),
            ..base.clone()
        };
        let dist = score_distribution(&[&base, &other]);
        assert_eq!(dist.len(), 3);
        assert_eq!(dist[0], ScoreShare { score: 10, percentage: 10.0 });
        assert_eq!(dist[1], ScoreShare { score: 20, percentage: 70.0 });
        assert_eq!(dist[2], ScoreShare { score: 30, percentage: 20.0 });
    }

    #[test]
    fn flagged_list_is_sorted_and_stable() {
        let records = vec![
            bias(2023, "А", "first", 1),
            bias(2023, "А", "clean", 0),
            bias(2023, "А", "most", 4),
            bias(2023, "А", "second", 1),
        ];
        let refs: Vec<&BiasRecord> = records.iter().collect();
        let flagged = flagged_schools(&refs);
        let names: Vec<&str> = flagged.iter().map(|b| b.school_name.as_str()).collect();
        assert_eq!(names, vec!["most", "first", "second"]);
        assert!(flagged.iter().all(|b| b.total_markers > 0));
    }

    #[test]
    fn makhachkala_example() {
        let store = generate_mock();
        let filters = mock_filters("г. Махачкала", ALL);
        let view = DashboardView::compute(&store, &filters);

        assert_eq!(view.flagged_schools.len(), 2);
        assert!(view.flagged_schools.iter().all(|b| b.total_markers == 2));
        let current = view.bias_by_year.last().unwrap();
        assert_eq!(current.year, 2023);
        assert_eq!(current.total_schools, 10);
        assert_eq!(current.flagged_schools, 2);
        assert_eq!(current.percentage, 20.0);
    }

    #[test]
    fn bias_series_covers_three_years() {
        // mock logins repeat across municipalities, so the region has 10 distinct schools
        let store = generate_mock();
        let rates = bias_rate_by_year(&store, &FilterState::default());
        let years: Vec<i32> = rates.iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2021, 2022, 2023]);
        assert!(rates.iter().all(|r| r.total_schools == 10 && r.percentage == 20.0));
    }

    #[test]
    fn bias_rate_without_schools_is_zero() {
        let store = generate_mock();
        let filters = FilterState {
            year: "2030".to_string(),
            ..FilterState::default()
        };
        let rates = bias_rate_by_year(&store, &filters);
        assert_eq!(rates.len(), 3);
        assert!(rates.iter().all(|r| r.percentage == 0.0 && !r.percentage.is_nan()));

        let nowhere = mock_filters("Нет такого", ALL);
        assert!(bias_rate_by_year(&store, &nowhere).iter().all(|r| r.percentage == 0.0));
    }

    #[test]
    fn bias_rate_rounds_to_one_decimal() {
        let marks: Vec<MarkRecord> = (0..3).map(|i| mark(&format!("s{i}"), 10, [0.0; 4])).collect();
        let store = RecordStore::new(marks, Vec::new(), vec![BiasRecord {
            login: "s0".to_string(),
            ..bias(2023, "А", "s0", 1)
        }]);
        let rates = bias_rate_by_year(&store, &FilterState::default());
        assert_eq!(rates[2].percentage, 33.3);
    }

    #[test]
    fn all_schools_yields_placeholder() {
        let store = generate_mock();
        let view = DashboardView::compute(&store, &FilterState::default());
        assert_eq!(view.school_bias, SchoolBias::SelectSchool);
        assert!(view.school_bias.history_years().is_empty());
    }

    #[test]
    fn school_lookup_and_history_window() {
        let records = vec![
            bias(2020, "А", "ОО №5", 3),
            bias(2021, "А", "ОО №5", 2),
            bias(2022, "А", "ОО №5", 0),
            bias(2023, "А", "ОО №5", 1),
            bias(2022, "А", "ОО №6", 4),
        ];
        let result = school_bias(&records, &mock_filters("А", "ОО №5"));
        match &result {
            SchoolBias::School {
                total_markers,
                markers,
                history,
                ..
            } => {
                assert_eq!(*total_markers, 1);
                assert_eq!(markers["РУ 4"], 1);
                assert_eq!(history.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(result.history_years(), vec![2021]);
    }

    #[test]
    fn school_without_record_has_zero_markers() {
        let records = vec![bias(2022, "А", "ОО №5", 2)];
        let result = school_bias(&records, &mock_filters("А", "ОО №5"));
        assert_eq!(
            result,
            SchoolBias::School {
                school_name: "ОО №5".to_string(),
                total_markers: 0,
                markers: BTreeMap::new(),
                history: records.clone(),
            }
        );
    }

    #[test]
    fn single_school_selection_narrows_everything() {
        let store = generate_mock();
        let filters = mock_filters("г. Дербент", ALL).apply(FilterUpdate {
            school: Some("ОО №5 (г. Дербент)".to_string()),
            ..FilterUpdate::default()
        });
        let view = DashboardView::compute(&store, &filters);
        let stats = view.stats.as_ref().unwrap();
        assert_eq!(stats.participants, 100);
        assert!((stats.success_rate - 95.0).abs() < 1e-9);
        assert!((stats.quality_rate - 75.0).abs() < 1e-9);
        assert_eq!(view.flagged_schools.len(), 1);
        assert_eq!(view.school_bias.history_years(), vec![2021, 2022]);
    }

    #[test]
    fn minimal_year_does_not_overflow() {
        let store = generate_mock();
        let filters = FilterState {
            year: i32::MIN.to_string(),
            ..mock_filters("г. Дербент", "ОО №5 (г. Дербент)")
        };
        let view = DashboardView::compute(&store, &filters);
        assert_eq!(view.stats, None);
        assert!(view.bias_by_year.is_empty());
        assert!(view.flagged_schools.is_empty());
        assert_eq!(
            view.school_bias,
            SchoolBias::School {
                school_name: "ОО №5 (г. Дербент)".to_string(),
                total_markers: 0,
                markers: BTreeMap::new(),
                history: Vec::new(),
            }
        );

        let near_min = FilterState {
            year: (i32::MIN + 1).to_string(),
            ..FilterState::default()
        };
        assert!(bias_rate_by_year(&store, &near_min).is_empty());
    }

    #[test]
    fn padded_year_is_consistent_across_the_view() {
        let store = generate_mock();
        let filters = FilterState {
            year: " 2023 ".to_string(),
            ..mock_filters("г. Махачкала", ALL)
        };
        let view = DashboardView::compute(&store, &filters);
        assert_eq!(view.stats.as_ref().map(|s| s.participants), Some(1000));
        assert_eq!(view.flagged_schools.len(), 2);
        assert_eq!(view.bias_by_year.last().map(|r| r.percentage), Some(20.0));
    }

    #[test]
    fn score_distribution_follows_narrowed_filter() {
        let mut store = generate_mock();
        for s in store.scores.iter_mut() {
            if s.municipality == "г. Каспийск" && s.grade == 4 {
                s.scores = BTreeMap::from([(10, 100.0)]);
            }
        }
        let view = DashboardView::compute(&store, &mock_filters("г. Каспийск", ALL));
        assert_eq!(view.score_distribution, vec![ScoreShare { score: 10, percentage: 100.0 }]);

        let other = DashboardView::compute(&store, &mock_filters("г. Дербент", ALL));
        assert_eq!(other.score_distribution.len(), 3);
        assert_eq!(other.score_distribution[2], ScoreShare { score: 30, percentage: 85.0 });
    }

    #[test]
    fn recomputing_is_idempotent() {
        let store = generate_mock();
        let filters = mock_filters("г. Каспийск", ALL);
        assert_eq!(
            DashboardView::compute(&store, &filters),
            DashboardView::compute(&store, &filters)
        );
    }
}
