use std::fmt::Write;

use crate::data::filter::FilterState;
use crate::engine::{DashboardView, SchoolBias};

/// Render the dashboard as a markdown report.
pub fn render_text(view: &DashboardView) -> String {
    let filters = &view.filters;
    let mut output = String::new();

    let _ = writeln!(output, "# VPR results: {}", selection_label(filters));
    let _ = writeln!(
        output,
        "Year {}, grade {}, {}",
        filters.year, filters.grade, filters.subject
    );
    let _ = writeln!(output);

    let _ = writeln!(output, "## Summary");
    let (participants, success, quality, avg) = view
        .stats
        .as_ref()
        .map(|s| (s.participants, s.success_rate, s.quality_rate, s.avg_mark))
        .unwrap_or_default();
    let _ = writeln!(output, "- Participants: {participants}");
    let _ = writeln!(output, "- Success rate (3, 4, 5): {success:.1}%");
    let _ = writeln!(output, "- Quality rate (4, 5): {quality:.1}%");
    let _ = writeln!(output, "- Average mark: {avg:.2}");
    if view.stats.is_none() {
        let _ = writeln!(output, "No results recorded for this selection.");
    }

    if !view.mark_distribution.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Mark Distribution");
        for share in &view.mark_distribution {
            let _ = writeln!(output, "- \"{}\": {:.1}%", share.mark, share.percentage);
        }
    }

    if !view.score_distribution.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Primary Score Distribution");
        for share in &view.score_distribution {
            let _ = writeln!(output, "- {} points: {:.1}%", share.score, share.percentage);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Objectivity Markers");
    match &view.school_bias {
        SchoolBias::SelectSchool => {
            let _ = writeln!(output, "Select a school for a detailed marker analysis.");
        }
        SchoolBias::School {
            school_name,
            total_markers,
            markers,
            ..
        } => {
            let _ = writeln!(output, "{school_name}: {total_markers} markers in {}", filters.year);
            if *total_markers == 0 {
                let _ = writeln!(output, "No markers.");
            }
            for (label, count) in markers {
                let _ = writeln!(output, "- {label}: {count}");
            }
            let history = view.school_bias.history_years();
            if !history.is_empty() {
                let years: Vec<String> = history.iter().map(|y| y.to_string()).collect();
                let _ = writeln!(
                    output,
                    "Previously flagged in {}.",
                    years.join(", ")
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Share of flagged schools ({})", scope_label(filters));
    for rate in &view.bias_by_year {
        let _ = writeln!(
            output,
            "- {}: {:.1}% ({} of {})",
            rate.year, rate.percentage, rate.flagged_schools, rate.total_schools
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## Flagged Schools, {} ({})",
        scope_label(filters),
        filters.year
    );
    if view.flagged_schools.is_empty() {
        let _ = writeln!(output, "No schools with objectivity markers in this selection.");
    } else {
        let _ = writeln!(output, "Found: {}", view.flagged_schools.len());
        for school in &view.flagged_schools {
            let labels: Vec<&str> = school.markers.keys().map(String::as_str).collect();
            let _ = writeln!(
                output,
                "- {} ({}): {} markers [{}]",
                school.school_name,
                school.municipality,
                school.total_markers,
                labels.join(", ")
            );
        }
    }

    output
}

fn selection_label(filters: &FilterState) -> String {
    if filters.all_schools() {
        format!("whole region, {}", scope_label(filters))
    } else {
        filters.school.clone()
    }
}

fn scope_label(filters: &FilterState) -> String {
    if filters.all_municipalities() {
        "all municipalities".to_string()
    } else {
        filters.municipality.clone()
    }
}
