//! Deterministic rubric scoring over extracted article metadata.
//!
//! Every rubric rule is evaluated on its own and the contributions are summed.
//! Absent or false fields contribute nothing and are left out of the breakdown.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::article::ArticleMetadata;

const POINTS_PER_LIST_ENTRY: i64 = 5;
const CLINICAL_TRIAL_POINTS: i64 = 10;
const REVIEW_POINTS: i64 = -5;

/// Total points and the per-category contributions that make them up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub overall_points: i64,
    pub breakdown: BTreeMap<String, i64>,
}

impl Score {
    fn award(&mut self, category: &str, points: i64) {
        if points == 0 {
            return;
        }
        self.overall_points += points;
        self.breakdown.insert(category.to_string(), points);
    }
}

pub fn score(metadata: &ArticleMetadata) -> Score {
    let mut score = Score::default();

    let flags = [
        ("pediatric_focus", metadata.pediatric_focus, 10),
        ("drugs_tested", metadata.drugs_tested, 5),
        ("cell_studies", metadata.cell_studies, 5),
        ("mice_studies", metadata.mice_studies, 10),
        ("case_report", metadata.case_report, 5),
        ("series_of_case_reports", metadata.series_of_case_reports, 10),
        ("clinical_study", metadata.clinical_study, 15),
        (
            "clinical_study_on_children",
            metadata.clinical_study_on_children,
            20,
        ),
        ("novelty", metadata.novelty, 10),
    ];
    for (category, flag, points) in flags {
        if flag.unwrap_or(false) {
            score.award(category, points);
        }
    }

    score.award("paper_type", paper_type_points(&metadata.paper_type));
    score.award(
        "actionable_events",
        list_points(metadata.actionable_events.len()),
    );
    score.award(
        "drug_results",
        list_points(metadata.drug_results.as_ref().map_or(0, Vec::len)),
    );

    score
}

/// "clinical trial" wins over "review" when a paper type mentions both.
fn paper_type_points(paper_type: &str) -> i64 {
    let paper_type = paper_type.to_lowercase();
    if paper_type.contains("clinical trial") {
        CLINICAL_TRIAL_POINTS
    } else if paper_type.contains("review") {
        REVIEW_POINTS
    } else {
        0
    }
}

fn list_points(entries: usize) -> i64 {
    i64::try_from(entries)
        .unwrap_or(i64::MAX / POINTS_PER_LIST_ENTRY)
        .saturating_mul(POINTS_PER_LIST_ENTRY)
}
