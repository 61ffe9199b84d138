//! Scoring aggregator

use serde::Serialize;

use crate::models::{TestCase, TestResult};

/// Aggregate outcome of one graded run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreSummary {
    /// Percentage of points earned, 0..=100
    pub score: i32,
    /// True iff every test result passed (and at least one was graded)
    pub passed: bool,
    pub earned_points: i64,
    pub total_points: i64,
    pub passed_test_cases: usize,
    pub total_test_cases: usize,
}

/// Aggregate `results` graded against `test_cases` (index-aligned).
///
/// `score = round_half_up(earned / total * 100)`, or 0 when no points are at
/// stake. Rounding happens on the percentage only, in integer arithmetic.
pub fn aggregate(results: &[TestResult], test_cases: &[&TestCase]) -> ScoreSummary {
    let total_points: i64 = test_cases.iter().map(|tc| i64::from(tc.weight())).sum();
    let earned_points: i64 = results
        .iter()
        .map(|r| i64::from(r.points_earned.max(0)))
        .sum();
    let passed_test_cases = results.iter().filter(|r| r.passed).count();

    let score = if total_points > 0 {
        // floor(earned * 100 / total + 1/2)
        let rounded = (earned_points * 200 + total_points) / (2 * total_points);
        rounded.clamp(0, 100) as i32
    } else {
        0
    };

    ScoreSummary {
        score,
        passed: !results.is_empty() && passed_test_cases == results.len(),
        earned_points,
        total_points,
        passed_test_cases,
        total_test_cases: results.len(),
    }
}
