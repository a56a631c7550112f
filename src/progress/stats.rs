use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::bank::question::domain_name;
use crate::engine::scaling::score_band;
use crate::session::result::{TestKind, TestResult};

const WEEKS_SHOWN: i64 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Accuracy {
    pub total_questions: u32,
    pub total_correct: u32,
    pub percentage: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainAccuracy {
    pub domain: String,
    pub name: String,
    pub accuracy: Accuracy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecentScore {
    pub completed_at: DateTime<Utc>,
    pub reading: Option<u32>,
    pub math: Option<u32>,
    pub total: u32,
    pub range: (u32, u32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeeklyBucket {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub accuracy: Accuracy,
}

pub(crate) fn percentage(correct: u32, total: u32) -> u32 {
    if total == 0 {
        0
    } else {
        (correct as f64 / total as f64 * 100.0).round() as u32
    }
}

fn accuracy_of<'a, I: IntoIterator<Item = &'a TestResult>>(results: I) -> Accuracy {
    let (total, correct) = results
        .into_iter()
        .fold((0u32, 0u32), |(t, c), r| (t + r.total_questions, c + r.correct_answers));
    Accuracy {
        total_questions: total,
        total_correct: correct,
        percentage: percentage(correct, total),
    }
}

pub fn overall_accuracy(history: &[TestResult]) -> Accuracy {
    accuracy_of(history)
}

/// Accuracy per content domain, ordered by domain key. Results without a
/// domain are skipped.
pub fn domain_accuracy(history: &[TestResult]) -> Vec<DomainAccuracy> {
    let mut by_domain: BTreeMap<&str, Vec<&TestResult>> = BTreeMap::new();
    for result in history {
        if let Some(domain) = result.domain.as_deref() {
            by_domain.entry(domain).or_default().push(result);
        }
    }
    by_domain
        .into_iter()
        .map(|(domain, results)| DomainAccuracy {
            domain: domain.to_string(),
            name: domain_name(domain).to_string(),
            accuracy: accuracy_of(results),
        })
        .collect()
}

/// Latest scored full tests first.
pub fn recent_scores(history: &[TestResult], limit: usize) -> Vec<RecentScore> {
    let mut full: Vec<&TestResult> = history
        .iter()
        .filter(|r| r.kind == TestKind::Full && r.score.and_then(|s| s.total).is_some())
        .collect();
    full.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    full.into_iter()
        .take(limit)
        .filter_map(|r| {
            let score = r.score?;
            let total = score.total?;
            Some(RecentScore {
                completed_at: r.completed_at,
                reading: score.reading,
                math: score.math,
                total,
                range: score_band(total),
            })
        })
        .collect()
}

/// Activity over the last five 7-day windows ending at `now`, oldest first.
/// Windows without any answered questions are left out.
pub fn weekly_buckets(history: &[TestResult], now: DateTime<Utc>) -> Vec<WeeklyBucket> {
    let mut buckets = Vec::new();
    for i in (0..WEEKS_SHOWN).rev() {
        let end = now - Duration::days(i * 7);
        let start = end - Duration::days(7);
        let accuracy = accuracy_of(
            history
                .iter()
                .filter(|r| r.completed_at >= start && r.completed_at < end),
        );
        if accuracy.total_questions > 0 {
            buckets.push(WeeklyBucket {
                start: start.date_naive(),
                end: end.date_naive(),
                accuracy,
            });
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::result::{ScoreBreakdown, SectionScope};

    fn result(kind: TestKind, total: u32, correct: u32, days_ago: i64, now: DateTime<Utc>) -> TestResult {
        let mut r = TestResult::new(kind, SectionScope::Math, total, correct);
        r.completed_at = now - Duration::days(days_ago);
        r
    }

    #[test]
    fn test_overall_accuracy_rounds() {
        let now = Utc::now();
        let history = vec![
            result(TestKind::Sectional, 3, 2, 0, now),
            result(TestKind::Sectional, 3, 0, 0, now),
        ];
        let acc = overall_accuracy(&history);
        assert_eq!(acc.total_questions, 6);
        assert_eq!(acc.total_correct, 2);
        assert_eq!(acc.percentage, 33);
    }

    #[test]
    fn test_empty_history_is_zero_percent() {
        assert_eq!(overall_accuracy(&[]).percentage, 0);
        assert!(domain_accuracy(&[]).is_empty());
    }

    #[test]
    fn test_domain_accuracy_groups_and_names() {
        let now = Utc::now();
        let history = vec![
            result(TestKind::Sectional, 10, 8, 0, now).with_domain("algebra"),
            result(TestKind::Sectional, 10, 4, 1, now).with_domain("algebra"),
            result(TestKind::Sectional, 5, 5, 1, now).with_domain("geometry"),
            result(TestKind::Full, 98, 70, 2, now),
        ];
        let domains = domain_accuracy(&history);
        assert_eq!(domains.len(), 2);
        assert_eq!(domains[0].name, "Algebra");
        assert_eq!(domains[0].accuracy.percentage, 60);
        assert_eq!(domains[1].name, "Geometry and Trigonometry");
        assert_eq!(domains[1].accuracy.percentage, 100);
    }

    #[test]
    fn test_recent_scores_latest_first_with_band() {
        let now = Utc::now();
        let score = |total: u32| ScoreBreakdown {
            reading: Some(total / 2),
            math: Some(total - total / 2),
            total: Some(total),
        };
        let history = vec![
            result(TestKind::Full, 98, 80, 10, now).with_score(score(1410)),
            result(TestKind::Full, 98, 90, 3, now).with_score(score(1550)),
            result(TestKind::Sectional, 10, 9, 1, now),
            result(TestKind::Full, 98, 20, 20, now).with_score(score(450)),
        ];
        let recent = recent_scores(&history, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].total, 1550);
        assert_eq!(recent[0].range, (1450, 1600));
        assert_eq!(recent[1].total, 1410);

        let all = recent_scores(&history, 10);
        assert_eq!(all[2].range, (400, 550));
    }

    #[test]
    fn test_weekly_buckets_skip_empty_weeks() {
        let now = Utc::now();
        let history = vec![
            result(TestKind::Sectional, 10, 5, 1, now),
            result(TestKind::Sectional, 10, 10, 2, now),
            result(TestKind::Sectional, 10, 1, 20, now),
            result(TestKind::Sectional, 10, 1, 60, now),
        ];
        let weeks = weekly_buckets(&history, now);
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].accuracy.total_correct, 1);
        assert_eq!(weeks[1].accuracy.total_questions, 20);
        assert_eq!(weeks[1].accuracy.percentage, 75);
    }
}
