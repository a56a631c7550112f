use std::collections::BTreeMap;

use crate::bank::question::{Question, domain_name};
use crate::engine::section::{MAX_SCALED, MIN_SCALED, SCALED_SPAN, Section};
use crate::progress::stats::percentage;

/// A domain at or above this accuracy counts as strong.
pub const STRONG_DOMAIN_PCT: u32 = 70;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainResult {
    pub domain: String,
    pub name: String,
    pub correct: u32,
    pub total: u32,
    pub percentage: u32,
    pub strong: bool,
}

/// Post-practice breakdown of a finished question set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagnosticReport {
    pub correct: u32,
    pub total: u32,
    pub percentage: u32,
    /// Scaled estimate per section present in the set.
    pub estimated_scores: Vec<(Section, u32)>,
    pub avg_secs_per_question: u64,
    pub domains: Vec<DomainResult>,
    pub unanswered: usize,
    /// Positions in the question list answered wrong or left blank.
    pub incorrect: Vec<usize>,
    pub recommendations: Vec<String>,
}

impl DiagnosticReport {
    pub fn has_incorrect(&self) -> bool {
        !self.incorrect.is_empty()
    }
}

fn estimate(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return MIN_SCALED;
    }
    let scaled = MIN_SCALED as f64 + correct as f64 / total as f64 * SCALED_SPAN;
    (scaled.round() as u32).clamp(MIN_SCALED, MAX_SCALED)
}

fn target_secs(section: Section) -> f64 {
    let config = section.config();
    config.time_limit_secs as f64 / config.module_size as f64
}

/// Break down answers to `questions`. A missing answer counts as wrong.
pub fn diagnose(questions: &[Question], answers: &[Option<usize>], time_spent_secs: u64) -> DiagnosticReport {
    let mut incorrect = Vec::new();
    let mut unanswered = 0;
    let mut by_section: BTreeMap<Section, (u32, u32)> = BTreeMap::new();
    let mut by_domain: BTreeMap<&str, (u32, u32)> = BTreeMap::new();

    for (i, question) in questions.iter().enumerate() {
        let answer = answers.get(i).copied().flatten();
        let right = answer == Some(question.answer);
        if answer.is_none() {
            unanswered += 1;
        }
        if !right {
            incorrect.push(i);
        }
        for tally in [
            by_section.entry(question.section).or_default(),
            by_domain.entry(question.domain.as_str()).or_default(),
        ] {
            tally.0 += right as u32;
            tally.1 += 1;
        }
    }

    let total = questions.len() as u32;
    let correct = total - incorrect.len() as u32;
    let domains: Vec<DomainResult> = by_domain
        .into_iter()
        .map(|(domain, (c, t))| {
            let pct = percentage(c, t);
            DomainResult {
                domain: domain.to_string(),
                name: domain_name(domain).to_string(),
                correct: c,
                total: t,
                percentage: pct,
                strong: pct >= STRONG_DOMAIN_PCT,
            }
        })
        .collect();
    let avg_secs_per_question = if total == 0 { 0 } else { time_spent_secs / total as u64 };

    let mut recommendations: Vec<String> = domains
        .iter()
        .filter(|d| !d.strong)
        .map(|d| format!("Review {}: {} of {} correct.", d.name, d.correct, d.total))
        .collect();
    if unanswered > 0 {
        recommendations.push(format!(
            "{unanswered} question(s) left blank. Blank answers score the same as wrong ones, so always guess."
        ));
    }
    if total > 0 {
        let target = questions.iter().map(|q| target_secs(q.section)).sum::<f64>() / total as f64;
        if avg_secs_per_question as f64 > target {
            recommendations.push(format!(
                "Work on pacing: {avg_secs_per_question}s per question against a target of {}s.",
                target.round() as u64
            ));
        }
    }
    if recommendations.is_empty() && total > 0 {
        recommendations.push("Every domain is at 70% or better. Try a harder difficulty next.".to_string());
    }

    DiagnosticReport {
        correct,
        total,
        percentage: percentage(correct, total),
        estimated_scores: by_section.into_iter().map(|(s, (c, t))| (s, estimate(c, t))).collect(),
        avg_secs_per_question,
        domains,
        unanswered,
        incorrect,
        recommendations,
    }
}
