use std::collections::HashSet;

use tracing::{debug, warn};

use crate::bank::question::Question;
use crate::bank::repository::{BankError, QueryFilter, QuestionRepository};
use crate::engine::adaptive::{Difficulty, DifficultyPool};
use crate::engine::section::Section;

/// Fetch `count` questions matching `filter`; if the pool runs short, top
/// up from the same filter with the difficulty restriction lifted.
fn fetch_widening<R: QuestionRepository + ?Sized>(
    repo: &mut R,
    filter: QueryFilter,
    count: usize,
) -> Result<Vec<Question>, BankError> {
    let mut picked = repo.fetch(&filter, count)?;
    if picked.len() < count && !filter.difficulties.is_empty() {
        let shortfall = count - picked.len();
        warn!(
            section = filter.section.to_key(),
            requested = count,
            found = picked.len(),
            "difficulty pool short, widening"
        );
        let ids: HashSet<String> = picked.iter().map(|q| q.id.clone()).collect();
        let mut wider = filter.clone().exclude(ids);
        wider.difficulties.clear();
        picked.extend(repo.fetch(&wider, shortfall)?);
    }
    if picked.is_empty() && count > 0 {
        return Err(BankError::PoolExhausted {
            section: filter.section,
            difficulties: filter.difficulties.iter().copied().collect(),
        });
    }
    debug!(section = filter.section.to_key(), count = picked.len(), "selected questions");
    Ok(picked)
}

/// Module 1 draws from every difficulty.
pub fn module1_questions<R: QuestionRepository + ?Sized>(
    repo: &mut R,
    section: Section,
    exclude: &HashSet<String>,
) -> Result<Vec<Question>, BankError> {
    let filter = QueryFilter::new(section).exclude(exclude.iter().cloned());
    fetch_widening(repo, filter, section.config().module_size as usize)
}

pub fn module2_questions<R: QuestionRepository + ?Sized>(
    repo: &mut R,
    section: Section,
    pool: DifficultyPool,
    exclude: &HashSet<String>,
) -> Result<Vec<Question>, BankError> {
    let filter = QueryFilter::new(section)
        .difficulties(&pool.as_vec())
        .exclude(exclude.iter().cloned());
    fetch_widening(repo, filter, section.config().module_size as usize)
}

pub struct PracticeRequest<'a> {
    pub section: Section,
    pub domain: Option<&'a str>,
    pub subunit: Option<&'a str>,
    pub difficulty: Option<Difficulty>,
    pub count: usize,
}

/// Sectional practice: the requested difficulty first, then the others.
pub fn practice_questions<R: QuestionRepository + ?Sized>(
    repo: &mut R,
    request: &PracticeRequest<'_>,
    exclude: &HashSet<String>,
) -> Result<Vec<Question>, BankError> {
    let mut filter = QueryFilter::new(request.section).exclude(exclude.iter().cloned());
    if let Some(domain) = request.domain {
        filter = filter.domain(domain);
    }
    if let Some(subunit) = request.subunit {
        filter = filter.subunit(subunit);
    }
    if let Some(difficulty) = request.difficulty {
        filter = filter.difficulties(&[difficulty]);
    }
    fetch_widening(repo, filter, request.count)
}

/// Daily challenge size.
pub const DAILY_QUESTIONS: usize = 5;

/// A short set mixing both sections at any difficulty. Reading takes the odd
/// question; a section that runs short is made up from the other.
pub fn daily_questions<R: QuestionRepository + ?Sized>(
    repo: &mut R,
    count: usize,
    exclude: &HashSet<String>,
) -> Result<Vec<Question>, BankError> {
    let reading = QueryFilter::new(Section::Reading).exclude(exclude.iter().cloned());
    let mut picked = repo.fetch(&reading, count - count / 2)?;

    let math = QueryFilter::new(Section::Math).exclude(exclude.iter().cloned());
    picked.extend(repo.fetch(&math, count - picked.len())?);

    if picked.len() < count {
        let taken = exclude.iter().cloned().chain(picked.iter().map(|q| q.id.clone()));
        let refill = QueryFilter::new(Section::Reading).exclude(taken);
        picked.extend(repo.fetch(&refill, count - picked.len())?);
    }
    if picked.is_empty() && count > 0 {
        return Err(BankError::PoolExhausted {
            section: Section::Reading,
            difficulties: Vec::new(),
        });
    }
    debug!(count = picked.len(), "selected daily challenge");
    Ok(picked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::repository::InMemoryRepository;
    use crate::bank::repository::tests::bank;

    #[test]
    fn test_module2_hard_pool_excludes_easy_when_plentiful() {
        let mut repo = InMemoryRepository::with_seed(bank(Section::Math, "algebra", 20), 11).unwrap();
        let got = module2_questions(&mut repo, Section::Math, DifficultyPool::HARD, &HashSet::new()).unwrap();
        assert_eq!(got.len(), 22);
        assert!(got.iter().all(|q| q.difficulty != Difficulty::Easy));
    }

    #[test]
    fn test_module2_widens_on_shortfall() {
        // 8 hard + 8 medium = 16 < 22, so 6 easy fill in.
        let mut repo = InMemoryRepository::with_seed(bank(Section::Math, "algebra", 8), 5).unwrap();
        let got = module2_questions(&mut repo, Section::Math, DifficultyPool::HARD, &HashSet::new()).unwrap();
        assert_eq!(got.len(), 22);
        let easy = got.iter().filter(|q| q.difficulty == Difficulty::Easy).count();
        assert_eq!(easy, 6);
        let ids: HashSet<&str> = got.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids.len(), 22, "no duplicates after widening");
    }

    #[test]
    fn test_module1_skips_used_questions() {
        let mut repo = InMemoryRepository::with_seed(bank(Section::Reading, "craft-structure", 10), 2).unwrap();
        let first = module1_questions(&mut repo, Section::Reading, &HashSet::new()).unwrap();
        assert_eq!(first.len(), 27);
        let used: HashSet<String> = first.iter().map(|q| q.id.clone()).collect();
        let second = module1_questions(&mut repo, Section::Reading, &used).unwrap();
        assert_eq!(second.len(), 3);
        assert!(second.iter().all(|q| !used.contains(&q.id)));
    }

    #[test]
    fn test_empty_pool_is_exhausted() {
        let mut repo = InMemoryRepository::with_seed(bank(Section::Math, "algebra", 2), 2).unwrap();
        let err = module1_questions(&mut repo, Section::Reading, &HashSet::new()).unwrap_err();
        assert!(matches!(err, BankError::PoolExhausted { section: Section::Reading, .. }));
    }

    #[test]
    fn test_practice_prefers_requested_difficulty() {
        let mut repo = InMemoryRepository::with_seed(bank(Section::Math, "algebra", 5), 4).unwrap();
        let request = PracticeRequest {
            section: Section::Math,
            domain: Some("algebra"),
            subunit: None,
            difficulty: Some(Difficulty::Medium),
            count: 8,
        };
        let got = practice_questions(&mut repo, &request, &HashSet::new()).unwrap();
        assert_eq!(got.len(), 8);
        let medium = got.iter().filter(|q| q.difficulty == Difficulty::Medium).count();
        assert_eq!(medium, 5);
    }

    #[test]
    fn test_daily_set_mixes_sections() {
        let mut questions = bank(Section::Reading, "craft-structure", 4);
        questions.extend(bank(Section::Math, "algebra", 4));
        let mut repo = InMemoryRepository::with_seed(questions, 9).unwrap();
        let got = daily_questions(&mut repo, DAILY_QUESTIONS, &HashSet::new()).unwrap();
        assert_eq!(got.len(), 5);
        let reading = got.iter().filter(|q| q.section == Section::Reading).count();
        assert_eq!(reading, 3);
    }

    #[test]
    fn test_daily_set_fills_from_other_section() {
        let mut repo = InMemoryRepository::with_seed(bank(Section::Math, "algebra", 2), 9).unwrap();
        let got = daily_questions(&mut repo, DAILY_QUESTIONS, &HashSet::new()).unwrap();
        assert_eq!(got.len(), 5);
        assert!(got.iter().all(|q| q.section == Section::Math));

        let mut empty = InMemoryRepository::with_seed(Vec::new(), 9).unwrap();
        assert!(matches!(
            daily_questions(&mut empty, DAILY_QUESTIONS, &HashSet::new()),
            Err(BankError::PoolExhausted { .. })
        ));
    }
}
