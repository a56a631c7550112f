use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::bank::question::{Question, QuestionBankFile, find_domain};
use crate::bank::repository::BankError;
use crate::engine::adaptive::Difficulty;
use crate::engine::section::Section;

const CHOICE_MARKER: &str = "Choose 1 answer:";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid import pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("unknown {section:?} domain '{domain}'")]
    UnknownDomain { section: Section, domain: String },

    #[error("subunit name is empty")]
    EmptySubunit,

    #[error(transparent)]
    Bank(#[from] BankError),
}

/// One question block as written in the text format, before it is given an
/// id and a place in the bank.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedQuestion {
    pub label: String,
    pub difficulty: Difficulty,
    pub passage: Option<String>,
    pub prompt: String,
    pub choices: Vec<String>,
    pub answer: usize,
    pub explanation: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedBlock {
    pub label: String,
    pub reason: &'static str,
}

#[derive(Clone, Debug, Default)]
pub struct ParseOutcome {
    pub questions: Vec<ParsedQuestion>,
    pub skipped: Vec<SkippedBlock>,
}

struct Block<'a> {
    label: String,
    difficulty: Option<Difficulty>,
    lines: Vec<&'a str>,
}

/// Reads the plain-text question format:
///
/// ```text
/// Easy:
/// Q1:
/// <passage>
/// <question>
/// Choose 1 answer:
/// A. ...
/// B. ...
/// Correct Answer: B
/// Explanation: ...
/// ```
///
/// `Easy:`/`Medium:`/`Hard:` headers set the difficulty of the blocks that
/// follow. The passage line is optional when the question is a single line.
pub struct QuestionTextParser {
    block_start: Regex,
    choice: Regex,
    answer: Regex,
    explanation: Regex,
}

impl QuestionTextParser {
    pub fn new() -> Result<Self, ImportError> {
        Ok(Self {
            block_start: Regex::new(r"^Q(\d+):\s*(.*)$")?,
            choice: Regex::new(r"^([A-D])[.)]\s*(.*)$")?,
            answer: Regex::new(r"(?i)correct answer:\s*\(?([a-d])\b")?,
            explanation: Regex::new(r"(?i)^explanation:\s*(.*)$")?,
        })
    }

    pub fn parse(&self, text: &str) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let mut difficulty = None;
        let mut block: Option<Block<'_>> = None;

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(header) = difficulty_header(line) {
                difficulty = Some(header);
                continue;
            }
            if let Some(caps) = self.block_start.captures(line) {
                if let Some(done) = block.take() {
                    self.finish_block(done, &mut outcome);
                }
                let mut lines = Vec::new();
                if let Some(rest) = caps.get(2).map(|m| m.as_str()).filter(|s| !s.is_empty()) {
                    lines.push(rest);
                }
                block = Some(Block {
                    label: format!("Q{}", &caps[1]),
                    difficulty,
                    lines,
                });
                continue;
            }
            if let Some(open) = block.as_mut() {
                open.lines.push(line);
            }
        }
        if let Some(done) = block.take() {
            self.finish_block(done, &mut outcome);
        }
        outcome
    }

    fn finish_block(&self, block: Block<'_>, outcome: &mut ParseOutcome) {
        let label = block.label.clone();
        match self.parse_block(block) {
            Ok(question) => outcome.questions.push(question),
            Err(reason) => {
                warn!(block = %label, reason, "skipping question block");
                outcome.skipped.push(SkippedBlock { label, reason });
            }
        }
    }

    fn parse_block(&self, block: Block<'_>) -> Result<ParsedQuestion, &'static str> {
        let difficulty = block.difficulty.ok_or("no difficulty header before it")?;
        let lines = &block.lines;

        let (stem, rest) = match lines.iter().position(|l| l.contains(CHOICE_MARKER)) {
            Some(i) => (&lines[..i], &lines[i + 1..]),
            None => {
                let i = lines
                    .iter()
                    .position(|l| self.choice.is_match(l))
                    .unwrap_or(lines.len());
                (&lines[..i], &lines[i..])
            }
        };
        let (passage, prompt) = match stem {
            [] => return Err("no question text"),
            [only] => (None, only.to_string()),
            [first, rest @ ..] => (Some(first.to_string()), rest.join(" ")),
        };

        let choices: Vec<String> = rest
            .iter()
            .map_while(|l| self.choice.captures(l))
            .map(|caps| caps[2].trim().to_string())
            .collect();
        if choices.len() < 2 {
            return Err("fewer than two choices");
        }

        let mut answer = None;
        let mut explanation: Vec<&str> = Vec::new();
        let mut in_explanation = false;
        for &line in &rest[choices.len()..] {
            if let Some(caps) = self.answer.captures(line) {
                answer = caps[1]
                    .chars()
                    .next()
                    .map(|c| (c.to_ascii_uppercase() as u8 - b'A') as usize);
                in_explanation = false;
            } else if let Some(caps) = self.explanation.captures(line) {
                in_explanation = true;
                let first = caps.get(1).map_or("", |m| m.as_str()).trim();
                if !first.is_empty() {
                    explanation.push(first);
                }
            } else if in_explanation && !self.choice.is_match(line) {
                explanation.push(line);
            }
        }
        let answer = answer.ok_or("no correct answer")?;
        if answer >= choices.len() {
            return Err("correct answer is not one of the choices");
        }

        Ok(ParsedQuestion {
            label: block.label,
            difficulty,
            passage,
            prompt,
            choices,
            answer,
            explanation: (!explanation.is_empty()).then(|| explanation.join(" ")),
        })
    }
}

fn difficulty_header(line: &str) -> Option<Difficulty> {
    line.strip_suffix(':').and_then(Difficulty::from_key)
}

fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Where imported questions land in the bank.
pub struct ImportTarget<'a> {
    pub section: Section,
    pub domain: &'a str,
    pub subunit: &'a str,
}

impl ImportTarget<'_> {
    pub fn validate(&self) -> Result<(), ImportError> {
        if find_domain(self.domain).is_none_or(|d| d.section != self.section) {
            return Err(ImportError::UnknownDomain {
                section: self.section,
                domain: self.domain.to_string(),
            });
        }
        if slug(self.subunit).is_empty() {
            return Err(ImportError::EmptySubunit);
        }
        Ok(())
    }
}

/// Add parsed questions to `bank` under `target`, giving each an id not
/// already in the bank. Returns the number added.
pub fn append_to_bank(
    bank: &mut QuestionBankFile,
    parsed: Vec<ParsedQuestion>,
    target: &ImportTarget<'_>,
) -> Result<usize, ImportError> {
    target.validate()?;
    let subunit = slug(target.subunit);
    let mut taken: HashSet<String> = bank.questions.iter().map(|q| q.id.clone()).collect();
    let mut n = 0;
    let added = parsed.len();
    for p in parsed {
        let id = loop {
            n += 1;
            let candidate = format!("{}-{subunit}-{n:04}", target.domain);
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        taken.insert(id.clone());
        bank.questions.push(Question {
            id,
            section: target.section,
            domain: target.domain.to_string(),
            subunit: subunit.clone(),
            difficulty: p.difficulty,
            prompt: p.prompt,
            passage: p.passage,
            choices: p.choices,
            answer: p.answer,
            explanation: p.explanation,
        });
    }
    Ok(added)
}

/// A missing file is an empty bank.
pub fn read_bank_file(path: &Path) -> Result<QuestionBankFile, BankError> {
    if !path.exists() {
        return Ok(QuestionBankFile::default());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn write_bank_file(path: &Path, bank: &QuestionBankFile) -> Result<(), BankError> {
    let json = serde_json::to_string_pretty(bank)?;
    let tmp_path = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    debug!(path = %path.display(), count = bank.questions.len(), "wrote question bank");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::repository::InMemoryRepository;

    const SAMPLE: &str = "
Easy:
Q1:
The committee postponed its vote until more data arrived.
Which choice best states the main idea of the text?
Choose 1 answer:
A. The committee rejected the proposal.
B. The committee delayed a decision.
C. The data was incomplete.
D. The vote was unanimous.
Correct Answer: B
Explanation: The text says the vote was postponed,
so the decision was delayed.

Q2:
Which word is closest in meaning to \"rapid\"?
Choose 1 answer:
A. slow
B. quick
Correct Answer: b
Explanation: Rapid means quick.

Hard:
Q3:
A passage without an answer line.
What is missing?
Choose 1 answer:
A. one
B. two
Explanation: There is no correct answer given.

Q4:
Pick one.
Choose 1 answer:
A. yes
B. no
Correct Answer: C
";

    fn parser() -> QuestionTextParser {
        QuestionTextParser::new().unwrap()
    }

    #[test]
    fn test_parses_passage_prompt_choices_and_explanation() {
        let outcome = parser().parse(SAMPLE);
        assert_eq!(outcome.questions.len(), 2);

        let q1 = &outcome.questions[0];
        assert_eq!(q1.label, "Q1");
        assert_eq!(q1.difficulty, Difficulty::Easy);
        assert_eq!(
            q1.passage.as_deref(),
            Some("The committee postponed its vote until more data arrived.")
        );
        assert_eq!(q1.prompt, "Which choice best states the main idea of the text?");
        assert_eq!(q1.choices.len(), 4);
        assert_eq!(q1.choices[1], "The committee delayed a decision.");
        assert_eq!(q1.answer, 1);
        assert_eq!(
            q1.explanation.as_deref(),
            Some("The text says the vote was postponed, so the decision was delayed.")
        );

        let q2 = &outcome.questions[1];
        assert!(q2.passage.is_none());
        assert_eq!(q2.answer, 1);
    }

    #[test]
    fn test_reports_unusable_blocks() {
        let outcome = parser().parse(SAMPLE);
        assert_eq!(
            outcome.skipped,
            vec![
                SkippedBlock {
                    label: "Q3".to_string(),
                    reason: "no correct answer"
                },
                SkippedBlock {
                    label: "Q4".to_string(),
                    reason: "correct answer is not one of the choices"
                },
            ]
        );
    }

    #[test]
    fn test_block_before_any_header_is_skipped() {
        let outcome = parser().parse("Q1:\nWhat?\nA. x\nB. y\nCorrect Answer: A\n");
        assert!(outcome.questions.is_empty());
        assert_eq!(outcome.skipped[0].reason, "no difficulty header before it");
    }

    #[test]
    fn test_header_applies_to_following_blocks_only() {
        let text = "Medium:\nQ1:\nFirst?\nA. a\nB. b\nCorrect Answer: A\nHard:\nQ2:\nSecond?\nA. a\nB. b\nCorrect Answer: B\n";
        let outcome = parser().parse(text);
        let levels: Vec<Difficulty> = outcome.questions.iter().map(|q| q.difficulty).collect();
        assert_eq!(levels, vec![Difficulty::Medium, Difficulty::Hard]);
    }

    #[test]
    fn test_append_assigns_fresh_ids() {
        let outcome = parser().parse(SAMPLE);
        let target = ImportTarget {
            section: Section::Reading,
            domain: "information-ideas",
            subunit: "Central Ideas",
        };
        let mut bank = QuestionBankFile::default();
        assert_eq!(append_to_bank(&mut bank, outcome.questions.clone(), &target).unwrap(), 2);
        assert_eq!(append_to_bank(&mut bank, outcome.questions, &target).unwrap(), 2);

        let ids: Vec<&str> = bank.questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids[0], "information-ideas-central-ideas-0001");
        assert_eq!(ids[3], "information-ideas-central-ideas-0004");
        assert_eq!(bank.questions[0].subunit, "central-ideas");
        assert!(InMemoryRepository::new(bank.questions).is_ok());
    }

    #[test]
    fn test_domain_must_belong_to_section() {
        let target = ImportTarget {
            section: Section::Math,
            domain: "craft-structure",
            subunit: "words",
        };
        assert!(matches!(target.validate(), Err(ImportError::UnknownDomain { .. })));
        let target = ImportTarget {
            section: Section::Math,
            domain: "algebra",
            subunit: " - ",
        };
        assert!(matches!(target.validate(), Err(ImportError::EmptySubunit)));
    }

    #[test]
    fn test_bank_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bank.json");
        assert!(read_bank_file(&path).unwrap().questions.is_empty());

        let mut bank = QuestionBankFile::default();
        let target = ImportTarget {
            section: Section::Reading,
            domain: "information-ideas",
            subunit: "inference",
        };
        append_to_bank(&mut bank, parser().parse(SAMPLE).questions, &target).unwrap();
        write_bank_file(&path, &bank).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(InMemoryRepository::load(&path).unwrap().len(), 2);
    }
}
