use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use satprep::app::{App, PracticeSet};
use satprep::bank::import::{ImportTarget, QuestionTextParser, append_to_bank, read_bank_file, write_bank_file};
use satprep::bank::question::Question;
use satprep::bank::repository::InMemoryRepository;
use satprep::bank::selection::PracticeRequest;
use satprep::config::{Config, MAX_PRACTICE_QUESTIONS};
use satprep::engine::adaptive::Difficulty;
use satprep::engine::section::Section;
use satprep::progress::diagnostics::{DiagnosticReport, diagnose};
use satprep::progress::stats;
use satprep::session::attempt::{FullTestAttempt, FullTestPhase, SectionAttempt};
use satprep::session::full_test::{FullTestRun, ModuleOutcome};
use satprep::session::module::format_clock;
use satprep::store::schema::ExportData;

#[derive(Parser)]
#[command(name = "satprep", version, about = "Terminal SAT practice with adaptive module scoring")]
struct Cli {
    #[arg(long, global = true, help = "Data directory (overrides config)")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score a full test from raw module counts
    Score {
        #[arg(long, num_args = 2, value_names = ["M1", "M2"], required = true)]
        reading: Vec<u32>,
        #[arg(long, num_args = 2, value_names = ["M1", "M2"], required = true)]
        math: Vec<u32>,
        #[arg(long, help = "Save the result to history")]
        record: bool,
    },
    /// Take a timed adaptive full test from the question bank
    Test {
        #[arg(long, help = "Question bank JSON (overrides config)")]
        bank: Option<PathBuf>,
    },
    /// Answer a sectional practice set from the question bank
    Practice {
        #[arg(long, value_parser = parse_section)]
        section: Section,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        subunit: Option<String>,
        #[arg(long, value_parser = parse_difficulty)]
        difficulty: Option<Difficulty>,
        #[arg(long)]
        count: Option<usize>,
        #[arg(long, help = "Question bank JSON (overrides config)")]
        bank: Option<PathBuf>,
    },
    /// Five mixed questions, once a day
    Daily {
        #[arg(long, help = "Question bank JSON (overrides config)")]
        bank: Option<PathBuf>,
    },
    /// Show level, streak and accuracy
    Stats,
    /// Write all saved data to a JSON file
    Export { path: PathBuf },
    /// Replace saved data and settings with an exported JSON file
    Import { path: PathBuf },
    /// Add questions written in the plain-text format to a question bank
    ImportQuestions {
        text: PathBuf,
        #[arg(long, value_parser = parse_section)]
        section: Section,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        subunit: String,
        #[arg(long, help = "Question bank JSON to add to (overrides config)")]
        bank: Option<PathBuf>,
    },
}

fn parse_section(s: &str) -> Result<Section, String> {
    Section::from_key(s).ok_or_else(|| format!("unknown section '{s}' (reading, math)"))
}

fn parse_difficulty(s: &str) -> Result<Difficulty, String> {
    Difficulty::from_key(s).ok_or_else(|| format!("unknown difficulty '{s}' (easy, medium, hard)"))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env("SATPREP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

fn practice_count(requested: Option<usize>, config: &Config) -> usize {
    requested
        .unwrap_or(config.practice_question_count)
        .clamp(1, MAX_PRACTICE_QUESTIONS)
}

fn bank_path(flag: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    match flag.or_else(|| config.question_bank.as_ref().map(PathBuf::from)) {
        Some(path) => Ok(path),
        None => bail!("no question bank configured; pass --bank or set question_bank in config.toml"),
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "config unreadable, using defaults");
        Config::default()
    });
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir.to_string_lossy().to_string();
    }

    match cli.command {
        Command::Score {
            reading,
            math,
            record,
        } => score(config, (reading[0], reading[1]), (math[0], math[1]), record),
        Command::Test { bank } => {
            let bank = bank_path(bank, &config)?;
            full_test(config, &bank)
        }
        Command::Practice {
            section,
            domain,
            subunit,
            difficulty,
            count,
            bank,
        } => {
            let request = PracticeRequest {
                section,
                domain: domain.as_deref(),
                subunit: subunit.as_deref(),
                difficulty: Some(difficulty.unwrap_or(config.practice_difficulty)),
                count: practice_count(count, &config),
            };
            let bank = bank_path(bank, &config)?;
            practice(config, &request, &bank)
        }
        Command::Daily { bank } => {
            let bank = bank_path(bank, &config)?;
            daily(config, &bank)
        }
        Command::Stats => show_stats(config),
        Command::Export { path } => {
            let app = App::open(config)?;
            let data = app.store.export_all(&app.config);
            fs::write(&path, serde_json::to_string_pretty(&data)?)
                .with_context(|| format!("cannot write {}", path.display()))?;
            println!("Exported {} results to {}", data.history.results.len(), path.display());
            Ok(())
        }
        Command::Import { path } => {
            let content = fs::read_to_string(&path).with_context(|| format!("cannot read {}", path.display()))?;
            let data: ExportData = serde_json::from_str(&content)?;
            let mut app = App::open(config)?;
            app.import_data(&data)?;

            let mut saved = Config::load()?;
            saved.apply_imported(&data.config);
            saved.save()?;
            println!("Imported {} results and settings", data.history.results.len());
            Ok(())
        }
        Command::ImportQuestions {
            text,
            section,
            domain,
            subunit,
            bank,
        } => {
            let target = ImportTarget {
                section,
                domain: &domain,
                subunit: &subunit,
            };
            let bank = bank_path(bank, &config)?;
            import_questions(&text, &target, &bank)
        }
    }
}

fn print_section(attempt: &SectionAttempt) {
    let section = attempt.section();
    let size = section.config().module_size;
    println!("{}", section.display_name());
    if let Some(m1) = attempt.module_one() {
        println!("  Module 1: {}/{size}", m1.raw_score());
    }
    if let Some(pool) = attempt.pool() {
        println!("  Module 2 pool: {} ({}/{})", pool.label(), pool.primary.to_key(), pool.secondary.to_key());
    }
    if let Some(m2) = attempt.module_two() {
        println!("  Module 2: {}/{size}", m2.raw_score());
    }
    if let Some(scaled) = attempt.scaled() {
        println!("  Section score: {}", scaled.value());
    }
}

fn score(config: Config, reading: (u32, u32), math: (u32, u32), record: bool) -> Result<()> {
    let (attempt, composite, recorded) = if record {
        let mut app = App::open(config)?;
        let report = app.record_full_test(reading, math)?;
        (report.attempt, report.composite, Some((report.session_id, report.xp_earned)))
    } else {
        let attempt = FullTestAttempt::run(reading, math)?;
        let composite = attempt.composite()?;
        (attempt, composite, None)
    };

    print_section(attempt.reading());
    print_section(attempt.math());
    let (low, high) = composite.range();
    println!("Total: {} (range {low}-{high})", composite.value());
    if let Some((session_id, xp)) = recorded {
        println!("Recorded as {session_id}, +{xp} XP");
    }
    Ok(())
}

fn parse_choice(line: &str, choices: usize) -> Option<usize> {
    let c = line.trim().chars().next()?.to_ascii_uppercase();
    let idx = (c as usize).checked_sub('A' as usize)?;
    (idx < choices).then_some(idx)
}

#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Choice(usize),
    Flag,
    Skip,
}

fn parse_reply(line: &str, choices: usize) -> Reply {
    if line.trim() == "?" {
        return Reply::Flag;
    }
    parse_choice(line, choices).map_or(Reply::Skip, Reply::Choice)
}

fn show(question: &Question, number: usize) {
    println!();
    if let Some(passage) = &question.passage {
        println!("{passage}\n");
    }
    println!("{number}. {}", question.prompt);
    for (i, choice) in question.choices.iter().enumerate() {
        println!("   {}) {choice}", (b'A' + i as u8) as char);
    }
}

fn read_reply(input: &mut impl BufRead) -> Result<String> {
    print!("> ");
    io::stdout().flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line)
}

fn confirm(prompt: &str, input: &mut impl BufRead) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case("y"))
}

/// Work through the module in progress until the student is done or the
/// clock runs out. `?` flags a question for review.
fn take_module(run: &mut FullTestRun, input: &mut impl BufRead) -> Result<()> {
    let questions = run.questions().to_vec();
    let Some(sheet) = run.sheet_mut() else {
        return Ok(());
    };
    println!(
        "\n{} Module {}: {} questions, {}",
        sheet.section.display_name(),
        sheet.module_number,
        sheet.len(),
        format_clock(sheet.time_limit)
    );
    println!("Answer with a letter, ? to flag, Enter to skip.");

    let mut order: Vec<usize> = (0..questions.len()).collect();
    loop {
        for &i in &order {
            let now = Instant::now();
            if sheet.is_expired(now) {
                println!("\nTime is up.");
                return Ok(());
            }
            sheet.cursor = i;
            let flag = if sheet.flagged.contains(&i) { ", flagged" } else { "" };
            println!("\n[{} left{flag}]", format_clock(sheet.remaining(now)));
            show(&questions[i], i + 1);
            match parse_reply(&read_reply(input)?, questions[i].choices.len()) {
                Reply::Choice(choice) => {
                    sheet.answer(i, choice);
                    sheet.flagged.remove(&i);
                }
                Reply::Flag => sheet.toggle_flag(i),
                Reply::Skip => {}
            }
        }
        if !sheet.needs_review() || sheet.is_expired(Instant::now()) {
            return Ok(());
        }
        let prompt = format!(
            "{} unanswered, {} flagged. Review them before submitting?",
            sheet.unanswered(),
            sheet.flagged.len()
        );
        if !confirm(&prompt, input)? {
            return Ok(());
        }
        order = (0..questions.len())
            .filter(|i| sheet.answers[*i].is_none() || sheet.flagged.contains(i))
            .collect();
    }
}

fn full_test(config: Config, bank: &Path) -> Result<()> {
    let mut repo = InMemoryRepository::load(bank)?;
    let mut app = App::open(config)?;
    let mut run = FullTestRun::start(&mut repo, Instant::now())?;
    let stdin = io::stdin();
    let mut input = stdin.lock();

    loop {
        match run.phase() {
            FullTestPhase::Complete => break,
            FullTestPhase::Break => {
                if let Some(left) = run.break_remaining(Instant::now()) {
                    println!("\nBreak: {} left. Press Enter to start Math.", format_clock(left));
                }
                let mut line = String::new();
                input.read_line(&mut line)?;
                run.end_break(&mut repo, Instant::now())?;
            }
            FullTestPhase::Reading | FullTestPhase::Math => {
                take_module(&mut run, &mut input)?;
                match run.submit_module(&mut repo, Instant::now())? {
                    ModuleOutcome::Module2Ready { raw, pool } => {
                        println!("\nModule 1: {raw} correct. Module 2 is {}.", pool.label());
                    }
                    ModuleOutcome::SectionScored { section, score } => {
                        println!("\n{} score: {}", section.display_name(), score.value());
                    }
                }
            }
        }
    }

    let report = app.record_adaptive_test(run, Instant::now())?;
    println!();
    print_section(report.attempt.reading());
    print_section(report.attempt.math());
    let (low, high) = report.composite.range();
    println!("Total: {} (range {low}-{high})", report.composite.value());
    println!(
        "+{} XP (level {}, {})",
        report.xp_earned, app.profile.level, app.profile.badge
    );
    Ok(())
}

fn answer_set(set: &PracticeSet, input: &mut impl BufRead) -> Result<Vec<Option<usize>>> {
    let mut answers = Vec::with_capacity(set.questions.len());
    for (i, question) in set.questions.iter().enumerate() {
        show(question, i + 1);
        let answer = parse_choice(&read_reply(input)?, question.choices.len());
        match answer {
            Some(a) if question.is_correct(a) => println!("Correct."),
            _ => println!("Answer: {}", (b'A' + question.answer as u8) as char),
        }
        if let Some(explanation) = &question.explanation {
            println!("{explanation}");
        }
        answers.push(answer);
    }
    Ok(answers)
}

fn print_report(report: &DiagnosticReport) {
    println!("\nOverall: {}% ({}/{})", report.percentage, report.correct, report.total);
    for (section, estimate) in &report.estimated_scores {
        println!("Estimated {}: {estimate}", section.display_name());
    }
    println!("Average time: {}s per question", report.avg_secs_per_question);
    for d in &report.domains {
        let mark = if d.strong { "  strong" } else { "" };
        println!("  {:<36} {}/{} {:>3}%{mark}", d.name, d.correct, d.total, d.percentage);
    }
    if !report.recommendations.is_empty() {
        println!("\nRecommendations:");
        for r in &report.recommendations {
            println!("  - {r}");
        }
    }
}

/// Answer a set, grade it, show the report and offer to retry misses.
fn run_set(app: &mut App, mut set: PracticeSet, input: &mut impl BufRead) -> Result<()> {
    loop {
        let started = Instant::now();
        let answers = answer_set(&set, input)?;
        let secs = started.elapsed().as_secs();
        let result = app.finish_practice(&set, &answers, secs)?;
        println!(
            "\n{}/{} correct, +{} XP (level {}, {})",
            result.correct_answers, result.total_questions, result.xp_earned, app.profile.level, app.profile.badge
        );

        let report = diagnose(&set.questions, &answers, secs);
        print_report(&report);
        if !report.has_incorrect() || !confirm("\nRetry the questions you missed?", input)? {
            return Ok(());
        }
        match app.retry_incorrect(&set, &report)? {
            Some(retry) => set = retry,
            None => return Ok(()),
        }
    }
}

fn practice(config: Config, request: &PracticeRequest<'_>, bank: &Path) -> Result<()> {
    let mut repo = InMemoryRepository::load(bank)?;
    let mut app = App::open(config)?;
    let set = app.start_practice(&mut repo, request)?;
    let stdin = io::stdin();
    run_set(&mut app, set, &mut stdin.lock())
}

fn daily(config: Config, bank: &Path) -> Result<()> {
    let mut repo = InMemoryRepository::load(bank)?;
    let mut app = App::open(config)?;
    let set = app.start_daily(&mut repo, Utc::now().date_naive())?;
    println!("Daily challenge: {} questions", set.questions.len());
    let stdin = io::stdin();
    run_set(&mut app, set, &mut stdin.lock())
}

fn import_questions(text: &Path, target: &ImportTarget<'_>, bank: &Path) -> Result<()> {
    target.validate()?;
    let content = fs::read_to_string(text).with_context(|| format!("cannot read {}", text.display()))?;
    let outcome = QuestionTextParser::new()?.parse(&content);
    for skipped in &outcome.skipped {
        println!("Skipped {}: {}", skipped.label, skipped.reason);
    }
    if outcome.questions.is_empty() {
        bail!("no complete questions found in {}", text.display());
    }

    let mut file = read_bank_file(bank)?;
    let added = append_to_bank(&mut file, outcome.questions, target)?;
    write_bank_file(bank, &file)?;
    println!(
        "Added {added} questions to {} ({} total)",
        bank.display(),
        file.questions.len()
    );
    Ok(())
}

fn show_stats(config: Config) -> Result<()> {
    let app = App::open(config)?;
    let profile = &app.profile;
    let today = Utc::now().date_naive();

    println!("{}", app.config.user_name);
    println!(
        "Level {} ({}), {}/{} XP to next level",
        profile.level,
        profile.badge,
        profile.level_progress(),
        satprep::progress::xp::XP_PER_LEVEL
    );
    println!(
        "Streak: {} days (best {})",
        profile.streak.current(today),
        profile.streak.best
    );
    if app.daily_done(today) {
        println!("Daily challenge: done for today");
    }

    let overall = stats::overall_accuracy(&app.history);
    println!(
        "Accuracy: {}% ({}/{})",
        overall.percentage, overall.total_correct, overall.total_questions
    );

    let domains = stats::domain_accuracy(&app.history);
    if !domains.is_empty() {
        println!("\nBy domain:");
        for d in domains {
            println!("  {:<36} {:>3}%", d.name, d.accuracy.percentage);
        }
    }

    let recent = stats::recent_scores(&app.history, 3);
    if !recent.is_empty() {
        println!("\nRecent full tests:");
        for s in recent {
            println!(
                "  {}  {} (R {} / M {}, range {}-{})",
                s.completed_at.format("%b %d"),
                s.total,
                s.reading.unwrap_or_default(),
                s.math.unwrap_or_default(),
                s.range.0,
                s.range.1
            );
        }
    }

    let weeks = stats::weekly_buckets(&app.history, Utc::now());
    if !weeks.is_empty() {
        println!("\nWeekly:");
        for w in weeks {
            println!(
                "  {}-{}  {:>4} attempted, {:>3}%",
                w.start.format("%m/%d"),
                w.end.format("%m/%d"),
                w.accuracy.total_questions,
                w.accuracy.percentage
            );
        }
    }
    Ok(())
}
