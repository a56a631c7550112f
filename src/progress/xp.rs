use crate::session::result::TestKind;

pub const XP_PER_ANSWER: u32 = 10;
pub const XP_PER_CORRECT: u32 = 5;
pub const XP_PRACTICE_SET: u32 = 50;
pub const XP_FULL_TEST: u32 = 100;
pub const XP_STREAK_BONUS: u32 = 25;
pub const XP_PER_LEVEL: u32 = 500;

/// Streak length (in days) from which each new day earns the bonus.
pub const STREAK_BONUS_MIN_DAYS: u32 = 3;

const BADGES: &[(u32, &str)] = &[
    (1, "SAT Rookie"),
    (3, "SAT Explorer"),
    (5, "SAT Warrior"),
    (8, "SAT Master"),
    (12, "SAT Legend"),
    (15, "SAT Champion"),
];

pub fn xp_for_result(total_questions: u32, correct_answers: u32, kind: TestKind) -> u32 {
    let completion = match kind {
        TestKind::Full => XP_FULL_TEST,
        TestKind::Sectional | TestKind::Daily => XP_PRACTICE_SET,
    };
    total_questions * XP_PER_ANSWER + correct_answers.min(total_questions) * XP_PER_CORRECT + completion
}

pub fn streak_bonus(streak_days: u32) -> u32 {
    if streak_days >= STREAK_BONUS_MIN_DAYS {
        XP_STREAK_BONUS
    } else {
        0
    }
}

pub fn level_from_xp(total_xp: u32) -> u32 {
    total_xp / XP_PER_LEVEL + 1
}

/// XP earned inside the current level.
pub fn level_progress(total_xp: u32) -> u32 {
    total_xp % XP_PER_LEVEL
}

/// Total XP at which the next level starts.
pub fn next_level_xp(total_xp: u32) -> u32 {
    level_from_xp(total_xp) * XP_PER_LEVEL
}

pub fn badge_for_level(level: u32) -> &'static str {
    BADGES
        .iter()
        .rev()
        .find(|(min, _)| level >= *min)
        .map_or(BADGES[0].1, |(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xp_rules() {
        // 10 answered, 7 correct, practice set
        assert_eq!(xp_for_result(10, 7, TestKind::Sectional), 100 + 35 + 50);
        assert_eq!(xp_for_result(98, 80, TestKind::Full), 980 + 400 + 100);
        assert_eq!(xp_for_result(5, 5, TestKind::Daily), 50 + 25 + 50);
    }

    #[test]
    fn test_correct_capped_at_total() {
        assert_eq!(xp_for_result(2, 9, TestKind::Daily), xp_for_result(2, 2, TestKind::Daily));
    }

    #[test]
    fn test_level_starts_at_one() {
        assert_eq!(level_from_xp(0), 1);
        assert_eq!(level_from_xp(499), 1);
        assert_eq!(level_from_xp(500), 2);
    }

    #[test]
    fn test_level_progress_and_next() {
        assert_eq!(level_progress(1240), 240);
        assert_eq!(next_level_xp(1240), 1500);
    }

    #[test]
    fn test_badges_by_level() {
        assert_eq!(badge_for_level(1), "SAT Rookie");
        assert_eq!(badge_for_level(2), "SAT Rookie");
        assert_eq!(badge_for_level(3), "SAT Explorer");
        assert_eq!(badge_for_level(11), "SAT Master");
        assert_eq!(badge_for_level(40), "SAT Champion");
    }

    #[test]
    fn test_streak_bonus_from_third_day() {
        assert_eq!(streak_bonus(2), 0);
        assert_eq!(streak_bonus(3), XP_STREAK_BONUS);
    }
}
