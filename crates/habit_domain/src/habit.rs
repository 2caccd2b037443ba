use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HabitError, Result};

pub const MAX_TITLE_LEN: usize = 255;

/// Habit row as returned by create calls. Carries no statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Habit {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Habit enriched with streak and completion state for a reference date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HabitWithStats {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub streak_count: u32,
    #[serde(default)]
    pub completed_today: bool,
}

impl From<Habit> for HabitWithStats {
    fn from(habit: Habit) -> Self {
        Self {
            id: habit.id,
            title: habit.title,
            created_at: habit.created_at,
            streak_count: 0,
            completed_today: false,
        }
    }
}

impl HabitWithStats {
    /// Flip today's completion and move the streak with it.
    pub(crate) fn toggle_completion(&mut self) {
        if self.completed_today {
            self.completed_today = false;
            self.streak_count = self.streak_count.saturating_sub(1);
        } else {
            self.completed_today = true;
            self.streak_count += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
}

impl Progress {
    pub fn of(habits: &[HabitWithStats]) -> Self {
        Self {
            total: habits.len(),
            completed: habits.iter().filter(|habit| habit.completed_today).count(),
        }
    }
}

/// Trim a user-supplied title and check it against the server's limits.
pub fn normalize_title(raw: &str) -> Result<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(HabitError::validation("title is required"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(HabitError::validation(format!(
            "title must be {MAX_TITLE_LEN} characters or less"
        )));
    }
    Ok(title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(completed_today: bool, streak_count: u32) -> HabitWithStats {
        HabitWithStats {
            id: "1".into(),
            title: "Read".into(),
            created_at: Utc::now(),
            streak_count,
            completed_today,
        }
    }

    #[test]
    fn decodes_rpc_rows() {
        let raw = r#"[
            {"id": "a1", "title": "Stretch", "created_at": "2025-01-02T08:00:00Z",
             "streak_count": 4, "completed_today": true},
            {"id": "b2", "title": "Journal", "created_at": "2025-01-03T08:00:00+00:00"}
        ]"#;
        let habits: Vec<HabitWithStats> = serde_json::from_str(raw).unwrap();
        assert_eq!(habits.len(), 2);
        assert_eq!(habits[0].streak_count, 4);
        assert!(habits[0].completed_today);
        assert_eq!(habits[1].streak_count, 0);
        assert!(!habits[1].completed_today);
    }

    #[test]
    fn created_habit_starts_without_stats() {
        let habit = Habit {
            id: "2".into(),
            title: "New Habit".into(),
            created_at: Utc::now(),
        };
        let with_stats = HabitWithStats::from(habit);
        assert_eq!(with_stats.title, "New Habit");
        assert_eq!(with_stats.streak_count, 0);
        assert!(!with_stats.completed_today);
    }

    #[test]
    fn toggling_moves_streak_and_floors_at_zero() {
        let mut habit = sample(false, 0);
        habit.toggle_completion();
        assert!(habit.completed_today);
        assert_eq!(habit.streak_count, 1);
        habit.toggle_completion();
        assert!(!habit.completed_today);
        assert_eq!(habit.streak_count, 0);

        let mut inconsistent = sample(true, 0);
        inconsistent.toggle_completion();
        assert_eq!(inconsistent.streak_count, 0);
    }

    #[test]
    fn progress_counts_completed_entries() {
        let habits = vec![sample(true, 3), sample(false, 0), sample(true, 1)];
        assert_eq!(
            Progress::of(&habits),
            Progress {
                total: 3,
                completed: 2
            }
        );
    }

    #[test]
    fn titles_are_trimmed_and_bounded() {
        assert_eq!(normalize_title("  Walk  ").unwrap(), "Walk");
        assert!(matches!(
            normalize_title("   "),
            Err(HabitError::Validation(_))
        ));
        let long = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(normalize_title(&long).is_err());
        assert!(normalize_title(&"x".repeat(MAX_TITLE_LEN)).is_ok());
    }
}
