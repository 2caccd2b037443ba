use async_trait::async_trait;

use crate::error::Result;
use crate::habit::{Habit, HabitWithStats};

/// Remote habit service. Transport is left to the implementor.
#[async_trait]
pub trait HabitApi: Send + Sync {
    async fn fetch_habits_with_stats(&self, date_key: &str) -> Result<Vec<HabitWithStats>>;

    async fn create_habit(&self, title: &str) -> Result<Habit>;

    async fn update_habit_title(&self, id: &str, title: &str) -> Result<()>;

    async fn delete_habit(&self, id: &str) -> Result<()>;

    /// Create the completion for `date_key` when `was_completed` is false,
    /// remove it otherwise. Both directions are idempotent: a duplicate
    /// completion or an already-missing one counts as success.
    async fn set_completion(&self, id: &str, date_key: &str, was_completed: bool) -> Result<()>;
}
