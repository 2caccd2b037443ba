use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::{
    api::HabitApi,
    date,
    error::{HabitError, Result},
    habit::{normalize_title, HabitWithStats, Progress},
    optimistic,
    single_flight::InFlight,
};

/// Message shown when the habit list cannot be fetched.
pub const LOAD_ERROR_MESSAGE: &str = "Failed to load habits";

/// Point-in-time copy of everything the store exposes.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub habits: Vec<HabitWithStats>,
    pub loading: bool,
    pub error: Option<String>,
    pub logical_date: NaiveDate,
    pub date_key: String,
    pub progress: Progress,
}

#[derive(Debug)]
struct StoreState {
    habits: Vec<HabitWithStats>,
    loading: bool,
    error: Option<String>,
    logical_date: NaiveDate,
    load_generation: u64,
    /// Bumped whenever a load replaces `habits`.
    collection_epoch: u64,
}

impl StoreState {
    fn new(logical_date: NaiveDate) -> Self {
        Self {
            habits: Vec::new(),
            loading: false,
            error: None,
            logical_date,
            load_generation: 0,
            collection_epoch: 0,
        }
    }

    fn date_key(&self) -> String {
        date::format_logical_date(self.logical_date)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut HabitWithStats> {
        self.habits.iter_mut().find(|habit| habit.id == id)
    }

    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            habits: self.habits.clone(),
            loading: self.loading,
            error: self.error.clone(),
            logical_date: self.logical_date,
            date_key: self.date_key(),
            progress: Progress::of(&self.habits),
        }
    }
}

/// Pre-toggle completion state of one habit, tied to the collection it was
/// taken from.
#[derive(Debug, Clone)]
struct CompletionSnapshot {
    id: String,
    date_key: String,
    collection_epoch: u64,
    completed_today: bool,
    streak_count: u32,
}

impl CompletionSnapshot {
    fn capture(state: &StoreState, id: &str) -> Option<Self> {
        let habit = state.habits.iter().find(|habit| habit.id == id)?;
        Some(Self {
            id: habit.id.clone(),
            date_key: state.date_key(),
            collection_epoch: state.collection_epoch,
            completed_today: habit.completed_today,
            streak_count: habit.streak_count,
        })
    }

    /// Put the recorded values back, unless a load has replaced the
    /// collection since the capture: the fresh server data wins.
    fn restore(self, state: &mut StoreState) {
        if state.collection_epoch != self.collection_epoch {
            debug!(
                habit_id = %self.id,
                date_key = %self.date_key,
                "skipping rollback onto reloaded habits"
            );
            return;
        }
        if let Some(habit) = state.find_mut(&self.id) {
            habit.completed_today = self.completed_today;
            habit.streak_count = self.streak_count;
        }
    }
}

/// In-memory cache of the user's habits for one logical date, kept in step
/// with a remote [`HabitApi`].
///
/// Every state change is broadcast to [`HabitStore::subscribe`] receivers.
/// Locks are never held across a remote call, so operations on different
/// habits may run concurrently; toggles of the same habit are single-flight.
pub struct HabitStore {
    api: Arc<dyn HabitApi>,
    state: RwLock<StoreState>,
    toggles: InFlight,
    updates: watch::Sender<StoreSnapshot>,
}

impl HabitStore {
    /// Empty store positioned on the current logical date.
    pub fn new(api: Arc<dyn HabitApi>) -> Self {
        Self::with_logical_date(api, date::current_logical_date())
    }

    pub fn with_logical_date(api: Arc<dyn HabitApi>, logical_date: NaiveDate) -> Self {
        let state = StoreState::new(logical_date);
        let (updates, _) = watch::channel(state.snapshot());
        Self {
            api,
            state: RwLock::new(state),
            toggles: InFlight::new(),
            updates,
        }
    }

    pub fn habits(&self) -> Vec<HabitWithStats> {
        self.state.read().habits.clone()
    }

    pub fn habit(&self, id: &str) -> Option<HabitWithStats> {
        self.state
            .read()
            .habits
            .iter()
            .find(|habit| habit.id == id)
            .cloned()
    }

    pub fn loading(&self) -> bool {
        self.state.read().loading
    }

    pub fn error(&self) -> Option<String> {
        self.state.read().error.clone()
    }

    pub fn logical_date(&self) -> NaiveDate {
        self.state.read().logical_date
    }

    pub fn date_key(&self) -> String {
        self.state.read().date_key()
    }

    pub fn progress(&self) -> Progress {
        Progress::of(&self.state.read().habits)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.read().snapshot()
    }

    /// Receiver that sees a fresh snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.updates.subscribe()
    }

    /// Replace the collection with the server's view of the current date.
    ///
    /// Failures never reach the caller: they are logged and surface as
    /// [`LOAD_ERROR_MESSAGE`] in [`HabitStore::error`], leaving the existing
    /// habits in place. When loads overlap only the latest one applies.
    pub async fn load(&self) {
        let (generation, date_key) = self.mutate(|state| {
            state.load_generation += 1;
            state.loading = true;
            state.error = None;
            (state.load_generation, state.date_key())
        });
        debug!(%date_key, "loading habits");

        let result = self.api.fetch_habits_with_stats(&date_key).await;
        if let Err(err) = &result {
            error!(error = %err, %date_key, "failed to load habits");
        }

        self.mutate(|state| {
            if state.load_generation != generation {
                debug!(%date_key, "dropping superseded habit load");
                return;
            }
            state.loading = false;
            match result {
                Ok(habits) => {
                    state.habits = habits;
                    state.collection_epoch += 1;
                }
                Err(_) => state.error = Some(LOAD_ERROR_MESSAGE.to_string()),
            }
        });
    }

    /// Create a habit and append it with empty statistics.
    pub async fn add(&self, title: &str) -> Result<HabitWithStats> {
        let title = normalize_title(title).inspect_err(|err| {
            warn!(error = %err, "rejected habit title");
        })?;
        let created = self
            .api
            .create_habit(&title)
            .await
            .inspect_err(|err| error!(error = %err, "failed to create habit"))?;

        let entry = HabitWithStats::from(created);
        debug!(habit_id = %entry.id, "habit created");
        self.mutate(|state| state.habits.push(entry.clone()));
        Ok(entry)
    }

    /// Rename a habit once the server has accepted the new title.
    pub async fn update(&self, id: &str, title: &str) -> Result<()> {
        let title = normalize_title(title).inspect_err(|err| {
            warn!(error = %err, habit_id = %id, "rejected habit title");
        })?;
        self.api
            .update_habit_title(id, &title)
            .await
            .inspect_err(|err| error!(error = %err, habit_id = %id, "failed to update habit"))?;

        self.mutate(|state| {
            if let Some(habit) = state.find_mut(id) {
                habit.title = title;
            }
        });
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.api
            .delete_habit(id)
            .await
            .inspect_err(|err| error!(error = %err, habit_id = %id, "failed to delete habit"))?;

        self.mutate(|state| state.habits.retain(|habit| habit.id != id));
        Ok(())
    }

    /// Flip today's completion of `id` before the server confirms it.
    ///
    /// The completion flag and streak are updated immediately; if the remote
    /// call fails both are restored to their pre-toggle values and the error
    /// is returned. Unknown ids are ignored. A second toggle of the same id
    /// while the first is outstanding fails with
    /// [`HabitError::ToggleInFlight`] and changes nothing.
    pub async fn toggle(&self, id: &str) -> Result<()> {
        let Some(_in_flight) = self.toggles.try_acquire(id) else {
            warn!(habit_id = %id, "toggle already in flight");
            return Err(HabitError::ToggleInFlight { id: id.to_string() });
        };

        let api = &self.api;
        let outcome = optimistic::run_optimistic(
            &self.state,
            |state: &mut StoreState| {
                let snapshot = CompletionSnapshot::capture(state, id)?;
                state.find_mut(id)?.toggle_completion();
                Some(snapshot)
            },
            |snapshot: &CompletionSnapshot| {
                let date_key = snapshot.date_key.clone();
                let was_completed = snapshot.completed_today;
                async move { api.set_completion(id, &date_key, was_completed).await }
            },
            |state: &mut StoreState, snapshot: CompletionSnapshot| snapshot.restore(state),
            |state: &StoreState| self.publish(state),
        )
        .await;

        match outcome {
            None => {
                debug!(habit_id = %id, "toggle ignored for unknown habit");
                Ok(())
            }
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => {
                error!(error = %err, habit_id = %id, "failed to toggle habit, reverted");
                Err(err)
            }
        }
    }

    /// Move to another logical date and reload.
    ///
    /// The date changes as soon as this is called, but the reload only runs
    /// when the returned future is polled. Dropping the future leaves the
    /// new date showing the previous date's habits. Callers that cannot
    /// await should use [`HabitStore::spawn_set_date`] instead.
    pub fn set_date(&self, date: NaiveDate) -> impl Future<Output = ()> + Send + '_ {
        self.set_logical_date(date);
        self.load()
    }

    /// Move to another logical date and reload on the tokio runtime.
    ///
    /// Must be called from within a runtime. The handle resolves once the
    /// reload has finished; its outcome is visible through the store state.
    pub fn spawn_set_date(self: &Arc<Self>, date: NaiveDate) -> JoinHandle<()> {
        self.set_logical_date(date);
        let store = Arc::clone(self);
        tokio::spawn(async move { store.load().await })
    }

    fn set_logical_date(&self, date: NaiveDate) {
        debug!(date = %date::format_logical_date(date), "switching logical date");
        self.mutate(|state| state.logical_date = date);
    }

    fn mutate<R>(&self, change: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut state = self.state.write();
        let out = change(&mut *state);
        self.publish(&*state);
        out
    }

    fn publish(&self, state: &StoreState) {
        self.updates.send_replace(state.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: &str, completed_today: bool, streak_count: u32) -> HabitWithStats {
        HabitWithStats {
            id: id.into(),
            title: format!("habit {id}"),
            created_at: Utc::now(),
            streak_count,
            completed_today,
        }
    }

    #[test]
    fn snapshot_restore_targets_matching_id_only() {
        let mut state = StoreState::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        state.habits = vec![entry("a", true, 3), entry("b", false, 0)];
        let snapshot = CompletionSnapshot::capture(&state, "a").unwrap();
        assert_eq!(snapshot.date_key, "2024-03-01");

        state.habits[0].toggle_completion();
        state.habits[1].toggle_completion();
        snapshot.restore(&mut state);

        assert!(state.habits[0].completed_today);
        assert_eq!(state.habits[0].streak_count, 3);
        assert!(state.habits[1].completed_today);
        assert_eq!(state.habits[1].streak_count, 1);
    }

    #[test]
    fn restore_after_removal_is_a_no_op() {
        let mut state = StoreState::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        state.habits = vec![entry("a", false, 0)];
        let snapshot = CompletionSnapshot::capture(&state, "a").unwrap();
        state.habits.clear();
        snapshot.restore(&mut state);
        assert!(state.habits.is_empty());
        assert!(CompletionSnapshot::capture(&state, "a").is_none());
    }

    #[test]
    fn restore_skips_replaced_collection() {
        let mut state = StoreState::new(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        state.habits = vec![entry("a", false, 0)];
        let snapshot = CompletionSnapshot::capture(&state, "a").unwrap();
        state.habits[0].toggle_completion();

        state.habits = vec![entry("a", true, 7)];
        state.collection_epoch += 1;
        snapshot.restore(&mut state);

        assert!(state.habits[0].completed_today);
        assert_eq!(state.habits[0].streak_count, 7);
    }

    #[test]
    fn state_snapshot_derives_key_and_progress() {
        let mut state = StoreState::new(NaiveDate::from_ymd_opt(2024, 1, 9).unwrap());
        state.habits = vec![entry("a", true, 1), entry("b", false, 0)];
        let snapshot = state.snapshot();
        assert_eq!(snapshot.date_key, "2024-01-09");
        assert_eq!(snapshot.progress.total, 2);
        assert_eq!(snapshot.progress.completed, 1);
    }
}
