use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use habit_domain::{
    date::{format_logical_date, label_relative_to, parse_logical_date},
    HabitStore, StoreSnapshot,
};
use habit_rest::RestHabitApi;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub(crate) api_url: String,
    pub(crate) api_token: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = lookup("HABIT_API_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .context("HABIT_API_URL must point at the habit service")?;
        let api_token = lookup("HABIT_API_TOKEN")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        Ok(Self { api_url, api_token })
    }
}

#[derive(Debug, Parser)]
#[command(name = "habits", about = "Track daily habits against the habit service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Show habits and today's progress.
    List {
        /// Logical date to show instead of the current one (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },
    /// Create a habit.
    Add { title: String },
    /// Change a habit's title.
    Rename { id: String, title: String },
    /// Delete a habit.
    Delete { id: String },
    /// Mark a habit done, or undo it.
    Toggle {
        id: String,
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },
}

fn parse_date_arg(input: &str) -> std::result::Result<NaiveDate, String> {
    parse_logical_date(input).map_err(|err| err.to_string())
}

pub async fn run(config: AppConfig, command: Command) -> Result<()> {
    info!(api_url = %config.api_url, "connecting to habit service");
    let api = RestHabitApi::new(&config.api_url, config.api_token.clone())
        .context("failed to configure habit api")?;
    let store = HabitStore::new(Arc::new(api));

    match command {
        Command::List { date } => {
            refresh(&store, date).await?;
            print!("{}", render_listing(&store.snapshot(), today()));
        }
        Command::Add { title } => {
            let habit = store.add(&title).await.context("failed to add habit")?;
            println!("added \"{}\" ({})", habit.title, habit.id);
        }
        Command::Rename { id, title } => {
            store
                .update(&id, &title)
                .await
                .with_context(|| format!("failed to rename habit {id}"))?;
            println!("renamed {id}");
        }
        Command::Delete { id } => {
            store
                .delete(&id)
                .await
                .with_context(|| format!("failed to delete habit {id}"))?;
            println!("deleted {id}");
        }
        Command::Toggle { id, date } => {
            refresh(&store, date).await?;
            if store.habit(&id).is_none() {
                bail!("no habit with id {id} on {}", store.date_key());
            }
            store
                .toggle(&id)
                .await
                .with_context(|| format!("failed to toggle habit {id}"))?;
            if let Some(habit) = store.habit(&id) {
                let state = if habit.completed_today { "done" } else { "not done" };
                println!(
                    "{} marked {state} for {} (streak {})",
                    habit.title,
                    store.date_key(),
                    habit.streak_count
                );
            }
        }
    }
    Ok(())
}

async fn refresh(store: &HabitStore, date: Option<NaiveDate>) -> Result<()> {
    match date {
        Some(date) => store.set_date(date).await,
        None => store.load().await,
    }
    if let Some(message) = store.error() {
        bail!(message);
    }
    Ok(())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Plain-text listing of a store snapshot.
pub fn render_listing(snapshot: &StoreSnapshot, today: NaiveDate) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} ({}): {}/{} done",
        label_relative_to(snapshot.logical_date, today),
        format_logical_date(snapshot.logical_date),
        snapshot.progress.completed,
        snapshot.progress.total
    );
    if snapshot.habits.is_empty() {
        out.push_str("  no habits yet\n");
    }
    for habit in &snapshot.habits {
        let mark = if habit.completed_today { 'x' } else { ' ' };
        let _ = writeln!(
            out,
            "  [{mark}] {}  streak {}  id={}",
            habit.title, habit.streak_count, habit.id
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use habit_domain::habit::{HabitWithStats, Progress};
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn config_requires_api_url() {
        assert!(AppConfig::from_lookup(lookup(&[])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("HABIT_API_URL", "  ")])).is_err());

        let config = AppConfig::from_lookup(lookup(&[
            ("HABIT_API_URL", " https://habits.example.com "),
            ("HABIT_API_TOKEN", ""),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://habits.example.com");
        assert_eq!(config.api_token, None);
    }

    #[test]
    fn config_reads_optional_token() {
        let config = AppConfig::from_lookup(lookup(&[
            ("HABIT_API_URL", "http://localhost:5173"),
            ("HABIT_API_TOKEN", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.api_token.as_deref(), Some("secret"));
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["habits", "list", "--date", "2024-01-05"]).unwrap();
        assert_eq!(
            cli.command,
            Command::List {
                date: Some(ymd(2024, 1, 5))
            }
        );

        let cli = Cli::try_parse_from(["habits", "rename", "42", "Drink water"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Rename {
                id: "42".into(),
                title: "Drink water".into()
            }
        );

        assert!(Cli::try_parse_from(["habits", "toggle", "42", "--date", "2024-1-5"]).is_err());
    }

    #[test]
    fn renders_label_progress_and_entries() {
        let snapshot = StoreSnapshot {
            habits: vec![
                HabitWithStats {
                    id: "a".into(),
                    title: "Read".into(),
                    created_at: Utc::now(),
                    streak_count: 4,
                    completed_today: true,
                },
                HabitWithStats {
                    id: "b".into(),
                    title: "Run".into(),
                    created_at: Utc::now(),
                    streak_count: 0,
                    completed_today: false,
                },
            ],
            loading: false,
            error: None,
            logical_date: ymd(2023, 5, 14),
            date_key: "2023-05-14".into(),
            progress: Progress {
                total: 2,
                completed: 1,
            },
        };

        let listing = render_listing(&snapshot, ymd(2023, 5, 15));
        assert_eq!(
            listing,
            "Yesterday (2023-05-14): 1/2 done\n  [x] Read  streak 4  id=a\n  [ ] Run  streak 0  id=b\n"
        );
    }

    #[test]
    fn renders_empty_state() {
        let snapshot = StoreSnapshot {
            habits: Vec::new(),
            loading: false,
            error: None,
            logical_date: ymd(2023, 5, 10),
            date_key: "2023-05-10".into(),
            progress: Progress::default(),
        };
        let listing = render_listing(&snapshot, ymd(2023, 5, 15));
        assert_eq!(listing, "Wed, May 10 (2023-05-10): 0/0 done\n  no habits yet\n");
    }
}
