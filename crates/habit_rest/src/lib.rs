//! HTTP implementation of [`HabitApi`] for the habit REST service.

use std::time::Duration;

use async_trait::async_trait;
use habit_domain::{
    error::Result,
    habit::{Habit, HabitWithStats},
    HabitApi, HabitError,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const HABITS_PATH: &str = "/rest/v1/habits";
const COMPLETIONS_PATH: &str = "/rest/v1/habit_completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct RestHabitApi {
    base_url: String,
    auth_bearer: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct TitleBody<'a> {
    title: &'a str,
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    habit_id: &'a str,
    completed_date: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl RestHabitApi {
    pub fn new(base_url: &str, auth_bearer: Option<String>) -> Result<Self> {
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|e| HabitError::validation(format!("invalid api url `{base_url}`: {e}")))?;
        if parsed.host_str().is_none() {
            return Err(HabitError::validation(format!(
                "api url `{base_url}` is missing a host"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| HabitError::network(format!("http client setup failed: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_bearer: auth_bearer.filter(|token| !token.is_empty()),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn habits_url(&self) -> String {
        format!("{}{HABITS_PATH}", self.base_url)
    }

    fn completions_url(&self) -> String {
        format!("{}{COMPLETIONS_PATH}", self.base_url)
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.auth_bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| HabitError::validation(format!("invalid auth token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        request
            .headers(self.auth_headers()?)
            .send()
            .await
            .map_err(|e| HabitError::network(format!("request failed: {e}")))
    }
}

#[async_trait]
impl HabitApi for RestHabitApi {
    #[instrument(name = "rest_fetch_habits", skip(self))]
    async fn fetch_habits_with_stats(&self, date_key: &str) -> Result<Vec<HabitWithStats>> {
        let request = self
            .client
            .get(self.habits_url())
            .query(&[("target_date", date_key)]);
        let response = self.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(HabitError::network(describe(status, message)));
        }
        let habits: Vec<HabitWithStats> = response
            .json()
            .await
            .map_err(|e| HabitError::network(format!("habit list parse failed: {e}")))?;
        debug!(count = habits.len(), "fetched habits");
        Ok(habits)
    }

    #[instrument(name = "rest_create_habit", skip(self))]
    async fn create_habit(&self, title: &str) -> Result<Habit> {
        let request = self.client.post(self.habits_url()).json(&TitleBody { title });
        let response = self.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(classify_write(status, "", message));
        }
        response
            .json()
            .await
            .map_err(|e| HabitError::network(format!("created habit parse failed: {e}")))
    }

    #[instrument(name = "rest_update_habit", skip(self))]
    async fn update_habit_title(&self, id: &str, title: &str) -> Result<()> {
        let request = self
            .client
            .patch(self.habits_url())
            .query(&[("id", eq_filter(id))])
            .json(&TitleBody { title });
        let response = self.send(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = error_message(response).await;
        Err(classify_write(status, id, message))
    }

    #[instrument(name = "rest_delete_habit", skip(self))]
    async fn delete_habit(&self, id: &str) -> Result<()> {
        let request = self
            .client
            .delete(self.habits_url())
            .query(&[("id", eq_filter(id))]);
        let response = self.send(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = error_message(response).await;
        Err(classify_write(status, id, message))
    }

    #[instrument(name = "rest_set_completion", skip(self))]
    async fn set_completion(&self, id: &str, date_key: &str, was_completed: bool) -> Result<()> {
        let request = if was_completed {
            self.client
                .delete(self.completions_url())
                .query(&[("habit_id", id), ("completed_date", date_key)])
        } else {
            self.client
                .post(self.completions_url())
                .json(&CompletionBody {
                    habit_id: id,
                    completed_date: date_key,
                })
        };
        let status = self.send(request).await?.status();
        absorb_conflict(completion_outcome(was_completed, status))
    }
}

fn eq_filter(id: &str) -> String {
    format!("eq.{id}")
}

/// Map a failed habit write to the error taxonomy.
fn classify_write(status: StatusCode, id: &str, message: Option<String>) -> HabitError {
    match status {
        StatusCode::NOT_FOUND => HabitError::not_found(id),
        StatusCode::BAD_REQUEST => {
            HabitError::validation(message.unwrap_or_else(|| "request rejected".to_string()))
        }
        _ => HabitError::network(describe(status, message)),
    }
}

/// Outcome of a completion write. A missing row on delete (404) already
/// leaves the server in the requested state; a duplicate insert (409) is
/// reported as [`HabitError::Conflict`].
fn completion_outcome(was_completed: bool, status: StatusCode) -> Result<()> {
    if status.is_success() || (was_completed && status == StatusCode::NOT_FOUND) {
        return Ok(());
    }
    if !was_completed && status == StatusCode::CONFLICT {
        return Err(HabitError::Conflict(
            "habit already completed for this date".to_string(),
        ));
    }
    Err(HabitError::network(describe(
        status,
        Some("failed to update completion status".to_string()),
    )))
}

/// A duplicate completion means the habit is already done, which is what
/// the caller asked for. Never surfaced to the store.
fn absorb_conflict(result: Result<()>) -> Result<()> {
    match result {
        Err(HabitError::Conflict(message)) => {
            debug!(%message, "completion already recorded");
            Ok(())
        }
        other => other,
    }
}

fn describe(status: StatusCode, message: Option<String>) -> String {
    match message {
        Some(message) => format!("status={status}: {message}"),
        None => format!("status={status}"),
    }
}

async fn error_message(response: Response) -> Option<String> {
    let bytes = response.bytes().await.ok()?;
    parse_error_body(&bytes)
}

fn parse_error_body(bytes: &[u8]) -> Option<String> {
    let body: ErrorBody = serde_json::from_slice(bytes).ok()?;
    body.error.or(body.message).filter(|msg| !msg.is_empty())
}
