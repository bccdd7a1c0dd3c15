use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::AppError;

/// Состояние задачи в очереди
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    /// Ожидание между попытками (backoff), подсостояние Waiting
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(JobState::Waiting),
            "delayed" => Some(JobState::Delayed),
            "active" => Some(JobState::Active),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Политика задержки между попытками
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// delay * 2^(attempts_made - 1)
    Exponential { delay: u64 },
    Fixed { delay: u64 },
}

impl Backoff {
    /// Задержка перед следующей попыткой после `attempts_made` неудачных
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let ms = match *self {
            Backoff::Fixed { delay } => delay,
            Backoff::Exponential { delay } => {
                let exponent = attempts_made.saturating_sub(1).min(20);
                delay.saturating_mul(1u64 << exponent)
            }
        };
        Duration::milliseconds(ms.min(i64::MAX as u64) as i64)
    }
}

/// Параметры задачи при постановке в очередь
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    /// Общее число попыток, включая первую
    pub attempts: u32,
    pub backoff: Backoff,
    /// Через сколько секунд удалять завершенную задачу (None: хранить)
    pub remove_on_complete: Option<i64>,
    /// Удалять ли проваленную задачу сразу
    pub remove_on_fail: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: Backoff::Fixed { delay: 0 },
            remove_on_complete: None,
            remove_on_fail: false,
        }
    }
}

/// Запись задачи очереди
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub queue_name: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub progress: u8,
    pub attempts_made: u32,
    pub options: JobOptions,
    pub created_at: DateTime<Utc>,
    /// Момент первого захвата воркером
    pub processed_on: Option<DateTime<Utc>>,
    pub finished_on: Option<DateTime<Utc>>,
    pub delay_until: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub lock_token: Option<String>,
    pub failed_reason: Option<String>,
    pub return_value: Option<serde_json::Value>,
}

impl JobRecord {
    pub fn new(
        queue_name: &str,
        name: &str,
        payload: serde_json::Value,
        options: JobOptions,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            queue_name: queue_name.to_string(),
            name: name.to_string(),
            payload,
            state: JobState::Waiting,
            progress: 0,
            attempts_made: 0,
            options,
            created_at: now,
            processed_on: None,
            finished_on: None,
            delay_until: None,
            locked_until: None,
            lock_token: None,
            failed_reason: None,
            return_value: None,
        }
    }

    /// Задача ждет захвата (в т.ч. отложенная, чья задержка истекла)
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            JobState::Waiting => true,
            JobState::Delayed => self.delay_until.map_or(true, |at| at <= now),
            _ => false,
        }
    }

    pub fn is_held_by(&self, token: &str) -> bool {
        self.state == JobState::Active && self.lock_token.as_deref() == Some(token)
    }

    /// Активная задача, чей воркер перестал продлевать блокировку
    pub fn is_stalled(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Active && self.locked_until.map_or(false, |at| at < now)
    }

    /// Истек срок хранения завершенной задачи
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.state, self.options.remove_on_complete, self.finished_on) {
            (JobState::Completed, Some(secs), Some(finished)) => {
                finished + Duration::seconds(secs) <= now
            }
            _ => false,
        }
    }

    fn lost_lock(&self) -> AppError {
        AppError::NotFound(format!(
            "Job {} is not active under the given lock (state: {})",
            self.id, self.state
        ))
    }

    /// waiting/delayed -> active; возвращает токен блокировки
    pub fn claim(&mut self, now: DateTime<Utc>, lock_duration: Duration) -> String {
        let token = Uuid::new_v4().to_string();
        self.state = JobState::Active;
        self.progress = 0;
        self.delay_until = None;
        self.processed_on.get_or_insert(now);
        self.locked_until = Some(now + lock_duration);
        self.lock_token = Some(token.clone());
        token
    }

    /// Прогресс не убывает в пределах одного выполнения
    pub fn report_progress(
        &mut self,
        token: &str,
        percent: u8,
        now: DateTime<Utc>,
        lock_duration: Duration,
    ) -> Result<(), AppError> {
        if !self.is_held_by(token) {
            return Err(self.lost_lock());
        }
        self.progress = self.progress.max(percent.min(100));
        self.locked_until = Some(now + lock_duration);
        Ok(())
    }

    /// active -> completed
    pub fn complete(
        &mut self,
        token: &str,
        result: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if !self.is_held_by(token) {
            return Err(self.lost_lock());
        }
        self.state = JobState::Completed;
        self.progress = 100;
        self.attempts_made += 1;
        self.return_value = Some(result);
        self.failed_reason = None;
        self.finished_on = Some(now);
        self.release_lock();
        Ok(())
    }

    /// active -> delayed (остались попытки) или active -> failed.
    ///
    /// `token == None` только для восстановления зависших задач.
    pub fn fail(
        &mut self,
        token: Option<&str>,
        reason: &str,
        retryable: bool,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let held = match token {
            Some(token) => self.is_held_by(token),
            None => self.state == JobState::Active,
        };
        if !held {
            return Err(self.lost_lock());
        }
        self.attempts_made += 1;
        self.failed_reason = Some(reason.to_string());
        self.release_lock();

        if retryable && self.attempts_made < self.options.attempts {
            self.state = JobState::Delayed;
            self.delay_until = Some(now + self.options.backoff.delay_for(self.attempts_made));
        } else {
            self.state = JobState::Failed;
            self.finished_on = Some(now);
        }
        Ok(())
    }

    fn release_lock(&mut self) {
        self.lock_token = None;
        self.locked_until = None;
    }
}
