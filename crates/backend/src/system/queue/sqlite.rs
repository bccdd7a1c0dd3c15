use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, QueryOrder, Set, Statement,
};

use super::job::{JobOptions, JobRecord, JobState};
use super::{JobQueue, STALLED_REASON};
use crate::shared::error::AppError;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sys_import_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub queue_name: String,
    pub name: String,
    pub payload: String,
    pub state: String,
    pub progress: i32,
    pub attempts_made: i32,
    pub options: String,
    pub created_at: i64,
    pub processed_on: Option<i64>,
    pub finished_on: Option<i64>,
    pub delay_until: Option<i64>,
    pub locked_until: Option<i64>,
    pub lock_token: Option<String>,
    pub failed_reason: Option<String>,
    pub return_value: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, AppError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| AppError::Persistence(format!("invalid timestamp in job row: {}", ms)))
}

fn from_millis_opt(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, AppError> {
    ms.map(from_millis).transpose()
}

impl TryFrom<Model> for JobRecord {
    type Error = AppError;

    fn try_from(m: Model) -> Result<Self, Self::Error> {
        let state = JobState::parse(&m.state).ok_or_else(|| {
            AppError::Persistence(format!("job {} has unknown state '{}'", m.id, m.state))
        })?;
        let return_value = match m.return_value {
            Some(raw) => Some(serde_json::from_str(&raw).map_err(AppError::persistence)?),
            None => None,
        };

        Ok(JobRecord {
            payload: serde_json::from_str(&m.payload).map_err(AppError::persistence)?,
            options: serde_json::from_str(&m.options).map_err(AppError::persistence)?,
            state,
            progress: m.progress.clamp(0, 100) as u8,
            attempts_made: m.attempts_made.max(0) as u32,
            created_at: from_millis(m.created_at)?,
            processed_on: from_millis_opt(m.processed_on)?,
            finished_on: from_millis_opt(m.finished_on)?,
            delay_until: from_millis_opt(m.delay_until)?,
            locked_until: from_millis_opt(m.locked_until)?,
            return_value,
            id: m.id,
            queue_name: m.queue_name,
            name: m.name,
            lock_token: m.lock_token,
            failed_reason: m.failed_reason,
        })
    }
}

/// Разбор строки для фоновых проходов: битая строка пропускается
fn decode_or_skip(model: Model) -> Option<JobRecord> {
    let id = model.id.clone();
    match JobRecord::try_from(model) {
        Ok(job) => Some(job),
        Err(e) => {
            tracing::warn!("Skipping unreadable job row {}: {}", id, e);
            None
        }
    }
}

fn to_active(job: &JobRecord) -> Result<ActiveModel, AppError> {
    let return_value = match &job.return_value {
        Some(value) => Some(serde_json::to_string(value).map_err(AppError::persistence)?),
        None => None,
    };
    Ok(ActiveModel {
        id: Set(job.id.clone()),
        queue_name: Set(job.queue_name.clone()),
        name: Set(job.name.clone()),
        payload: Set(serde_json::to_string(&job.payload).map_err(AppError::persistence)?),
        state: Set(job.state.as_str().to_string()),
        progress: Set(job.progress as i32),
        attempts_made: Set(job.attempts_made as i32),
        options: Set(serde_json::to_string(&job.options).map_err(AppError::persistence)?),
        created_at: Set(to_millis(job.created_at)),
        processed_on: Set(job.processed_on.map(to_millis)),
        finished_on: Set(job.finished_on.map(to_millis)),
        delay_until: Set(job.delay_until.map(to_millis)),
        locked_until: Set(job.locked_until.map(to_millis)),
        lock_token: Set(job.lock_token.clone()),
        failed_reason: Set(job.failed_reason.clone()),
        return_value: Set(return_value),
    })
}

/// Захват одним оператором: SQLite выполняет его атомарно, поэтому
/// два воркера не получат одну задачу и не будет двух active.
const CLAIM_SQL: &str = r#"
UPDATE sys_import_jobs
SET state = 'active',
    progress = 0,
    delay_until = NULL,
    processed_on = COALESCE(processed_on, ?),
    locked_until = ?,
    lock_token = ?
WHERE id = (
    SELECT id FROM sys_import_jobs
    WHERE queue_name = ?
      AND (state = 'waiting' OR (state = 'delayed' AND (delay_until IS NULL OR delay_until <= ?)))
    ORDER BY created_at ASC, id ASC
    LIMIT 1
)
AND NOT EXISTS (
    SELECT 1 FROM sys_import_jobs WHERE queue_name = ? AND state = 'active'
)
"#;

/// Очередь поверх таблицы sys_import_jobs
pub struct SqliteJobQueue {
    conn: DatabaseConnection,
    name: String,
    lock_duration: Duration,
}

impl SqliteJobQueue {
    pub fn new(conn: DatabaseConnection, name: impl Into<String>, lock_duration: Duration) -> Self {
        Self {
            conn,
            name: name.into(),
            lock_duration,
        }
    }

    fn not_found(id: &str) -> AppError {
        AppError::NotFound(format!("Job with ID {} not found", id))
    }

    async fn load(&self, id: &str) -> Result<JobRecord, AppError> {
        let model = Entity::find_by_id(id.to_string())
            .filter(Column::QueueName.eq(self.name.as_str()))
            .one(&self.conn)
            .await?
            .ok_or_else(|| Self::not_found(id))?;
        JobRecord::try_from(model)
    }

    /// Сохраняет задачу, только если блокировка все еще у `token`
    async fn save_if_held(&self, job: &JobRecord, token: &str) -> Result<(), AppError> {
        let result = Entity::update_many()
            .set(to_active(job)?)
            .filter(Column::Id.eq(job.id.as_str()))
            .filter(Column::State.eq(JobState::Active.as_str()))
            .filter(Column::LockToken.eq(token))
            .exec(&self.conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "Job {} lost its lock before the update was stored",
                job.id
            )));
        }
        if job.state == JobState::Failed && job.options.remove_on_fail {
            Entity::delete_by_id(job.id.clone()).exec(&self.conn).await?;
        }
        Ok(())
    }

    /// Загружает задачу, применяет переход и сохраняет под той же блокировкой
    async fn transition(
        &self,
        id: &str,
        token: &str,
        apply: impl FnOnce(&mut JobRecord) -> Result<(), AppError> + Send,
    ) -> Result<JobRecord, AppError> {
        let mut job = self.load(id).await?;
        apply(&mut job)?;
        self.save_if_held(&job, token).await?;
        Ok(job)
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    fn queue_name(&self) -> &str {
        &self.name
    }

    async fn enqueue(
        &self,
        name: &str,
        payload: serde_json::Value,
        options: JobOptions,
        now: DateTime<Utc>,
    ) -> Result<JobRecord, AppError> {
        let job = JobRecord::new(&self.name, name, payload, options, now);
        to_active(&job)?.insert(&self.conn).await?;
        tracing::debug!("Enqueued job {} ({}) in {}", job.id, job.name, self.name);
        Ok(job)
    }

    async fn get_job(&self, id: &str) -> Result<Option<JobRecord>, AppError> {
        match self.load(id).await {
            Ok(job) => Ok(Some(job)),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_jobs(&self, states: &[JobState]) -> Result<Vec<JobRecord>, AppError> {
        let states: Vec<&str> = states.iter().map(|s| s.as_str()).collect();
        Entity::find()
            .filter(Column::QueueName.eq(self.name.as_str()))
            .filter(Column::State.is_in(states))
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .all(&self.conn)
            .await?
            .into_iter()
            .map(JobRecord::try_from)
            .collect()
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<JobRecord>, AppError> {
        let token = uuid::Uuid::new_v4().to_string();
        let now_ms = to_millis(now);
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            CLAIM_SQL,
            vec![
                now_ms.into(),
                to_millis(now + self.lock_duration).into(),
                token.clone().into(),
                self.name.clone().into(),
                now_ms.into(),
                self.name.clone().into(),
            ],
        );
        let result = self.conn.execute(stmt).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let model = Entity::find()
            .filter(Column::LockToken.eq(token.as_str()))
            .one(&self.conn)
            .await?
            .ok_or_else(|| AppError::Persistence("claimed job row disappeared".to_string()))?;
        JobRecord::try_from(model).map(Some)
    }

    async fn report_progress(
        &self,
        id: &str,
        token: &str,
        percent: u8,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let lock_duration = self.lock_duration;
        self.transition(id, token, |job| {
            job.report_progress(token, percent, now, lock_duration)
        })
        .await
        .map(|_| ())
    }

    async fn complete(
        &self,
        id: &str,
        token: &str,
        result: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<JobRecord, AppError> {
        self.transition(id, token, |job| job.complete(token, result, now))
            .await
    }

    async fn fail(
        &self,
        id: &str,
        token: &str,
        reason: &str,
        retryable: bool,
        now: DateTime<Utc>,
    ) -> Result<JobRecord, AppError> {
        self.transition(id, token, |job| job.fail(Some(token), reason, retryable, now))
            .await
    }

    async fn recover_stalled(&self, now: DateTime<Utc>) -> Result<Vec<JobRecord>, AppError> {
        let stalled = Entity::find()
            .filter(Column::QueueName.eq(self.name.as_str()))
            .filter(Column::State.eq(JobState::Active.as_str()))
            .filter(Column::LockedUntil.lt(to_millis(now)))
            .all(&self.conn)
            .await?;

        let mut recovered = Vec::with_capacity(stalled.len());
        for mut job in stalled.into_iter().filter_map(decode_or_skip) {
            let Some(token) = job.lock_token.clone() else {
                continue;
            };
            job.fail(None, STALLED_REASON, true, now)?;
            match self.save_if_held(&job, &token).await {
                Ok(()) => {
                    tracing::warn!("Recovered stalled job {} (attempt {})", job.id, job.attempts_made);
                    recovered.push(job);
                }
                // Воркер успел завершить задачу
                Err(AppError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(recovered)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let completed = Entity::find()
            .filter(Column::QueueName.eq(self.name.as_str()))
            .filter(Column::State.eq(JobState::Completed.as_str()))
            .all(&self.conn)
            .await?;

        let expired: Vec<String> = completed
            .into_iter()
            .filter_map(decode_or_skip)
            .filter(|job| job.is_expired(now))
            .map(|job| job.id)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }
        let result = Entity::delete_many()
            .filter(Column::Id.is_in(expired))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn remove(&self, id: &str) -> Result<bool, AppError> {
        let result = Entity::delete_many()
            .filter(Column::Id.eq(id))
            .filter(Column::QueueName.eq(self.name.as_str()))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
