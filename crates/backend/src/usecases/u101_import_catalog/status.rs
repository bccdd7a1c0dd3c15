use chrono::{DateTime, Utc};
use contracts::usecases::u101_import_catalog::{ImportJobState, ImportResult, ImportStatus};

use crate::system::queue::{JobRecord, JobState};

pub fn external_state(state: JobState) -> ImportJobState {
    match state {
        JobState::Waiting => ImportJobState::Waiting,
        JobState::Delayed => ImportJobState::Delayed,
        JobState::Active => ImportJobState::Active,
        JobState::Completed => ImportJobState::Completed,
        JobState::Failed => ImportJobState::Failed,
    }
}

pub fn queue_states(states: &[ImportJobState]) -> Vec<JobState> {
    states
        .iter()
        .map(|s| match s {
            ImportJobState::Waiting => JobState::Waiting,
            ImportJobState::Delayed => JobState::Delayed,
            ImportJobState::Active => JobState::Active,
            ImportJobState::Completed => JobState::Completed,
            ImportJobState::Failed => JobState::Failed,
        })
        .collect()
}

/// Проекция записи очереди в статус импорта.
///
/// Счетчики берутся из сохраненного результата (до завершения нули),
/// `startedAt` до первого захвата равен `now`.
pub fn project(job: &JobRecord, now: DateTime<Utc>) -> ImportStatus {
    let result: ImportResult = job
        .return_value
        .as_ref()
        .and_then(|value| match serde_json::from_value(value.clone()) {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!("Job {} has unreadable result: {}", job.id, e);
                None
            }
        })
        .unwrap_or_default();

    let terminal = job.state.is_terminal();
    ImportStatus {
        job_id: job.id.clone(),
        status: external_state(job.state),
        progress: job.progress,
        processed_items: result.processed_items,
        total_items: result.total_items,
        deleted_items: result.deleted_items,
        started_at: job.processed_on.unwrap_or(now),
        finished_at: if terminal { job.finished_on } else { None },
        error: if job.state == JobState::Failed {
            job.failed_reason.clone()
        } else {
            None
        },
        errors: result.errors,
    }
}
