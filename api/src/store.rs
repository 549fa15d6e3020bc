use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use compass_core::domains::Domain;
use compass_core::entries::{Entry, EntryIntent, EntryMetadata, SaveMode};
use compass_core::factors::{
    Factor, FactorCode, FactorKind, FactorValue, Modifiability, SymptomKey, TimeHorizon,
};
use compass_core::profile::ComplexityProfile;
use compass_core::snapshot::PendingFollowUp;
use compass_engine::patterns::EntryFacts;

use crate::error::AppError;

/// Row mapping for the insert-only entries table.
#[derive(sqlx::FromRow)]
pub struct EntryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub parent_entry_id: Option<Uuid>,
    pub intent: String,
    pub save_mode: String,
    pub raw_text: Option<String>,
    pub metadata: serde_json::Value,
    #[allow(dead_code)]
    pub symptoms: serde_json::Value,
}

impl EntryRow {
    pub fn into_entry(self) -> Entry {
        let metadata: EntryMetadata =
            serde_json::from_value(self.metadata).unwrap_or_else(|_| EntryMetadata {
                source: None,
                agent: None,
                idempotency_key: "unknown".to_string(),
            });

        Entry {
            id: self.id,
            user_id: self.user_id,
            created_at: self.created_at,
            parent_entry_id: self.parent_entry_id,
            intent: EntryIntent::parse(&self.intent).unwrap_or(EntryIntent::Journal),
            save_mode: SaveMode::parse(&self.save_mode).unwrap_or(SaveMode::SaveJournal),
            raw_text: self.raw_text,
            metadata,
        }
    }
}

/// Row mapping for the insert-only factors table.
#[derive(sqlx::FromRow)]
pub struct FactorRow {
    pub id: Uuid,
    pub domain: String,
    pub kind: String,
    pub code: String,
    pub value: serde_json::Value,
    pub confidence: f64,
    pub time_horizon: String,
    pub modifiability: String,
    pub source_entry_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl FactorRow {
    /// Rows with values outside the closed vocabularies are skipped rather
    /// than guessed at; they can only appear through manual writes.
    pub fn into_factor(self) -> Option<Factor> {
        let code = FactorCode::parse(&self.code)?;
        Some(Factor {
            id: self.id,
            domain: Domain::parse(&self.domain)?,
            kind: FactorKind::parse(&self.kind)?,
            code,
            value: serde_json::from_value::<FactorValue>(self.value).ok()?,
            confidence: self.confidence,
            time_horizon: TimeHorizon::parse(&self.time_horizon)?,
            modifiability: Modifiability::parse(&self.modifiability)?,
            source_entry_id: self.source_entry_id,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    data: serde_json::Value,
    version: i64,
}

/// Load the stored profile. Returns the profile plus the version to use as
/// the optimistic stamp for the next write.
pub async fn load_profile(
    pool: &PgPool,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(ComplexityProfile, i64), AppError> {
    let row = sqlx::query_as::<_, ProfileRow>(
        "SELECT data, version FROM profiles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let profile: ComplexityProfile = serde_json::from_value(row.data).map_err(|e| {
                AppError::Internal(format!("stored profile for {user_id} is unreadable: {e}"))
            })?;
            Ok((profile, row.version))
        }
        None => Ok((ComplexityProfile::new(user_id, now), 0)),
    }
}

/// Optimistic profile write. Returns false when the version stamp moved,
/// meaning a concurrent fold won and the caller should retry.
pub async fn save_profile(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    profile: &ComplexityProfile,
    expected_version: i64,
) -> Result<bool, AppError> {
    let data = serde_json::to_value(profile)
        .map_err(|e| AppError::Internal(format!("Failed to serialize profile: {e}")))?;

    let result = if expected_version == 0 {
        sqlx::query(
            "INSERT INTO profiles (user_id, data, version, updated_at) \
             VALUES ($1, $2, 1, NOW()) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(profile.user_id)
        .bind(&data)
        .execute(&mut **tx)
        .await?
    } else {
        sqlx::query(
            "UPDATE profiles SET data = $2, version = version + 1, updated_at = NOW() \
             WHERE user_id = $1 AND version = $3",
        )
        .bind(profile.user_id)
        .bind(&data)
        .bind(expected_version)
        .execute(&mut **tx)
        .await?
    };

    Ok(result.rows_affected() > 0)
}

/// Full factor log for one user, oldest first. Used for replay.
pub async fn load_factor_log(pool: &PgPool, user_id: Uuid) -> Result<Vec<Factor>, AppError> {
    let rows = sqlx::query_as::<_, FactorRow>(
        "SELECT id, domain, kind, code, value, confidence, time_horizon, modifiability, \
                source_entry_id, created_at \
         FROM factors WHERE user_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(FactorRow::into_factor).collect())
}

pub async fn insert_factors(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    factors: &[Factor],
) -> Result<(), AppError> {
    for factor in factors {
        let value = serde_json::to_value(&factor.value)
            .map_err(|e| AppError::Internal(format!("Failed to serialize factor value: {e}")))?;
        sqlx::query(
            "INSERT INTO factors \
             (id, user_id, domain, kind, code, value, confidence, time_horizon, modifiability, \
              source_entry_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(factor.id)
        .bind(user_id)
        .bind(factor.domain.as_str())
        .bind(factor.kind.as_str())
        .bind(factor.code.as_str())
        .bind(&value)
        .bind(factor.confidence)
        .bind(factor.time_horizon.as_str())
        .bind(factor.modifiability.as_str())
        .bind(factor.source_entry_id)
        .bind(factor.created_at)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Recent entry facts for pattern and recurrence scans, oldest first.
/// Excludes `exclude_entry_id` so a submission does not see itself twice.
pub async fn load_entry_facts(
    pool: &PgPool,
    user_id: Uuid,
    since: DateTime<Utc>,
    exclude_entry_id: Option<Uuid>,
) -> Result<Vec<EntryFacts>, AppError> {
    #[derive(sqlx::FromRow)]
    struct FactsRow {
        id: Uuid,
        created_at: DateTime<Utc>,
        symptoms: serde_json::Value,
    }

    let rows = sqlx::query_as::<_, FactsRow>(
        "SELECT id, created_at, symptoms FROM entries \
         WHERE user_id = $1 AND created_at >= $2 \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(user_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    #[derive(sqlx::FromRow)]
    struct CodeRow {
        source_entry_id: Uuid,
        code: String,
    }

    let code_rows = sqlx::query_as::<_, CodeRow>(
        "SELECT source_entry_id, code FROM factors \
         WHERE user_id = $1 AND created_at >= $2",
    )
    .bind(user_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut facts: Vec<EntryFacts> = rows
        .into_iter()
        .filter(|row| Some(row.id) != exclude_entry_id)
        .map(|row| EntryFacts {
            entry_id: row.id,
            created_at: row.created_at,
            symptoms: serde_json::from_value::<Vec<SymptomKey>>(row.symptoms)
                .unwrap_or_default(),
            factor_codes: Vec::new(),
        })
        .collect();

    for code_row in code_rows {
        if let Some(code) = FactorCode::parse(&code_row.code) {
            if let Some(entry) = facts.iter_mut().find(|f| f.entry_id == code_row.source_entry_id)
            {
                entry.factor_codes.push(code);
            }
        }
    }

    Ok(facts)
}

/// Clarifying questions opened for this user today (UTC day boundary).
pub async fn follow_ups_asked_today(pool: &PgPool, user_id: Uuid) -> Result<u8, AppError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pending_followups \
         WHERE user_id = $1 AND created_at >= date_trunc('day', NOW())",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count.clamp(0, u8::MAX as i64) as u8)
}

#[derive(sqlx::FromRow)]
struct PendingRow {
    id: Uuid,
    parent_entry_id: Uuid,
    question: String,
    missing_info_key: String,
    created_at: DateTime<Utc>,
    follow_up_count: i32,
    symptom_key: Option<String>,
}

/// The unresolved follow-up a new answer entry refers to, if any.
pub async fn load_open_follow_up(
    pool: &PgPool,
    user_id: Uuid,
    parent_entry_id: Uuid,
) -> Result<Option<PendingFollowUp>, AppError> {
    let row = sqlx::query_as::<_, PendingRow>(
        "SELECT id, parent_entry_id, question, missing_info_key, created_at, follow_up_count, \
                symptom_key \
         FROM pending_followups \
         WHERE user_id = $1 AND parent_entry_id = $2 AND resolved_at IS NULL \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(user_id)
    .bind(parent_entry_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|row| {
        Some(PendingFollowUp {
            id: row.id,
            parent_entry_id: row.parent_entry_id,
            question: row.question,
            missing_info_key: compass_core::factors::MissingInfoKey::parse(
                &row.missing_info_key,
            )?,
            created_at: row.created_at,
            follow_up_count: row.follow_up_count.clamp(0, u8::MAX as i32) as u8,
            symptom_key: row
                .symptom_key
                .and_then(|s| serde_json::from_value(serde_json::Value::String(s)).ok()),
        })
    }))
}

/// Open a pending follow-up. Idempotent on (parent_entry_id, missing_info_key):
/// a retried submission cannot open the question twice.
pub async fn insert_follow_up(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    follow_up: &PendingFollowUp,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO pending_followups \
         (id, user_id, parent_entry_id, question, missing_info_key, symptom_key, \
          follow_up_count, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (parent_entry_id, missing_info_key) DO NOTHING",
    )
    .bind(follow_up.id)
    .bind(user_id)
    .bind(follow_up.parent_entry_id)
    .bind(&follow_up.question)
    .bind(follow_up.missing_info_key.as_str())
    .bind(follow_up.symptom_key.map(|s| s.as_str()))
    .bind(follow_up.follow_up_count as i32)
    .bind(follow_up.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Mark the follow-up answered by this entry.
pub async fn resolve_follow_up(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    parent_entry_id: Uuid,
    answered_by: Uuid,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE pending_followups \
         SET resolved_at = NOW(), resolved_by_entry_id = $3 \
         WHERE user_id = $1 AND parent_entry_id = $2 AND resolved_at IS NULL",
    )
    .bind(user_id)
    .bind(parent_entry_id)
    .bind(answered_by)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// One-line summary of the most recent visible insight, for pattern recall.
pub async fn latest_visible_insight_summary(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<String>, AppError> {
    let summary: Option<Option<String>> = sqlx::query_scalar(
        "SELECT data->>'insight' FROM insights \
         WHERE user_id = $1 AND dismissed = FALSE \
           AND window_end >= NOW() - INTERVAL '7 days' \
         ORDER BY window_end DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(summary.flatten())
}

/// Set the row-level-security context for a transaction. Every statement in
/// the transaction is then scoped to this user.
pub async fn set_rls_user(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<(), AppError> {
    sqlx::query(&format!("SET LOCAL compass.current_user_id = '{}'", user_id))
        .execute(&mut **tx)
        .await?;
    Ok(())
}
