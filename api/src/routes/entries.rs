use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use compass_core::entries::{CreateEntryRequest, Entry, EntryIntent, PaginatedResponse};
use compass_core::error::ApiError;
use compass_core::factors::Factor;
use compass_core::oracle::OracleOutcome;
use compass_core::response::ResponseModel;
use compass_core::snapshot::StateSnapshot;
use compass_engine::vocabulary::QuarantinedCandidate;
use compass_engine::{PipelineInput, PipelineOutput};

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use crate::store;

/// How far back recurrence and memory look.
const FACTS_WINDOW_DAYS: i64 = 90;
/// Optimistic profile-write attempts before giving up.
const MAX_FOLD_ATTEMPTS: u32 = 3;

pub fn write_router() -> Router<AppState> {
    Router::new()
        .route("/v1/entries", post(create_entry))
        .route("/v1/entries/simulate", post(simulate_entry))
}

pub fn read_router() -> Router<AppState> {
    Router::new().route("/v1/entries", get(list_entries))
}

/// Everything one submission produced, as handed to the presentation layer.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EntryPipelineResponse {
    pub entry: Entry,
    pub snapshot: StateSnapshot,
    pub response: ResponseModel,
    pub committed_factors: Vec<Factor>,
    pub quarantined: Vec<QuarantinedCandidate>,
    /// True when a newer submission for this user was accepted first and this
    /// result was not applied to the profile (last-submission-wins).
    pub superseded: bool,
}

fn validate_entry(req: &CreateEntryRequest) -> Result<(), AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::Validation {
            message: "text must not be empty".to_string(),
            field: Some("text".to_string()),
            received: None,
            docs_hint: Some("Submit the user's words as they typed them.".to_string()),
        });
    }
    if req.text.len() > 8_000 {
        return Err(AppError::Validation {
            message: format!("text length {} exceeds maximum of 8000", req.text.len()),
            field: Some("text".to_string()),
            received: None,
            docs_hint: Some("Split very long submissions into separate entries.".to_string()),
        });
    }
    if req.metadata.idempotency_key.is_empty() {
        return Err(AppError::Validation {
            message: "metadata.idempotency_key must not be empty".to_string(),
            field: Some("metadata.idempotency_key".to_string()),
            received: None,
            docs_hint: Some(
                "Generate a unique idempotency_key per submission (e.g. a UUID). \
                 This allows safe retries without duplicate entries."
                    .to_string(),
            ),
        });
    }
    Ok(())
}

/// Submit an entry and run the full pipeline
///
/// Classification → factor extraction → profile fold → decision → response
/// selection, in one deterministic pass. The local safety check runs before
/// the oracle call and can never be delayed or suppressed by it.
#[utoipa::path(
    post,
    path = "/v1/entries",
    request_body = CreateEntryRequest,
    responses(
        (status = 201, description = "Entry processed", body = EntryPipelineResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 409, description = "Idempotency conflict", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "entries"
)]
pub async fn create_entry(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(req): Json<CreateEntryRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_entry(&req)?;
    let user_id = auth.user_id;
    let now = Utc::now();

    // Safety first, locally, before the entry even hits the database. A dead
    // oracle can never delay this.
    let safety = state.engine.check_safety(&req.text, req.upstream_risk_flag);

    let entry = insert_entry(&state, user_id, &req, now).await?;

    // The oracle is consulted only for non-crisis entries; the crisis path is
    // fully local and synchronous.
    let oracle = if safety.triggered() {
        OracleOutcome::Unavailable
    } else {
        let (profile, _) = store::load_profile(&state.db, user_id, now).await?;
        state
            .oracle
            .classify(&req.text, profile_summary(&profile))
            .await
    };

    let (output, superseded) = process_and_persist(&state, &entry, &req, oracle, now).await?;

    Ok((
        StatusCode::CREATED,
        Json(EntryPipelineResponse {
            entry: strip_unsaved_text(entry),
            snapshot: output.snapshot,
            response: output.response,
            committed_factors: output.payload.factors,
            quarantined: output.payload.quarantined,
            superseded,
        }),
    ))
}

/// Dry-run the pipeline without persisting anything
///
/// Same computation as POST /v1/entries against the current profile, but no
/// entry, factor, snapshot, or follow-up is written. Useful for agents that
/// want to preview the effect of a submission.
#[utoipa::path(
    post,
    path = "/v1/entries/simulate",
    request_body = CreateEntryRequest,
    responses(
        (status = 200, description = "Simulated result", body = EntryPipelineResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "entries"
)]
pub async fn simulate_entry(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(req): Json<CreateEntryRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_entry(&req)?;
    let user_id = auth.user_id;
    let now = Utc::now();

    let entry = build_entry(user_id, &req, now);
    let safety = state.engine.check_safety(&req.text, req.upstream_risk_flag);
    let (profile, _) = store::load_profile(&state.db, user_id, now).await?;

    let oracle = if safety.triggered() {
        OracleOutcome::Unavailable
    } else {
        state
            .oracle
            .classify(&req.text, profile_summary(&profile))
            .await
    };

    let asked_today = store::follow_ups_asked_today(&state.db, user_id).await?;
    let recent = store::load_entry_facts(
        &state.db,
        user_id,
        now - Duration::days(FACTS_WINDOW_DAYS),
        None,
    )
    .await?;
    let remembered = store::latest_visible_insight_summary(&state.db, user_id).await?;

    let output = state.engine.process(PipelineInput {
        entry: &entry,
        oracle,
        profile,
        pending: None,
        follow_ups_asked_today: asked_today,
        upstream_risk_flag: req.upstream_risk_flag,
        recent,
        remembered,
        now,
    });

    Ok((
        StatusCode::OK,
        Json(EntryPipelineResponse {
            entry: strip_unsaved_text(entry),
            snapshot: output.snapshot,
            response: output.response,
            committed_factors: output.payload.factors,
            quarantined: output.payload.quarantined,
            superseded: false,
        }),
    ))
}

/// The in-memory entry carries the full text so the pipeline can read it.
/// What is persisted and what leaves the API depends on the save mode — see
/// `stored_text` and `strip_unsaved_text`.
fn build_entry(user_id: Uuid, req: &CreateEntryRequest, now: DateTime<Utc>) -> Entry {
    Entry {
        id: Uuid::now_v7(),
        user_id,
        created_at: now,
        parent_entry_id: req.parent_entry_id,
        intent: req.intent,
        save_mode: req.save_mode,
        raw_text: Some(req.text.clone()),
        metadata: req.metadata.clone(),
    }
}

/// Only save_journal keeps the user's words verbatim. Transient and
/// factors-only entries keep the event and its extracted facts, not the text.
fn stored_text(entry: &Entry) -> Option<&String> {
    match entry.save_mode {
        compass_core::entries::SaveMode::SaveJournal => entry.raw_text.as_ref(),
        compass_core::entries::SaveMode::Transient
        | compass_core::entries::SaveMode::SaveFactorsOnly => None,
    }
}

fn strip_unsaved_text(mut entry: Entry) -> Entry {
    if stored_text(&entry).is_none() {
        entry.raw_text = None;
    }
    entry
}

/// Insert the entry into the insert-only log. Symptom keys are stored
/// alongside so the pattern detector never needs the raw text back.
async fn insert_entry(
    state: &AppState,
    user_id: Uuid,
    req: &CreateEntryRequest,
    now: DateTime<Utc>,
) -> Result<Entry, AppError> {
    let entry = build_entry(user_id, req, now);
    let symptoms = state.engine.detect_symptoms(&req.text);
    let symptoms_json = serde_json::to_value(&symptoms)
        .map_err(|e| AppError::Internal(format!("Failed to serialize symptoms: {e}")))?;
    let metadata_json = serde_json::to_value(&entry.metadata)
        .map_err(|e| AppError::Internal(format!("Failed to serialize metadata: {e}")))?;

    let mut tx = state.db.begin().await?;
    store::set_rls_user(&mut tx, user_id).await?;

    sqlx::query(
        "INSERT INTO entries \
         (id, user_id, created_at, parent_entry_id, intent, save_mode, raw_text, metadata, \
          symptoms, idempotency_key) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(entry.id)
    .bind(user_id)
    .bind(entry.created_at)
    .bind(entry.parent_entry_id)
    .bind(entry.intent.as_str())
    .bind(entry.save_mode.as_str())
    .bind(stored_text(&entry))
    .bind(&metadata_json)
    .bind(&symptoms_json)
    .bind(&entry.metadata.idempotency_key)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.code().as_deref() == Some("23505") {
                return AppError::IdempotencyConflict {
                    idempotency_key: entry.metadata.idempotency_key.clone(),
                };
            }
        }
        AppError::Database(e)
    })?;

    tx.commit().await?;
    Ok(entry)
}

/// Run the pipeline and persist its outputs, retrying on optimistic profile
/// conflicts. Returns the final output plus whether this submission was
/// superseded by a newer one (last-submission-wins).
async fn process_and_persist(
    state: &AppState,
    entry: &Entry,
    req: &CreateEntryRequest,
    oracle: OracleOutcome,
    now: DateTime<Utc>,
) -> Result<(PipelineOutput, bool), AppError> {
    let user_id = entry.user_id;

    for attempt in 0..MAX_FOLD_ATTEMPTS {
        let (profile, expected_version) = store::load_profile(&state.db, user_id, now).await?;

        // Last-submission-wins: if a newer entry was already accepted, this
        // result is computed for the response but never applied to the
        // profile. Entry IDs are UUIDv7, so ordering is submission ordering.
        let superseded = profile
            .latest_accepted_entry_id
            .is_some_and(|latest| latest > entry.id);

        let pending = match entry.parent_entry_id {
            Some(parent) => store::load_open_follow_up(&state.db, user_id, parent).await?,
            None => None,
        };
        let asked_today = store::follow_ups_asked_today(&state.db, user_id).await?;
        let recent = store::load_entry_facts(
            &state.db,
            user_id,
            now - Duration::days(FACTS_WINDOW_DAYS),
            Some(entry.id),
        )
        .await?;
        let remembered = store::latest_visible_insight_summary(&state.db, user_id).await?;

        let output = state.engine.process(PipelineInput {
            entry,
            oracle: oracle.clone(),
            profile,
            pending: pending.as_ref(),
            follow_ups_asked_today: asked_today,
            upstream_risk_flag: req.upstream_risk_flag,
            recent,
            remembered,
            now,
        });

        let mut tx = state.db.begin().await?;
        store::set_rls_user(&mut tx, user_id).await?;

        store::insert_factors(&mut tx, user_id, &output.payload.factors).await?;
        insert_quarantine(&mut tx, user_id, entry.id, &output.payload.quarantined).await?;

        if !superseded {
            insert_snapshot(&mut tx, user_id, &output.snapshot).await?;

            if let Some(follow_up) = &output.follow_up {
                store::insert_follow_up(&mut tx, user_id, follow_up).await?;
            }
            if entry.intent == EntryIntent::FollowUp {
                if let Some(parent) = entry.parent_entry_id {
                    store::resolve_follow_up(&mut tx, user_id, parent, entry.id).await?;
                }
            }

            if !store::save_profile(&mut tx, &output.profile, expected_version).await? {
                // A concurrent fold moved the version; recompute from fresh state.
                tx.rollback().await?;
                tracing::debug!(user_id = %user_id, attempt, "profile version conflict, retrying");
                continue;
            }
        } else {
            tracing::info!(
                entry_id = %entry.id,
                "submission superseded by a newer entry; profile not updated"
            );
        }

        tx.commit().await?;
        return Ok((output, superseded));
    }

    Err(AppError::ProfileConflict)
}

async fn insert_snapshot(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    snapshot: &StateSnapshot,
) -> Result<(), AppError> {
    let data = serde_json::to_value(snapshot)
        .map_err(|e| AppError::Internal(format!("Failed to serialize snapshot: {e}")))?;
    sqlx::query(
        "INSERT INTO snapshots (entry_id, user_id, data, created_at) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (entry_id) DO NOTHING",
    )
    .bind(snapshot.entry_id)
    .bind(user_id)
    .bind(&data)
    .bind(snapshot.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Refused oracle candidates land in an audit table, never in the factor log.
async fn insert_quarantine(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    entry_id: Uuid,
    quarantined: &[QuarantinedCandidate],
) -> Result<(), AppError> {
    for candidate in quarantined {
        let reason = serde_json::to_value(&candidate.reason)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        sqlx::query(
            "INSERT INTO quarantined_candidates \
             (id, user_id, entry_id, code, reason, nearest, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW())",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(entry_id)
        .bind(&candidate.code)
        .bind(&reason)
        .bind(candidate.nearest.map(|c| c.as_str()))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn profile_summary(profile: &compass_core::profile::ComplexityProfile) -> String {
    let domains: Vec<&str> = profile
        .active_domains()
        .into_iter()
        .map(|d| d.as_str())
        .collect();
    let top: Vec<&str> = profile
        .top_constraints
        .iter()
        .map(|c| c.code.as_str())
        .collect();
    format!("domains: [{}]; top_constraints: [{}]", domains.join(", "), top.join(", "))
}

// ──────────────────────────────────────────────
// GET /v1/entries
// ──────────────────────────────────────────────

/// Query parameters for listing entries
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListEntriesParams {
    /// Filter by intent (e.g. "journal", "ask")
    #[serde(default)]
    pub intent: Option<String>,
    /// Only entries after this timestamp (inclusive)
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Only entries before this timestamp (exclusive)
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    /// Maximum number of entries to return (default 50, max 200)
    #[serde(default)]
    pub limit: Option<i64>,
    /// Cursor for pagination (opaque string from previous response's next_cursor)
    #[serde(default)]
    pub cursor: Option<String>,
}

/// List entries with cursor-based pagination
///
/// Returns entries newest first. The log is insert-only, so cursor iteration
/// is stable over growing data.
#[utoipa::path(
    get,
    path = "/v1/entries",
    params(ListEntriesParams),
    responses(
        (status = 200, description = "Paginated list of entries", body = PaginatedResponse<Entry>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "entries"
)]
pub async fn list_entries(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(params): Query<ListEntriesParams>,
) -> Result<Json<PaginatedResponse<Entry>>, AppError> {
    let user_id = auth.user_id;

    if let Some(ref intent) = params.intent {
        if EntryIntent::parse(intent).is_none() {
            return Err(AppError::Validation {
                message: format!("unknown intent '{intent}'"),
                field: Some("intent".to_string()),
                received: Some(serde_json::Value::String(intent.clone())),
                docs_hint: Some(
                    "Valid intents: ask, journal, follow_up, mixed, log_only".to_string(),
                ),
            });
        }
    }

    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    // Fetch one extra to determine has_more
    let fetch_limit = limit + 1;

    let cursor_data = match params.cursor {
        Some(ref cursor_str) => Some(decode_cursor(cursor_str)?),
        None => None,
    };
    let (cursor_ts, cursor_id) = match cursor_data {
        Some(ref c) => (Some(c.timestamp), Some(c.id)),
        None => (None, None),
    };

    let rows = sqlx::query_as::<_, store::EntryRow>(
        r#"
        SELECT id, user_id, created_at, parent_entry_id, intent, save_mode, raw_text, metadata,
               symptoms
        FROM entries
        WHERE user_id = $1
          AND ($2::text IS NULL OR intent = $2)
          AND ($3::timestamptz IS NULL OR created_at >= $3)
          AND ($4::timestamptz IS NULL OR created_at < $4)
          AND ($5::timestamptz IS NULL OR (created_at, id) < ($5, $6))
        ORDER BY created_at DESC, id DESC
        LIMIT $7
        "#,
    )
    .bind(user_id)
    .bind(&params.intent)
    .bind(params.since)
    .bind(params.until)
    .bind(cursor_ts)
    .bind(cursor_id)
    .bind(fetch_limit)
    .fetch_all(&state.db)
    .await?;

    let has_more = rows.len() as i64 > limit;
    let entries: Vec<Entry> = rows
        .into_iter()
        .take(limit as usize)
        .map(|r| r.into_entry())
        .collect();

    let next_cursor = if has_more {
        entries.last().map(|e| encode_cursor(&e.created_at, &e.id))
    } else {
        None
    };

    Ok(Json(PaginatedResponse {
        data: entries,
        next_cursor,
        has_more,
    }))
}

/// Cursor is base64("timestamp\0id") — opaque to the client, stable for pagination
fn encode_cursor(timestamp: &DateTime<Utc>, id: &Uuid) -> String {
    use base64::Engine;
    let raw = format!("{}\0{}", timestamp.to_rfc3339(), id);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

struct CursorData {
    timestamp: DateTime<Utc>,
    id: Uuid,
}

fn decode_cursor(cursor: &str) -> Result<CursorData, AppError> {
    use base64::Engine;
    let invalid = |message: &str| AppError::Validation {
        message: message.to_string(),
        field: Some("cursor".to_string()),
        received: None,
        docs_hint: Some("Use the next_cursor value from a previous response".to_string()),
    };

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| invalid("Invalid cursor format"))?;
    let s = String::from_utf8(bytes).map_err(|_| invalid("Invalid cursor encoding"))?;

    let parts: Vec<&str> = s.splitn(2, '\0').collect();
    if parts.len() != 2 {
        return Err(invalid("Invalid cursor structure"));
    }

    let timestamp = DateTime::parse_from_rfc3339(parts[0])
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| invalid("Invalid cursor timestamp"))?;
    let id = Uuid::parse_str(parts[1]).map_err(|_| invalid("Invalid cursor id"))?;

    Ok(CursorData { timestamp, id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use compass_core::entries::{EntryMetadata, SaveMode};

    fn request(text: &str, save_mode: SaveMode) -> CreateEntryRequest {
        CreateEntryRequest {
            text: text.to_string(),
            intent: EntryIntent::Journal,
            save_mode,
            parent_entry_id: None,
            upstream_risk_flag: false,
            metadata: EntryMetadata {
                source: Some("test".to_string()),
                agent: None,
                idempotency_key: "k-1".to_string(),
            },
        }
    }

    #[test]
    fn cursor_roundtrip() {
        let timestamp = Utc::now();
        let id = Uuid::now_v7();
        let cursor = encode_cursor(&timestamp, &id);
        let decoded = decode_cursor(&cursor).unwrap();
        assert_eq!(decoded.id, id);
        assert_eq!(decoded.timestamp.timestamp_millis(), timestamp.timestamp_millis());
    }

    #[test]
    fn garbage_cursor_is_rejected() {
        assert!(decode_cursor("not-base64!!").is_err());
        assert!(decode_cursor("bm8tc2VwYXJhdG9y").is_err());
    }

    #[test]
    fn empty_text_and_missing_idempotency_key_fail_validation() {
        assert!(validate_entry(&request("   ", SaveMode::SaveJournal)).is_err());

        let mut req = request("slept badly", SaveMode::SaveJournal);
        req.metadata.idempotency_key = String::new();
        assert!(validate_entry(&req).is_err());

        assert!(validate_entry(&request("slept badly", SaveMode::SaveJournal)).is_ok());
    }

    #[test]
    fn only_save_journal_keeps_raw_text() {
        let now = Utc::now();
        let user_id = Uuid::now_v7();

        let journal = build_entry(user_id, &request("kept", SaveMode::SaveJournal), now);
        assert!(stored_text(&journal).is_some());
        assert!(strip_unsaved_text(journal).raw_text.is_some());

        for mode in [SaveMode::Transient, SaveMode::SaveFactorsOnly] {
            let entry = build_entry(user_id, &request("dropped", mode), now);
            // The pipeline still sees the text; storage and the response do not.
            assert!(entry.raw_text.is_some());
            assert!(stored_text(&entry).is_none());
            assert!(strip_unsaved_text(entry).raw_text.is_none());
        }
    }
}
