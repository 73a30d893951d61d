use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{day_bounds_ms, normalize_staff_code, rfc3339_utc, utc_day_key};
use crate::ipc::types::{AppState, Request};
use crate::payload;
use crate::token;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub const MSG_RECORDED: &str = "Attendance recorded";
pub const MSG_ALREADY: &str = "Already checked in for today";

const STATUS_PRESENT: &str = "Present";

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn token_gate(e: token::TokenError) -> HandlerErr {
    HandlerErr::new(e.code(), e.message())
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let Some(v) = params.get(key).and_then(|v| v.as_str()) else {
        return Err(HandlerErr::new("bad_params", format!("missing {}", key)));
    };
    let t = v.trim();
    if t.is_empty() {
        return Err(HandlerErr::new(
            "bad_params",
            format!("{} must not be empty", key),
        ));
    }
    Ok(t.to_string())
}

fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Issuer side: a fresh token wrapped in its scan payload. Pure; works
/// before any workspace is selected.
fn checkin_issue_token(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let staff_code = get_optional_str(params, "staffId").map(|s| normalize_staff_code(&s));
    let origin =
        get_optional_str(params, "origin").unwrap_or_else(|| payload::DEFAULT_ORIGIN.to_string());
    let display_ttl_seconds = match params.get("displayTtlSeconds") {
        None => token::DISPLAY_TTL_SECONDS_DEFAULT,
        Some(v) => match v.as_i64() {
            Some(n) if n > 0 => n,
            _ => {
                return Err(HandlerErr::new(
                    "bad_params",
                    "displayTtlSeconds must be a positive integer",
                ))
            }
        },
    };

    let now_ms = Utc::now().timestamp_millis();
    let tok = token::issue(now_ms);
    let scan = payload::build_payload(
        &tok,
        staff_code.as_deref(),
        &origin,
        now_ms,
        display_ttl_seconds,
    )
    .map_err(|e| HandlerErr::new("bad_params", format!("origin must be an absolute URL: {}", e)))?;

    Ok(serde_json::to_value(&scan).unwrap_or_else(|_| json!({})))
}

/// Decoder side: never fails; an unrecognizable scan returns null fields so
/// the UI leaves its form state untouched.
fn checkin_decode_payload(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let text = params.get("text").and_then(|v| v.as_str()).unwrap_or("");
    let decoded = payload::decode_scan_text(text);
    Ok(json!({
        "token": decoded.token,
        "staffId": decoded.staff_id,
    }))
}

/// Validator gates, in order: params present, token format, token freshness,
/// staff resolution, same-UTC-day duplicate, insert. First failure returns.
fn checkin_submit(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let staff_code_raw = get_required_str(params, "staffId")?;
    let tok = get_required_str(params, "token")?;

    let parsed = token::parse(&tok).map_err(token_gate)?;
    let now = Utc::now();
    let now_ms = now.timestamp_millis();
    token::check_freshness(parsed.issued_at_ms, now_ms).map_err(token_gate)?;

    let staff_code = normalize_staff_code(&staff_code_raw);
    let staff_id: Option<String> = conn
        .query_row(
            "SELECT id FROM staff WHERE staff_code = ?",
            [&staff_code],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let Some(staff_id) = staff_id else {
        return Err(HandlerErr::new(
            "staff_not_found",
            format!(
                "staff ID {} is not registered; complete onboarding before checking in",
                staff_code
            ),
        ));
    };

    let today = now.date_naive();
    let day_key = utc_day_key(today);
    let (start_ms, end_ms) = day_bounds_ms(today);
    let existing: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM staff_attendance
             WHERE staff_id = ? AND checked_in_at_ms >= ? AND checked_in_at_ms < ?",
            rusqlite::params![staff_id, start_ms, end_ms],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    if existing.is_some() {
        // Re-scanning is routine; a same-day repeat is an informational
        // success, not a failure.
        return Ok(json!({
            "message": MSG_ALREADY,
            "alreadyCheckedIn": true,
            "staffId": staff_code,
            "day": day_key,
        }));
    }

    let record_id = Uuid::new_v4().to_string();
    let insert = conn.execute(
        "INSERT INTO staff_attendance(id, staff_id, day, checked_in_at, checked_in_at_ms, status)
         VALUES(?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            record_id,
            staff_id,
            day_key,
            rfc3339_utc(now_ms),
            now_ms,
            STATUS_PRESENT
        ],
    );
    match insert {
        Ok(_) => Ok(json!({
            "message": MSG_RECORDED,
            "alreadyCheckedIn": false,
            "staffId": staff_code,
            "day": day_key,
            "recordedAt": rfc3339_utc(now_ms),
        })),
        // Two concurrent scans can both pass the read above; the
        // UNIQUE(staff_id, day) constraint turns the loser into the same
        // idempotent success.
        Err(e) if is_unique_violation(&e) => Ok(json!({
            "message": MSG_ALREADY,
            "alreadyCheckedIn": true,
            "staffId": staff_code,
            "day": day_key,
        })),
        Err(e) => Err(HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "staff_attendance" })),
        }),
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn handle_issue_token(_state: &mut AppState, req: &Request) -> serde_json::Value {
    match checkin_issue_token(&req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_decode_payload(_state: &mut AppState, req: &Request) -> serde_json::Value {
    match checkin_decode_payload(&req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match checkin_submit(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "checkin.issueToken" => Some(handle_issue_token(state, req)),
        "checkin.decodePayload" => Some(handle_decode_payload(state, req)),
        "checkin.submit" => Some(handle_submit(state, req)),
        _ => None,
    }
}
