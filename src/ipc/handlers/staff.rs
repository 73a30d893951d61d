use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{normalize_staff_code, rfc3339_utc, utc_day_key};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

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

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn staff_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let today_key = utc_day_key(Utc::now().date_naive());

    // Correlated subquery instead of a join so one row per staff member
    // survives even if a workspace ever holds stray duplicate records.
    let mut stmt = conn
        .prepare(
            "SELECT
               s.id,
               s.staff_code,
               s.last_name,
               s.first_name,
               s.role,
               s.active,
               s.sort_order,
               EXISTS(
                 SELECT 1 FROM staff_attendance a
                 WHERE a.staff_id = s.id AND a.day = ?
               ) AS checked_in_today
             FROM staff s
             ORDER BY s.sort_order, s.staff_code",
        )
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let rows = stmt
        .query_map([&today_key], |r| {
            let last: String = r.get(2)?;
            let first: String = r.get(3)?;
            Ok(json!({
                "staffId": r.get::<_, String>(0)?,
                "staffCode": r.get::<_, String>(1)?,
                "displayName": format!("{}, {}", last, first),
                "lastName": last,
                "firstName": first,
                "role": r.get::<_, Option<String>>(4)?,
                "active": r.get::<_, i64>(5)? != 0,
                "sortOrder": r.get::<_, i64>(6)?,
                "checkedInToday": r.get::<_, i64>(7)? != 0,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;

    Ok(json!({ "day": today_key, "staff": rows }))
}

fn staff_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let staff_code = normalize_staff_code(&get_required_str(params, "staffCode")?);
    let last_name = get_required_str(params, "lastName")?;
    let first_name = get_required_str(params, "firstName")?;
    let role = params
        .get("role")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let active = params.get("active").and_then(|v| v.as_bool()).unwrap_or(true);

    let sort_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM staff",
            [],
            |r| r.get(0),
        )
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;

    let staff_id = Uuid::new_v4().to_string();
    let now_ms = Utc::now().timestamp_millis();
    let insert = conn.execute(
        "INSERT INTO staff(id, staff_code, last_name, first_name, role, active, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            staff_id,
            staff_code,
            last_name,
            first_name,
            role,
            active as i64,
            sort_order,
            rfc3339_utc(now_ms)
        ],
    );
    match insert {
        Ok(_) => Ok(json!({ "staffId": staff_id, "staffCode": staff_code })),
        Err(e) if is_unique_violation(&e) => Err(HandlerErr::new(
            "staff_code_taken",
            format!("staff code {} is already registered", staff_code),
        )),
        Err(e) => Err(HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "staff" })),
        }),
    }
}

fn staff_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let staff_id = get_required_str(params, "staffId")?;
    let patch = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::new("bad_params", "missing patch"))?;

    let existing = conn
        .query_row(
            "SELECT staff_code, last_name, first_name, role, active FROM staff WHERE id = ?",
            [&staff_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, i64>(4)? != 0,
                ))
            },
        )
        .optional()
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let Some((staff_code, last_name, first_name, role, active)) = existing else {
        return Err(HandlerErr::new("not_found", "staff member not found"));
    };

    let staff_code = match patch.get("staffCode").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => normalize_staff_code(v),
        _ => staff_code,
    };
    let last_name = match patch.get("lastName").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => last_name,
    };
    let first_name = match patch.get("firstName").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => first_name,
    };
    let role = match patch.get("role") {
        Some(v) if v.is_null() => None,
        Some(v) => v
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or(role),
        None => role,
    };
    let active = patch.get("active").and_then(|v| v.as_bool()).unwrap_or(active);

    let now_ms = Utc::now().timestamp_millis();
    let update = conn.execute(
        "UPDATE staff
         SET staff_code = ?, last_name = ?, first_name = ?, role = ?, active = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            staff_code,
            last_name,
            first_name,
            role,
            active as i64,
            rfc3339_utc(now_ms),
            staff_id
        ],
    );
    match update {
        Ok(_) => Ok(json!({ "staffId": staff_id, "staffCode": staff_code })),
        Err(e) if is_unique_violation(&e) => Err(HandlerErr::new(
            "staff_code_taken",
            format!("staff code {} is already registered", staff_code),
        )),
        Err(e) => Err(HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "staff" })),
        }),
    }
}

fn handle_staff_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "staff": [] }));
    };
    match staff_list(conn) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_staff_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match staff_create(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_staff_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match staff_update(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "staff.list" => Some(handle_staff_list(state, req)),
        "staff.create" => Some(handle_staff_create(state, req)),
        "staff.update" => Some(handle_staff_update(state, req)),
        _ => None,
    }
}
