use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{day_bounds_ms, normalize_staff_code, parse_day_key, utc_day_key};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

struct HandlerErr {
    code: &'static str,
    message: String,
}

impl HandlerErr {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
        }
    }

    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, None)
    }
}

/// Everyone who checked in on one UTC day, roster-style.
fn attendance_day_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let day = match params.get("day").and_then(|v| v.as_str()) {
        Some(raw) => parse_day_key(raw)
            .ok_or_else(|| HandlerErr::new("bad_params", "day must be YYYY-MM-DD"))?,
        None => Utc::now().date_naive(),
    };
    let day_key = utc_day_key(day);

    let mut stmt = conn
        .prepare(
            "SELECT a.id, a.checked_in_at, a.status, s.staff_code, s.last_name, s.first_name
             FROM staff_attendance a
             JOIN staff s ON s.id = a.staff_id
             WHERE a.day = ?
             ORDER BY a.checked_in_at_ms",
        )
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let records = stmt
        .query_map([&day_key], |r| {
            let last: String = r.get(4)?;
            let first: String = r.get(5)?;
            Ok(json!({
                "recordId": r.get::<_, String>(0)?,
                "checkedInAt": r.get::<_, String>(1)?,
                "status": r.get::<_, String>(2)?,
                "staffCode": r.get::<_, String>(3)?,
                "displayName": format!("{}, {}", last, first),
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;

    Ok(json!({ "day": day_key, "records": records }))
}

/// One staff member's records over an optional day range, newest first.
fn attendance_history(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let staff_code_raw = params
        .get("staffId")
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", "missing staffId"))?;
    let staff_code = normalize_staff_code(staff_code_raw);

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
            format!("staff ID {} is not registered", staff_code),
        ));
    };

    let from_ms = match params.get("fromDay").and_then(|v| v.as_str()) {
        Some(raw) => {
            let day = parse_day_key(raw)
                .ok_or_else(|| HandlerErr::new("bad_params", "fromDay must be YYYY-MM-DD"))?;
            day_bounds_ms(day).0
        }
        None => 0,
    };
    let to_ms = match params.get("toDay").and_then(|v| v.as_str()) {
        Some(raw) => {
            let day = parse_day_key(raw)
                .ok_or_else(|| HandlerErr::new("bad_params", "toDay must be YYYY-MM-DD"))?;
            day_bounds_ms(day).1
        }
        None => i64::MAX,
    };

    let mut stmt = conn
        .prepare(
            "SELECT id, day, checked_in_at, status
             FROM staff_attendance
             WHERE staff_id = ? AND checked_in_at_ms >= ? AND checked_in_at_ms < ?
             ORDER BY checked_in_at_ms DESC",
        )
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let records = stmt
        .query_map(rusqlite::params![staff_id, from_ms, to_ms], |r| {
            Ok(json!({
                "recordId": r.get::<_, String>(0)?,
                "day": r.get::<_, String>(1)?,
                "checkedInAt": r.get::<_, String>(2)?,
                "status": r.get::<_, String>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;

    Ok(json!({ "staffId": staff_code, "records": records }))
}

fn handle_attendance_day_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_day_open(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_history(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_history(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.dayOpen" => Some(handle_attendance_day_open(state, req)),
        "attendance.history" => Some(handle_attendance_history(state, req)),
        _ => None,
    }
}
