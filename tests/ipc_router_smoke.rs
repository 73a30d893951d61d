use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rollcalld");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rollcalld");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("rollcall-router-smoke");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));

    // Issuer and decoder work before a workspace is selected.
    let issued = request(&mut stdin, &mut reader, "2", "checkin.issueToken", json!({}));
    let token = issued
        .get("result")
        .and_then(|v| v.get("token"))
        .and_then(|v| v.as_str())
        .expect("token")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "checkin.decodePayload",
        json!({ "text": token }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request(
        &mut stdin,
        &mut reader,
        "5",
        "staff.create",
        json!({
            "staffCode": "TCH001",
            "lastName": "Smoke",
            "firstName": "Staff"
        }),
    );
    let staff_id = created
        .get("result")
        .and_then(|v| v.get("staffId"))
        .and_then(|v| v.as_str())
        .expect("staffId")
        .to_string();

    let _ = request(&mut stdin, &mut reader, "6", "staff.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "staff.update",
        json!({
            "staffId": staff_id,
            "patch": { "firstName": "Updated" }
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "checkin.submit",
        json!({ "staffId": "TCH001", "token": token }),
    );
    let _ = request(&mut stdin, &mut reader, "9", "attendance.dayOpen", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "attendance.history",
        json!({ "staffId": "TCH001" }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
