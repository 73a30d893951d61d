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
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn error_code(resp: &serde_json::Value) -> &str {
    assert_eq!(
        resp.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "expected failure, got {}",
        resp
    );
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
}

fn encode_base36(value: i64) -> String {
    const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value <= 0 {
        return "0".to_string();
    }
    let mut v = value as u64;
    let mut digits: Vec<u8> = Vec::new();
    while v > 0 {
        digits.push(ALPHABET[(v % 36) as usize]);
        v /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).expect("ascii digits")
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_millis() as i64
}

/// A token dated wherever the test needs it; the wire format is public.
fn token_issued_at(issued_at_ms: i64) -> String {
    format!("{}.{}", uuid::Uuid::new_v4(), encode_base36(issued_at_ms))
}

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    workspace: PathBuf,
    next_id: u32,
}

impl Sidecar {
    fn with_staff(prefix: &str, staff_code: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, mut stdin, mut reader) = spawn_sidecar();
        let resp = request(
            &mut stdin,
            &mut reader,
            "ws",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));
        let resp = request(
            &mut stdin,
            &mut reader,
            "staff",
            "staff.create",
            json!({ "staffCode": staff_code, "lastName": "Gate", "firstName": "Test" }),
        );
        assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));
        Sidecar {
            child,
            stdin,
            reader,
            workspace,
            next_id: 1,
        }
    }

    fn submit(&mut self, params: serde_json::Value) -> serde_json::Value {
        let id = format!("s{}", self.next_id);
        self.next_id += 1;
        request(&mut self.stdin, &mut self.reader, &id, "checkin.submit", params)
    }

    fn finish(mut self) {
        drop(self.stdin);
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(self.workspace);
    }
}

#[test]
fn missing_or_empty_params_are_bad_requests() {
    let mut s = Sidecar::with_staff("rollcall-gates-params", "TCH001");

    let resp = s.submit(json!({ "token": token_issued_at(now_ms()) }));
    assert_eq!(error_code(&resp), "bad_params");

    let resp = s.submit(json!({ "staffId": "TCH001" }));
    assert_eq!(error_code(&resp), "bad_params");

    let resp = s.submit(json!({ "staffId": "  ", "token": token_issued_at(now_ms()) }));
    assert_eq!(error_code(&resp), "bad_params");

    let resp = s.submit(json!({ "staffId": "TCH001", "token": "" }));
    assert_eq!(error_code(&resp), "bad_params");

    s.finish();
}

#[test]
fn malformed_tokens_fail_the_format_gate() {
    let mut s = Sidecar::with_staff("rollcall-gates-format", "TCH001");

    let resp = s.submit(json!({ "staffId": "TCH001", "token": "no-dot-in-sight" }));
    assert_eq!(error_code(&resp), "invalid_token_format");

    let resp = s.submit(json!({ "staffId": "TCH001", "token": "too.many.parts" }));
    assert_eq!(error_code(&resp), "invalid_token_format");

    let resp = s.submit(json!({ "staffId": "TCH001", "token": "abc123." }));
    assert_eq!(error_code(&resp), "invalid_token_format");

    let resp = s.submit(json!({ "staffId": "TCH001", "token": "abc123.!!!" }));
    assert_eq!(error_code(&resp), "invalid_token_timestamp");

    s.finish();
}

#[test]
fn stale_and_future_tokens_fail_the_freshness_gate() {
    let mut s = Sidecar::with_staff("rollcall-gates-freshness", "TCH001");

    // 150s old against a 120s TTL.
    let resp = s.submit(json!({
        "staffId": "TCH001",
        "token": token_issued_at(now_ms() - 150_000)
    }));
    assert_eq!(error_code(&resp), "token_expired");

    // Dated in the future; magnitude is within the TTL but age is negative.
    let resp = s.submit(json!({
        "staffId": "TCH001",
        "token": token_issued_at(now_ms() + 30_000)
    }));
    assert_eq!(error_code(&resp), "token_expired");

    // Well inside the TTL; proves the gate, not the clock, failed above.
    let resp = s.submit(json!({
        "staffId": "TCH001",
        "token": token_issued_at(now_ms() - 30_000)
    }));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));

    s.finish();
}

#[test]
fn freshness_is_checked_before_staff_resolution() {
    let mut s = Sidecar::with_staff("rollcall-gates-order", "TCH001");

    // Unknown staff AND stale token: the earlier gate wins.
    let resp = s.submit(json!({
        "staffId": "ZZZ999",
        "token": token_issued_at(now_ms() - 150_000)
    }));
    assert_eq!(error_code(&resp), "token_expired");

    s.finish();
}

#[test]
fn unknown_staff_fails_resolution_with_an_onboarding_message() {
    let mut s = Sidecar::with_staff("rollcall-gates-staff", "TCH001");

    let resp = s.submit(json!({
        "staffId": "ZZZ999",
        "token": token_issued_at(now_ms())
    }));
    assert_eq!(error_code(&resp), "staff_not_found");
    let message = resp
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|v| v.as_str())
        .expect("message");
    assert!(message.contains("ZZZ999"), "message names the id: {}", message);
    assert!(
        message.contains("onboarding"),
        "message points at onboarding: {}",
        message
    );

    s.finish();
}

#[test]
fn submit_without_workspace_is_rejected() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "checkin.submit",
        json!({ "staffId": "TCH001", "token": token_issued_at(now_ms()) }),
    );
    assert_eq!(error_code(&resp), "no_workspace");
    drop(stdin);
    let _ = child.wait();
}
