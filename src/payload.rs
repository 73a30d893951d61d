use serde::Serialize;
use url::Url;

pub const PAYLOAD_VERSION: u32 = 1;
pub const PAYLOAD_TYPE: &str = "staff_attendance";
pub const CHECK_IN_PATH: &str = "/staff/attendance/check-in";

/// Fallback origin for the embedded deep link. The sidecar has no browser
/// context, so callers normally pass their own origin with the request.
pub const DEFAULT_ORIGIN: &str = "http://localhost";

/// Anything this short cannot be a token; shorter scans are ignored rather
/// than stuffed into the form.
const MIN_RAW_TOKEN_LEN: usize = 10;

/// The structure embedded in the QR code / shareable link. Wraps exactly one
/// token. `exp` is the client countdown deadline, not the server TTL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPayload {
    pub v: u32,
    #[serde(rename = "type")]
    pub payload_type: &'static str,
    pub token: String,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff_id: Option<String>,
    pub url: String,
}

pub fn build_payload(
    token: &str,
    staff_id: Option<&str>,
    origin: &str,
    issued_at_ms: i64,
    display_ttl_seconds: i64,
) -> Result<ScanPayload, url::ParseError> {
    let mut url = Url::parse(origin)?.join(CHECK_IN_PATH)?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("token", token);
        if let Some(sid) = staff_id {
            pairs.append_pair("staffId", sid);
        }
    }
    Ok(ScanPayload {
        v: PAYLOAD_VERSION,
        payload_type: PAYLOAD_TYPE,
        token: token.to_string(),
        exp: issued_at_ms + display_ttl_seconds * 1000,
        staff_id: staff_id.map(|s| s.to_string()),
        url: url.to_string(),
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedScan {
    pub token: Option<String>,
    pub staff_id: Option<String>,
}

type DecodeStrategy = fn(&str) -> Option<DecodedScan>;

/// Ordered attempts, first hit wins. One scan box has to absorb three capture
/// paths: a JSON-encoded QR, a followed deep link, and a hand-pasted token.
const STRATEGIES: &[DecodeStrategy] = &[decode_json_envelope, decode_url, decode_raw_token];

/// Never fails; an unrecognizable scan yields an empty result so the caller
/// can leave its form state untouched.
pub fn decode_scan_text(text: &str) -> DecodedScan {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return DecodedScan::default();
    }
    STRATEGIES
        .iter()
        .find_map(|strategy| strategy(trimmed))
        .unwrap_or_default()
}

fn decode_json_envelope(text: &str) -> Option<DecodedScan> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let obj = value.as_object()?;
    if let Some(token) = obj.get("token").and_then(|v| v.as_str()) {
        return Some(DecodedScan {
            token: Some(token.to_string()),
            staff_id: obj
                .get("staffId")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        });
    }
    let embedded = obj.get("url").and_then(|v| v.as_str())?;
    decode_url(embedded)
}

fn decode_url(text: &str) -> Option<DecodedScan> {
    let url = Url::parse(text).ok()?;
    let token = query_param(&url, "token")?;
    Some(DecodedScan {
        token: Some(token),
        staff_id: query_param(&url, "staffId"),
    })
}

fn decode_raw_token(text: &str) -> Option<DecodedScan> {
    if text.len() <= MIN_RAW_TOKEN_LEN {
        return None;
    }
    Some(DecodedScan {
        token: Some(text.to_string()),
        staff_id: None,
    })
}

fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find_map(|(k, v)| if k == key { Some(v.to_string()) } else { None })
}
