use uuid::Uuid;

/// Server-authoritative maximum token age. The issuing UI shows its own
/// countdown; only this constant decides acceptance.
pub const TOKEN_TTL_MS: i64 = 2 * 60 * 1000;

/// Default countdown length reported to the issuing UI, in seconds.
/// Informational only.
pub const DISPLAY_TTL_SECONDS_DEFAULT: i64 = 60;

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenError {
    InvalidFormat,
    InvalidTimestamp,
    Expired { age_ms: i64 },
}

impl TokenError {
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::InvalidFormat => "invalid_token_format",
            TokenError::InvalidTimestamp => "invalid_token_timestamp",
            TokenError::Expired { .. } => "token_expired",
        }
    }

    pub fn message(&self) -> String {
        match self {
            TokenError::InvalidFormat => {
                "token must look like <id>.<base36-timestamp>; scan the code again".to_string()
            }
            TokenError::InvalidTimestamp => {
                "token timestamp is not a valid base-36 epoch value; scan the code again".to_string()
            }
            TokenError::Expired { age_ms } if *age_ms < 0 => {
                "token is dated in the future; regenerate the code and scan again".to_string()
            }
            TokenError::Expired { .. } => {
                "token has expired; regenerate the code and scan again".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToken {
    pub random_component: String,
    pub issued_at_ms: i64,
}

/// A fresh bearer token: `<uuid-v4>.<base36(now_ms)>`. Never stored; the
/// embedded timestamp is the only freshness state.
pub fn issue(now_ms: i64) -> String {
    format!("{}.{}", Uuid::new_v4(), encode_base36(now_ms))
}

pub fn parse(token: &str) -> Result<ParsedToken, TokenError> {
    let mut parts = token.split('.');
    let (Some(random_component), Some(ts), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::InvalidFormat);
    };
    if random_component.is_empty() || ts.is_empty() {
        return Err(TokenError::InvalidFormat);
    }
    let issued_at_ms = i64::from_str_radix(ts, 36).map_err(|_| TokenError::InvalidTimestamp)?;
    if issued_at_ms <= 0 {
        return Err(TokenError::InvalidTimestamp);
    }
    Ok(ParsedToken {
        random_component: random_component.to_string(),
        issued_at_ms,
    })
}

/// Rejects both stale tokens and tokens dated in the future (clock skew or a
/// forged timestamp). `age == TTL` is still accepted.
pub fn check_freshness(issued_at_ms: i64, now_ms: i64) -> Result<(), TokenError> {
    let age_ms = now_ms - issued_at_ms;
    if age_ms < 0 || age_ms > TOKEN_TTL_MS {
        return Err(TokenError::Expired { age_ms });
    }
    Ok(())
}

pub fn encode_base36(value: i64) -> String {
    if value <= 0 {
        return "0".to_string();
    }
    let mut v = value as u64;
    let mut digits: Vec<u8> = Vec::new();
    while v > 0 {
        digits.push(BASE36_ALPHABET[(v % 36) as usize]);
        v /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}
