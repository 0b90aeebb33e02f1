use super::{DriverError, DriverResult};

const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Accepts only identifiers that need no quoting on either engine.
pub fn identifier(s: &str) -> DriverResult<&str> {
    let valid = !s.is_empty()
        && s.len() <= MAX_IDENTIFIER_LENGTH
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        && !s.as_bytes()[0].is_ascii_digit();

    if valid {
        Ok(s)
    } else {
        Err(DriverError::InvalidIdentifier(s.to_string()))
    }
}

/// Postgres string literal, assuming `standard_conforming_strings = on`.
pub fn pg_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// MySQL string literal in the default SQL mode, where backslash escapes.
pub fn mysql_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// MySQL account name for a tenant user, reachable from any host.
pub fn mysql_account(user: &str) -> DriverResult<String> {
    Ok(format!("'{}'@'%'", identifier(user)?))
}
