//! Utility functions and helpers for configuration

use std::time::Duration;

/// Default functions for serde
pub fn default_true() -> bool {
    true
}

pub fn default_false() -> bool {
    false
}

pub fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}

/// Parse `KEY=VALUE`, as given to `--env`
pub fn parse_key_value(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", input))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", input));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("BASE_URL=http://localhost:5000").unwrap(),
            ("BASE_URL".to_string(), "http://localhost:5000".to_string())
        );
        assert_eq!(
            parse_key_value("EMPTY=").unwrap(),
            ("EMPTY".to_string(), String::new())
        );
        assert!(parse_key_value("NOVALUE").is_err());
        assert!(parse_key_value("=value").is_err());
    }
}
