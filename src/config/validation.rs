//! Time format, timezone and URL validation utilities.

use chrono::format::{Item, StrftimeItems};
use chrono_tz::Tz;

/// Validates a strftime pattern as understood by chrono.
pub(crate) fn validate_time_format(format: &str) -> Result<(), String> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        Err(format!("invalid strftime pattern '{}'", format))
    } else {
        Ok(())
    }
}

/// Parses an IANA timezone name.
pub(crate) fn validate_timezone(name: &str) -> Result<Tz, String> {
    name.parse::<Tz>()
        .map_err(|_| format!("unknown timezone '{}'", name))
}

/// Validates an absolute http(s) URL.
pub(crate) fn validate_url(value: &str) -> Result<(), String> {
    let url = reqwest::Url::parse(value).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_time_format_accepts_common_patterns() {
        assert!(validate_time_format("%H:%M:%S").is_ok());
        assert!(validate_time_format("%Y-%m-%dT%H:%M:%S%z").is_ok());
        assert!(validate_time_format("at %H h").is_ok());
        assert!(validate_time_format("").is_ok());
    }

    #[test]
    fn validate_time_format_rejects_unknown_specifier() {
        assert!(validate_time_format("%Q").is_err());
        assert!(validate_time_format("%H:%").is_err());
    }

    #[test]
    fn validate_timezone_parses_iana_names() {
        assert_eq!(validate_timezone("Europe/Paris").unwrap(), Tz::Europe__Paris);
        assert_eq!(validate_timezone("UTC").unwrap(), Tz::UTC);
        assert!(validate_timezone("Mars/Olympus").is_err());
    }

    #[test]
    fn validate_url_requires_http_scheme() {
        assert!(validate_url("https://hooks.slack.com/services/T0/B0/x").is_ok());
        assert!(validate_url("http://proxy.internal:3128").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("not a url").is_err());
    }
}
