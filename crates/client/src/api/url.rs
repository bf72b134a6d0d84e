//! Base URL normalization and endpoint resolution.

use super::error::ClientError;

/// Parse the backend base URL.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Remove fragment (#...)
/// 4. Ensure the path ends with `/` so relative joins keep it
pub fn parse_base(input: &str) -> Result<url::Url, ClientError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ClientError::EmptyBaseUrl);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
    let mut parsed = url::Url::parse(&url_str).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(ClientError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_fragment(None);
    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }

    Ok(parsed)
}

/// Resolve an endpoint path such as `/portfolio/u1` against `base`.
///
/// Leading slashes are stripped so the base path prefix is preserved.
pub fn endpoint(base: &url::Url, path: &str) -> Result<url::Url, ClientError> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| ClientError::InvalidUrl(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_defaults_scheme() {
        let url = parse_base("api.example.com").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/");
    }

    #[test]
    fn test_parse_base_rejects_bad_input() {
        assert!(matches!(parse_base("  "), Err(ClientError::EmptyBaseUrl)));
        assert!(matches!(parse_base("ftp://example.com"), Err(ClientError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = parse_base("https://api.example.com/v1#frag").unwrap();
        assert_eq!(endpoint(&base, "/portfolio/u1").unwrap().as_str(), "https://api.example.com/v1/portfolio/u1");
        assert_eq!(endpoint(&base, "market/status").unwrap().as_str(), "https://api.example.com/v1/market/status");
    }
}
