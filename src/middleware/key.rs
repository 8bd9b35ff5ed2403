//! Cache Key Derivation
//!
//! Builds `prefix:path[:params]` keys with identifying path segments and
//! sensitive query values stripped out.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::cache::{is_sensitive_key, REDACTED};

/// Query parameters that may contribute to a cache key
pub const ALLOWED_PARAMS: &[&str] = &["limit", "offset", "sort", "order", "filter", "lang", "level"];

/// Path segments whose successor identifies a person
const IDENTITY_SEGMENTS: &[&str] = &["user", "users", "account", "accounts", "profile", "profiles"];

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[A-Za-z]{2,}$").unwrap());

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-]{32,}$").unwrap());

/// Replaces path segments that identify a user, account or profile.
pub fn normalize_path(path: &str) -> String {
    let mut previous_is_identity = false;
    path.split('/')
        .map(|segment| {
            let redact = !segment.is_empty()
                && (previous_is_identity || EMAIL_RE.is_match(segment) || UUID_RE.is_match(segment));
            previous_is_identity = IDENTITY_SEGMENTS.contains(&segment.to_ascii_lowercase().as_str());
            if redact {
                REDACTED
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether a query value looks like personal data or a credential.
pub fn is_sensitive_value(value: &str) -> bool {
    EMAIL_RE.is_match(value)
        || UUID_RE.is_match(value)
        || TOKEN_RE.is_match(value)
        || is_sensitive_key(value)
}

/// Allow-listed, non-sensitive parameters rendered as `k=v&k=v`, sorted by
/// name then value. Repeated names are all kept, exact duplicates collapse.
/// Returns `None` when nothing survives the filter.
pub fn filter_params<'a, I>(params: I) -> Option<String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let kept: BTreeSet<(&str, &str)> = params
        .into_iter()
        .filter(|(name, value)| ALLOWED_PARAMS.contains(name) && !is_sensitive_value(value))
        .collect();

    if kept.is_empty() {
        return None;
    }
    Some(
        kept.iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&"),
    )
}

/// Derives the cache key for a request.
pub fn derive_key<'a, I>(prefix: &str, path: &str, params: I, include_params: bool) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut key = format!("{prefix}:{}", normalize_path(path));
    if include_params {
        if let Some(params) = filter_params(params) {
            key.push(':');
            key.push_str(&params);
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_redacts_identities() {
        assert_eq!(normalize_path("/users/42/progress"), "/users/[REDACTED]/progress");
        assert_eq!(normalize_path("/api/Profile/ana"), "/api/Profile/[REDACTED]");
        assert_eq!(
            normalize_path("/share/ana@example.com"),
            "/share/[REDACTED]"
        );
        assert_eq!(
            normalize_path("/items/123e4567-e89b-12d3-a456-426614174000"),
            "/items/[REDACTED]"
        );
        assert_eq!(normalize_path("/dashboard/stats"), "/dashboard/stats");
        assert_eq!(normalize_path("/users/"), "/users/");
    }

    #[test]
    fn test_filter_params_allow_list_and_order() {
        let params = [("sort", "asc"), ("limit", "10"), ("page", "2"), ("token", "x")];
        assert_eq!(filter_params(params), Some("limit=10&sort=asc".to_string()));
    }

    #[test]
    fn test_filter_params_drops_sensitive_values() {
        let params = [
            ("filter", "bob@example.com"),
            ("lang", "es"),
            ("order", "abcdefghijklmnopqrstuvwxyz0123456789"),
            ("level", "session"),
        ];
        assert_eq!(filter_params(params), Some("lang=es".to_string()));
        assert_eq!(filter_params([("page", "1")]), None);
    }

    #[test]
    fn test_derive_key() {
        let params = [("offset", "20"), ("limit", "10")];
        assert_eq!(
            derive_key("dash", "/stats", params, true),
            "dash:/stats:limit=10&offset=20"
        );
        assert_eq!(derive_key("dash", "/stats", params, false), "dash:/stats");
        assert_eq!(derive_key("dash", "/stats", [] as [(&str, &str); 0], true), "dash:/stats");
    }

    #[test]
    fn test_param_order_does_not_change_key() {
        let a = derive_key("p", "/x", [("limit", "1"), ("sort", "d")], true);
        let b = derive_key("p", "/x", [("sort", "d"), ("limit", "1")], true);
        assert_eq!(a, b);
    }

    #[test]
    fn test_repeated_param_order_does_not_change_key() {
        let a = derive_key("p", "/x", [("filter", "a1"), ("filter", "b2")], true);
        let b = derive_key("p", "/x", [("filter", "b2"), ("filter", "a1")], true);
        assert_eq!(a, b);
        assert_eq!(a, "p:/x:filter=a1&filter=b2");

        let dup = derive_key("p", "/x", [("lang", "es"), ("lang", "es")], true);
        assert_eq!(dup, "p:/x:lang=es");
    }
}
