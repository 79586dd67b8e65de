//! URL helpers for building backend endpoints
//!
//! The backend base URL comes from configuration and may or may not carry a
//! trailing slash; endpoint paths are written with a leading slash
//! (`/api/auth/login`). These helpers join the two without doubling slashes.

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use chatwire::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:5000"), "http://localhost:5000");
/// assert_eq!(normalize_base_url("http://localhost:5000///"), "http://localhost:5000");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path
///
/// # Examples
///
/// ```
/// use chatwire::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:5000/", "/api/models"),
///     "http://localhost:5000/api/models"
/// );
/// ```
pub fn construct_api_url(base_url: &str, path: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let path = path.trim_start_matches('/');
    format!("{normalized_base}/{path}")
}

/// Append `skip`/`take` paging parameters to an endpoint path.
pub fn paged_path(path: &str, skip: usize, take: usize) -> String {
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}skip={skip}&take={take}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construct_api_url_handles_slash_combinations() {
        let cases = [
            ("http://host", "/api/models"),
            ("http://host/", "/api/models"),
            ("http://host", "api/models"),
            ("http://host//", "//api/models"),
        ];
        for (base, path) in cases {
            assert_eq!(construct_api_url(base, path), "http://host/api/models");
        }
    }

    #[test]
    fn construct_api_url_keeps_base_path_prefix() {
        assert_eq!(
            construct_api_url("https://chat.example.com/backend/", "/api/auth/me"),
            "https://chat.example.com/backend/api/auth/me"
        );
    }

    #[test]
    fn paged_path_appends_or_extends_query() {
        assert_eq!(
            paged_path("/api/conversation", 0, 50),
            "/api/conversation?skip=0&take=50"
        );
        assert_eq!(
            paged_path("/api/conversation?agent=x", 50, 50),
            "/api/conversation?agent=x&skip=50&take=50"
        );
    }
}
