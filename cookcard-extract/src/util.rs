//! URL normalization
//!
//! Shared recipe links arrive with tracking baggage (utm parameters, share
//! tokens) that would fragment the cache. Normalization strips it so that
//! the same content hashes to the same fingerprint.

/// Query parameters stripped during normalization
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "igsh", "igshid", "si", "feature"];

/// Normalize a recipe URL for cache fingerprinting
///
/// - lowercases scheme and host
/// - drops the fragment
/// - drops tracking query parameters (`utm_*` and known share tokens)
/// - trims a trailing slash from the path
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();

    // Split off the fragment first
    let without_fragment = raw.split('#').next().unwrap_or(raw);

    let (base, query) = match without_fragment.split_once('?') {
        Some((b, q)) => (b, Some(q)),
        None => (without_fragment, None),
    };

    // Lowercase scheme and host, leave the path as-is
    let base = match base.find("://") {
        Some(idx) => {
            let scheme = &base[..idx];
            let rest = &base[idx + 3..];
            let (host, path) = match rest.find('/') {
                Some(p) => (&rest[..p], &rest[p..]),
                None => (rest, ""),
            };
            format!(
                "{}://{}{}",
                scheme.to_ascii_lowercase(),
                host.to_ascii_lowercase(),
                path
            )
        }
        None => base.to_string(),
    };

    let base = if base.ends_with('/') && base.matches('/').count() > 3 {
        base.trim_end_matches('/').to_string()
    } else {
        base
    };

    let kept: Vec<&str> = query
        .map(|q| {
            q.split('&')
                .filter(|pair| {
                    let key = pair.split('=').next().unwrap_or("");
                    !key.starts_with("utm_") && !TRACKING_PARAMS.contains(&key)
                })
                .collect()
        })
        .unwrap_or_default();

    if kept.is_empty() {
        base
    } else {
        format!("{}?{}", base, kept.join("&"))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tracking_params() {
        let url = "https://www.instagram.com/reel/abc/?igsh=xyz&utm_source=share";
        assert_eq!(normalize_url(url), "https://www.instagram.com/reel/abc");
    }

    #[test]
    fn test_keeps_meaningful_params() {
        let url = "https://www.youtube.com/watch?v=dQw4&utm_medium=social";
        assert_eq!(normalize_url(url), "https://www.youtube.com/watch?v=dQw4");
    }

    #[test]
    fn test_lowercases_host_not_path() {
        let url = "HTTPS://WWW.TikTok.com/@Cook/Video/123";
        assert_eq!(normalize_url(url), "https://www.tiktok.com/@Cook/Video/123");
    }

    #[test]
    fn test_drops_fragment_and_trailing_slash() {
        let url = "https://example.com/recipes/pasta/#comments";
        assert_eq!(normalize_url(url), "https://example.com/recipes/pasta");
    }

    #[test]
    fn test_identical_content_same_normal_form() {
        let a = normalize_url("https://www.tiktok.com/@c/video/9?si=AAA");
        let b = normalize_url("https://www.tiktok.com/@c/video/9");
        assert_eq!(a, b);
    }
}
