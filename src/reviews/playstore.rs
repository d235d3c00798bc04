// Play Store link handling.
//
// Users paste whatever they have: a full store link with tracking
// parameters, a bare package name, or nothing at all.

/// Extract the package id from a Play Store link or bare package name.
///
/// Returns `None` when the input is neither, so the caller can fall back to
/// the configured default app.
pub fn extract_app_id(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if input.contains("://") || input.contains('?') {
        let query = input.split_once('?')?.1;
        return query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "id")
            .map(|(_, value)| value.split('#').next().unwrap_or(value).to_string())
            .filter(|id| is_package_name(id));
    }

    is_package_name(input).then(|| input.to_string())
}

/// Resolve the app to analyze, falling back to `default_app_id`.
pub fn resolve_app_id(input: Option<&str>, default_app_id: &str) -> String {
    input
        .and_then(extract_app_id)
        .unwrap_or_else(|| default_app_id.to_string())
}

/// Android package names: dot-separated segments of letters, digits and
/// underscores, at least two segments, each starting with a letter.
fn is_package_name(candidate: &str) -> bool {
    let segments: Vec<&str> = candidate.split('.').collect();
    segments.len() >= 2
        && segments.iter().all(|seg| {
            seg.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
