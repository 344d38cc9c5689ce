//! Google OAuth scope shortcuts

const SCOPE_BASE: &str = "https://www.googleapis.com/auth/";

/// Short name → full scope URL
pub const SCOPE_MAP: &[(&str, &str)] = &[
    ("gmail.readonly", "https://www.googleapis.com/auth/gmail.readonly"),
    ("gmail.send", "https://www.googleapis.com/auth/gmail.send"),
    ("gmail.modify", "https://www.googleapis.com/auth/gmail.modify"),
    ("gmail.settings.basic", "https://www.googleapis.com/auth/gmail.settings.basic"),
    ("gmail.settings.sharing", "https://www.googleapis.com/auth/gmail.settings.sharing"),
    ("drive", "https://www.googleapis.com/auth/drive"),
    ("drive.file", "https://www.googleapis.com/auth/drive.file"),
    ("drive.readonly", "https://www.googleapis.com/auth/drive.readonly"),
    ("docs", "https://www.googleapis.com/auth/documents"),
    ("docs.readonly", "https://www.googleapis.com/auth/documents.readonly"),
    ("sheets", "https://www.googleapis.com/auth/spreadsheets"),
    ("sheets.readonly", "https://www.googleapis.com/auth/spreadsheets.readonly"),
    ("calendar", "https://www.googleapis.com/auth/calendar"),
    ("calendar.readonly", "https://www.googleapis.com/auth/calendar.readonly"),
    ("admin.directory.user", "https://www.googleapis.com/auth/admin.directory.user"),
    ("admin.directory.group", "https://www.googleapis.com/auth/admin.directory.group"),
    (
        "admin.directory.group.member",
        "https://www.googleapis.com/auth/admin.directory.group.member",
    ),
];

/// Scopes requested by the OAuth flow when none are given
pub const DEFAULT_SCOPES: &[&str] = &["gmail.readonly", "gmail.send", "drive.file", "drive.readonly"];

/// Expand one scope: full URLs pass through, shortcuts are looked up,
/// anything else is appended to the standard prefix.
pub fn resolve_scope(scope: &str) -> String {
    let scope = scope.trim();
    if scope.starts_with("https://") {
        return scope.to_string();
    }
    SCOPE_MAP
        .iter()
        .find(|(short, _)| *short == scope)
        .map(|(_, url)| url.to_string())
        .unwrap_or_else(|| format!("{}{}", SCOPE_BASE, scope))
}

pub fn resolve_scopes<S: AsRef<str>>(scopes: &[S]) -> Vec<String> {
    scopes.iter().map(|s| resolve_scope(s.as_ref())).collect()
}

/// Last path segment of a scope URL, for display
pub fn short_name(scope: &str) -> &str {
    scope.rsplit('/').next().unwrap_or(scope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_scope() {
        assert_eq!(
            resolve_scope("docs"),
            "https://www.googleapis.com/auth/documents"
        );
        assert_eq!(
            resolve_scope("https://mail.google.com/"),
            "https://mail.google.com/"
        );
        assert_eq!(
            resolve_scope("tasks"),
            "https://www.googleapis.com/auth/tasks"
        );
    }

    #[test]
    fn test_default_scopes_resolve() {
        let resolved = resolve_scopes(DEFAULT_SCOPES);
        assert_eq!(resolved.len(), 4);
        assert!(resolved.iter().all(|s| s.starts_with(SCOPE_BASE)));
    }

    #[test]
    fn test_short_name() {
        assert_eq!(
            short_name("https://www.googleapis.com/auth/drive.file"),
            "drive.file"
        );
    }
}
