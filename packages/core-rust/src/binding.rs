//! Binding normalization: canonicalizes the path strings that identify services.
//!
//! Every path entering the registry or the dispatch pipeline passes through
//! [`normalize`] first, so lookups on both sides agree on a single canonical
//! form regardless of how the caller spelled the path.

/// Command suffix stripped from bindings registered under the RPC calling
/// convention (`/v1/command.rpc` and `/v1/command` resolve identically).
pub const RPC_SUFFIX: &str = ".rpc";

/// Canonicalizes a binding path.
///
/// Rules, applied in order:
/// 1. Strip all whitespace (leading, trailing, and embedded).
/// 2. Treat backslashes as path separators.
/// 3. Drop empty and `.` segments; `..` pops the previous segment.
/// 4. Ensure a single leading slash, no trailing slash (except the root `/`).
/// 5. Strip any number of trailing [`RPC_SUFFIX`] markers.
///
/// Returns `None` when the input is blank or whitespace-only. Pure and
/// idempotent: `normalize(&normalize(x)?) == normalize(x)` for every `x`.
#[must_use]
pub fn normalize(path: &str) -> Option<String> {
    let stripped: String = path.chars().filter(|c| !c.is_whitespace()).collect();
    if stripped.is_empty() {
        return None;
    }
    let flipped = stripped.replace('\\', "/");

    let mut segments: Vec<&str> = Vec::new();
    for segment in flipped.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut bind = String::with_capacity(flipped.len() + 1);
    for segment in &segments {
        bind.push('/');
        bind.push_str(segment);
    }
    if bind.is_empty() {
        bind.push('/');
    }

    // Repeated stripping keeps normalization idempotent for inputs like
    // "/echo.rpc.rpc".
    while let Some(rest) = bind.strip_suffix(RPC_SUFFIX) {
        bind.truncate(rest.len());
    }
    if bind.is_empty() {
        bind.push('/');
    }
    Some(bind)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn blank_input_is_invalid() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("   "), None);
        assert_eq!(normalize("\t\n"), None);
    }

    #[test]
    fn adds_leading_slash() {
        assert_eq!(normalize("users").as_deref(), Some("/users"));
    }

    #[test]
    fn strips_trailing_slash() {
        assert_eq!(normalize("/users/").as_deref(), Some("/users"));
        assert_eq!(normalize("/users///").as_deref(), Some("/users"));
    }

    #[test]
    fn root_survives() {
        assert_eq!(normalize("/").as_deref(), Some("/"));
        assert_eq!(normalize("///").as_deref(), Some("/"));
    }

    #[test]
    fn strips_embedded_whitespace() {
        assert_eq!(normalize("  /users / list ").as_deref(), Some("/users/list"));
    }

    #[test]
    fn collapses_backslashes_and_duplicates() {
        assert_eq!(normalize("\\users\\\\list").as_deref(), Some("/users/list"));
        assert_eq!(normalize("/users//list").as_deref(), Some("/users/list"));
    }

    #[test]
    fn resolves_dot_segments() {
        assert_eq!(normalize("/users/./list").as_deref(), Some("/users/list"));
        assert_eq!(normalize("/users/inner/../list").as_deref(), Some("/users/list"));
        assert_eq!(normalize("/../..").as_deref(), Some("/"));
    }

    #[test]
    fn strips_rpc_suffix() {
        assert_eq!(normalize("/dispatch/echo.rpc").as_deref(), Some("/dispatch/echo"));
        assert_eq!(normalize("/dispatch/echo.rpc.rpc").as_deref(), Some("/dispatch/echo"));
    }

    #[test]
    fn already_normalized_is_unchanged() {
        for bind in ["/users", "/users/list", "/", "/a/b/c"] {
            assert_eq!(normalize(bind).as_deref(), Some(bind));
        }
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(path in ".{0,64}") {
            if let Some(once) = normalize(&path) {
                let twice = normalize(&once);
                prop_assert_eq!(twice.as_deref(), Some(once.as_str()));
            }
        }

        #[test]
        fn normalized_output_starts_with_slash(path in ".{1,64}") {
            if let Some(bind) = normalize(&path) {
                prop_assert!(bind.starts_with('/'));
                prop_assert!(bind == "/" || !bind.ends_with('/'));
            }
        }
    }
}
