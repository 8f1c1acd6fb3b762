//! Wandbox-style option string translation
//!
//! Turns a comma-separated option string like `"warning-all,std=c++20"` into
//! compiler flags. Known options map through a fixed table; unknown tokens
//! pass through only when composed of a safe character set, and anything
//! else is dropped rather than escaped so no shell metacharacter ever
//! reaches the compiler invocation.

/// Flags for one known option token, `None` when unrecognized
fn known_option(token: &str) -> Option<&'static [&'static str]> {
    match token {
        "warning-all" => Some(&["-Wall"]),
        "warning-extra" => Some(&["-Wextra"]),
        "pedantic" => Some(&["-pedantic"]),
        "pedantic-errors" | "cpp-pedantic-errors" => Some(&["-pedantic-errors"]),
        "optimize" => Some(&["-O2"]),
        "optimize-o3" => Some(&["-O3"]),
        "std=c++14" | "c++14" => Some(&["-std=c++14"]),
        "std=c++17" | "c++17" => Some(&["-std=c++17"]),
        "std=c++20" | "c++20" => Some(&["-std=c++20"]),
        "std=c++23" | "c++23" => Some(&["-std=c++23"]),
        _ => None,
    }
}

/// Allowed characters for unknown tokens (no shell metacharacters)
fn is_safe_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '=' | '.' | '+'))
}

/// Translate an option string into an ordered list of sanitized flags
pub fn parse_options(options: Option<&str>) -> Vec<String> {
    let Some(options) = options else {
        return Vec::new();
    };

    let mut flags = Vec::new();
    for token in options.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if let Some(known) = known_option(&token.to_lowercase()) {
            flags.extend(known.iter().map(|f| f.to_string()));
            continue;
        }
        if is_safe_token(token) {
            if token.starts_with('-') {
                flags.push(token.to_string());
            } else {
                flags.push(format!("-{}", token));
            }
        }
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_options() {
        assert_eq!(
            parse_options(Some("warning-all,std=c++17")),
            vec!["-Wall", "-std=c++17"]
        );
        assert_eq!(parse_options(Some("c++20,optimize")), vec!["-std=c++20", "-O2"]);
    }

    #[test]
    fn test_unsafe_token_is_dropped_not_escaped() {
        assert_eq!(
            parse_options(Some("warning-all,std=c++20,rm -rf /")),
            vec!["-Wall", "-std=c++20"]
        );
        assert_eq!(parse_options(Some("$(reboot)")), Vec::<String>::new());
        assert_eq!(parse_options(Some("a;b")), Vec::<String>::new());
    }

    #[test]
    fn test_unknown_safe_token_gains_dash() {
        assert_eq!(parse_options(Some("fno-exceptions")), vec!["-fno-exceptions"]);
        assert_eq!(parse_options(Some("-O1")), vec!["-O1"]);
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert_eq!(parse_options(None), Vec::<String>::new());
        assert_eq!(parse_options(Some("")), Vec::<String>::new());
        assert_eq!(parse_options(Some(" , ,")), Vec::<String>::new());
        assert_eq!(parse_options(Some(" warning-all ")), vec!["-Wall"]);
    }

    #[test]
    fn test_known_lookup_is_case_insensitive() {
        assert_eq!(parse_options(Some("Warning-All")), vec!["-Wall"]);
    }
}
