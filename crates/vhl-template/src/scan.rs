//! Line-oriented scans over netlist bodies.

/// Sub-circuit names declared with `.subckt`, in order of appearance.
pub fn extract_subcircuits(body: &str) -> Vec<String> {
    directive_arguments(body, ".subckt")
        .map(str::to_string)
        .collect()
}

/// Files referenced with `.include`, quotes removed.
pub fn extract_includes(body: &str) -> Vec<String> {
    directive_arguments(body, ".include")
        .map(|path| path.trim_matches(|c| c == '"' || c == '\'').to_string())
        .collect()
}

/// A forbidden directive found in rendered text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForbiddenHit {
    /// One-based line number.
    pub line: usize,
    pub directive: String,
}

/// Lines whose leading token is one of `forbidden`.
///
/// Matching ignores case and an optional leading dot, so `shell`, `.shell`
/// and `SHELL` are all caught by a single `shell` entry.
pub fn find_forbidden(text: &str, forbidden: &[String]) -> Vec<ForbiddenHit> {
    if forbidden.is_empty() {
        return Vec::new();
    }
    text.lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let token = line.split_whitespace().next()?;
            let bare = token.trim_start_matches('.');
            forbidden
                .iter()
                .find(|directive| {
                    directive
                        .trim_start_matches('.')
                        .eq_ignore_ascii_case(bare)
                })
                .map(|directive| ForbiddenHit {
                    line: idx + 1,
                    directive: directive.clone(),
                })
        })
        .collect()
}

fn directive_arguments<'a>(body: &'a str, directive: &'a str) -> impl Iterator<Item = &'a str> {
    body.lines().filter_map(move |line| {
        let mut parts = line.split_whitespace();
        let head = parts.next()?;
        if head.to_ascii_lowercase().starts_with(directive) {
            parts.next()
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcircuits_are_case_insensitive() {
        let body = "\n    .subckt my_sub 1 2\n    R1 1 2 1k\n    .ends\n    .SUBCKT another_sub 3 4\n    C1 3 4 1u\n    .ENDS\n";
        assert_eq!(extract_subcircuits(body), vec!["my_sub", "another_sub"]);
    }

    #[test]
    fn includes_strip_quotes() {
        let body = "\n.include \"model.lib\"\n.INCLUDE 'other.cir'\nR1 1 0 1k\n.include sub/path/file.inc\n";
        assert_eq!(
            extract_includes(body),
            vec!["model.lib", "other.cir", "sub/path/file.inc"]
        );
    }

    #[test]
    fn bare_directive_without_argument_is_skipped() {
        assert!(extract_subcircuits(".subckt\n").is_empty());
    }

    #[test]
    fn forbidden_matches_leading_token_only() {
        let text = ".control\nshell rm -rf /\necho shell\n.SHELL ls\n.endc";
        let hits = find_forbidden(text, &["shell".to_string()]);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].line, 2);
        assert_eq!(hits[1].line, 4);
    }
}
