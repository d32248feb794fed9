//! Rename rules: a newline-separated text mapping module-name patterns to
//! replacement canonical names, applied during resolution.

use crate::name::{ModuleName, ResolvedModuleName};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRule {
    pub pattern: String,
    pub replacement: String,
}

impl RenameRule {
    /// Parse a newline-separated rename file: one `pattern replacement`
    /// pair per line, whitespace-separated, blank lines and `#` comments
    /// ignored.
    pub fn parse_rules(text: &str) -> Vec<RenameRule> {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let pattern = parts.next()?;
                let replacement = parts.next()?;
                Some(RenameRule {
                    pattern: pattern.to_string(),
                    replacement: replacement.to_string(),
                })
            })
            .collect()
    }

    /// Apply the first matching rule (exact pattern match against the
    /// canonical name) to `name`, producing a [`ResolvedModuleName`].
    pub fn resolve(rules: &[RenameRule], name: ModuleName) -> ResolvedModuleName {
        for rule in rules {
            if rule.pattern == name.canonical() {
                if let Ok(renamed) = ModuleName::parse(&rule.replacement) {
                    return ResolvedModuleName { name: renamed, is_rename: true };
                }
            }
        }
        ResolvedModuleName { name, is_rename: false }
    }
}
