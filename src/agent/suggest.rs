//! Keyword heuristics for turning an intent into shell commands
//!
//! No backend is consulted; the same intent always yields the same list.

/// One suggestion category: any keyword hit adds every command in order.
struct Category {
    keywords: &'static [&'static str],
    commands: &'static [&'static str],
}

/// Categories in the fixed order their suggestions are emitted.
const CATEGORIES: &[Category] = &[
    Category {
        keywords: &["list", "show", "ls"],
        commands: &["ls -la"],
    },
    Category {
        keywords: &["find", "search"],
        commands: &[r#"find . -name "*" -type f"#],
    },
    Category {
        keywords: &["grep", "search", "find in files"],
        commands: &[r#"grep -r "pattern" ."#],
    },
    Category {
        keywords: &["git", "repository"],
        commands: &["git status", "git log --oneline"],
    },
    Category {
        keywords: &["process", "ps"],
        commands: &["ps aux"],
    },
];

/// Suggest shell commands for a free-text intent
///
/// Categories match independently on case-sensitive substrings, so one
/// intent can trigger several of them. Output is not deduplicated.
pub fn suggest_commands(intent: &str) -> Vec<String> {
    CATEGORIES
        .iter()
        .filter(|c| c.keywords.iter().any(|k| intent.contains(k)))
        .flat_map(|c| c.commands.iter().map(|cmd| cmd.to_string()))
        .collect()
}
