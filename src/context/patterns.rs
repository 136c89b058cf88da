//! Translation of user pattern text and `.gitignore` content into glob patterns
//!
//! Every entry is anchored at any depth (`**/entry`) and expanded into two
//! globs: the entry itself and its contents (`entry/**`), so `src` selects both
//! a file called `src` and everything below a directory called `src`.
//!
//! Negated gitignore entries (`!pattern`) are not supported and are dropped.

use indexmap::IndexSet;
use std::fmt;

const ANY_DEPTH: &str = "**/";

/// Turn a comma separated list such as `"src, *.md"` into glob patterns
pub fn string_to_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| anchor(entry, false))
        .flat_map(expand)
        .collect()
}

/// Turn the content of a `.gitignore` file into glob patterns
pub fn gitignore_to_patterns(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with('#'))
        .filter(|line| !line.starts_with('!'))
        .map(|line| anchor(line, true))
        .flat_map(expand)
        .collect()
}

fn anchor(entry: &str, root_anchor: bool) -> String {
    if entry.starts_with(ANY_DEPTH) {
        return entry.to_string();
    }
    if root_anchor {
        if let Some(rooted) = entry.strip_prefix('/') {
            return rooted.to_string();
        }
    }
    format!("{}{}", ANY_DEPTH, entry)
}

fn expand(pattern: String) -> [String; 2] {
    let contents = if pattern.ends_with('/') {
        format!("{}**", pattern)
    } else {
        format!("{}/**", pattern)
    };
    [pattern, contents]
}

/// Ordered, duplicate-free collection of glob patterns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternSet {
    patterns: IndexSet<String>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add patterns, keeping the first occurrence of duplicates
    pub fn extend<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns.extend(patterns.into_iter().map(Into::into));
    }

    /// Combine with another set, keeping this set's patterns first
    pub fn union(mut self, other: PatternSet) -> Self {
        self.patterns.extend(other.patterns);
        self
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(String::as_str)
    }

    /// Combine the set into one alternation group
    pub fn into_group(self) -> PatternGroup {
        PatternGroup {
            members: self.patterns.into_iter().collect(),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for PatternSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

/// A set of globs combined into a single alternation such as `{a,b}`
///
/// The group keeps its members so a search backend can compile them one by
/// one; `Display` renders the brace form used in logs and by hosts that take
/// the alternation as a single string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternGroup {
    members: Vec<String>,
}

impl PatternGroup {
    pub fn members(&self) -> &[String] {
        &self.members
    }
}

impl fmt::Display for PatternGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.members.is_empty() {
            return Ok(());
        }
        write!(f, "{{{}}}", self.members.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_entry_expands_to_two_patterns() {
        assert_eq!(string_to_patterns("src"), vec!["**/src", "**/src/**"]);
        assert_eq!(string_to_patterns("*.txt"), vec!["**/*.txt", "**/*.txt/**"]);
    }

    #[test]
    fn test_trailing_slash_entry() {
        assert_eq!(string_to_patterns("build/"), vec!["**/build/", "**/build/**"]);
    }

    #[test]
    fn test_already_anchored_entry_is_kept() {
        assert_eq!(string_to_patterns("**/docs"), vec!["**/docs", "**/docs/**"]);
    }

    #[test]
    fn test_user_string_keeps_leading_slash() {
        assert_eq!(string_to_patterns("/src"), vec!["**//src", "**//src/**"]);
    }

    #[test]
    fn test_comma_list_trims_and_drops_empty_entries() {
        assert_eq!(
            string_to_patterns(" src , ,*.md,"),
            vec!["**/src", "**/src/**", "**/*.md", "**/*.md/**"]
        );
        assert!(string_to_patterns("").is_empty());
        assert!(string_to_patterns("  ,  , ").is_empty());
    }

    #[test]
    fn test_gitignore_filters_comments_negations_and_blanks() {
        let content = "# deps\nnode_modules\n\n   \n!keep.log\n*.log\r\n/dist\n**/tmp/\n";
        let patterns = gitignore_to_patterns(content);
        assert_eq!(
            patterns,
            vec![
                "**/node_modules",
                "**/node_modules/**",
                "**/*.log",
                "**/*.log/**",
                "dist",
                "dist/**",
                "**/tmp/",
                "**/tmp/**",
            ]
        );
        assert!(patterns.iter().all(|p| !p.contains('#') && !p.contains('!')));
    }

    #[test]
    fn test_gitignore_empty_content() {
        assert!(gitignore_to_patterns("").is_empty());
        assert!(gitignore_to_patterns("\n\n# only comments\n").is_empty());
    }

    #[test]
    fn test_pattern_set_union_dedupes_in_order() {
        let a: PatternSet = string_to_patterns("src, lib").into_iter().collect();
        let b: PatternSet = string_to_patterns("lib, .git").into_iter().collect();
        let combined = a.union(b);
        assert_eq!(
            combined.iter().collect::<Vec<_>>(),
            vec![
                "**/src",
                "**/src/**",
                "**/lib",
                "**/lib/**",
                "**/.git",
                "**/.git/**"
            ]
        );
    }

    #[test]
    fn test_group_display() {
        let group: PatternGroup = string_to_patterns("src").into_iter().collect::<PatternSet>().into_group();
        assert_eq!(group.to_string(), "{**/src,**/src/**}");
        assert_eq!(PatternSet::new().into_group().to_string(), "");
    }
}
