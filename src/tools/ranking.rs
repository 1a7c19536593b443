//! Lexical ranking shared by the search tools.

use std::collections::HashSet;

/// Lowercased alphanumeric words of at least two characters.
pub(crate) fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

/// Which of two equally scored items wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ties {
    /// The item further down the slice (newer messages).
    Later,
    /// The item further up the slice (earlier sections of a page).
    Earlier,
}

/// Every item sharing at least one term with `query`, best first. Items
/// score one point per distinct query term they contain.
pub(crate) fn rank_by_terms<'a, T>(
    items: &'a [T],
    query: &str,
    text: impl Fn(&T) -> &str,
    ties: Ties,
) -> Vec<&'a T> {
    let wanted = terms(query);
    if wanted.is_empty() {
        return Vec::new();
    }
    let mut scored: Vec<(usize, usize, &T)> = items
        .iter()
        .enumerate()
        .filter_map(|(position, item)| {
            let score = terms(text(item)).intersection(&wanted).count();
            (score > 0).then_some((score, position, item))
        })
        .collect();
    scored.sort_by(|a, b| {
        let by_position = match ties {
            Ties::Later => b.1.cmp(&a.1),
            Ties::Earlier => a.1.cmp(&b.1),
        };
        b.0.cmp(&a.0).then(by_position)
    });
    scored.into_iter().map(|(_, _, item)| item).collect()
}
