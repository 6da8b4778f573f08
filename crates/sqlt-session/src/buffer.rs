//! Editor buffer helpers: query validation and solution insertion.

use crate::client::Solution;

/// SQL line comment marker.
pub const COMMENT_MARKER: &str = "-- ";

/// Description lines are wrapped once they reach this many characters.
const DESCRIPTION_WIDTH: usize = 36;

/// Returns `true` if the trimmed query has at least `min_len` characters.
///
/// # Examples
///
/// ```
/// use sqlt_session::buffer::is_runnable;
///
/// assert!(is_runnable("SELECT 1", 3));
/// assert!(!is_runnable("  ab \n", 3));
/// ```
#[must_use]
pub fn is_runnable(query: &str, min_len: usize) -> bool {
    query.trim().chars().count() >= min_len
}

/// Prefixes every line of `text` with a SQL comment marker.
#[must_use]
pub fn comment_out(text: &str) -> String {
    text.split('\n')
        .map(|line| format!("{COMMENT_MARKER}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wraps one description paragraph into commented lines.
fn wrap_description(paragraph: &str, out: &mut String) {
    let mut line = String::new();
    for word in paragraph.split_whitespace() {
        if !line.is_empty() && line.len() >= DESCRIPTION_WIDTH {
            out.push_str(COMMENT_MARKER);
            out.push_str(&line);
            out.push('\n');
            line.clear();
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    out.push_str(COMMENT_MARKER);
    out.push_str(&line);
    out.push('\n');
}

/// Renders reference solutions as an executable listing.
///
/// Each solution is introduced by `-- i)`, followed by its commented,
/// word-wrapped description, a blank line, the SQL and a blank line.
#[must_use]
pub fn solution_listing(solutions: &[Solution]) -> String {
    let mut out = String::new();
    for (i, solution) in solutions.iter().enumerate() {
        out.push_str(&format!("{COMMENT_MARKER}{})\n", i + 1));
        if let Some(description) = solution.description.as_deref() {
            for paragraph in description.lines() {
                wrap_description(paragraph, &mut out);
            }
        }
        out.push('\n');
        out.push_str(&solution.sql);
        out.push_str("\n\n");
    }
    out
}

/// Builds the buffer shown after requesting the solution.
///
/// The learner's text is commented out and the solution listing is appended
/// beneath a `Solution:` / `Solutions:` header.
///
/// # Examples
///
/// ```
/// use sqlt_session::buffer::with_solutions;
/// use sqlt_session::Solution;
///
/// let text = with_solutions("SELECT *\nFROM t", &[Solution {
///     description: None,
///     sql: "SELECT id FROM t;".into(),
/// }]);
/// assert!(text.starts_with("-- SELECT *\n-- FROM t\n-- Solution:\n-- 1)\n"));
/// assert!(text.contains("\nSELECT id FROM t;\n"));
/// ```
#[must_use]
pub fn with_solutions(current: &str, solutions: &[Solution]) -> String {
    let header = if solutions.len() == 1 {
        "Solution:"
    } else {
        "Solutions:"
    };
    format!(
        "{}\n{COMMENT_MARKER}{header}\n{}",
        comment_out(current),
        solution_listing(solutions)
    )
}
