//! Terminal output helpers. Logs go through `log`; these are for the user.

use colored::{ColoredString, Colorize};
use reconcile::Phase;

pub fn info(msg: &str) {
    println!("{} {msg}", "ℹ".blue());
}

pub fn success(msg: &str) {
    println!("{} {msg}", "✓".green());
}

pub fn warn(msg: &str) {
    println!("{} {msg}", "⚠".yellow());
}

/// Errors go to stderr
pub fn error(msg: &str) {
    eprintln!("{} {msg}", "✗".red());
}

pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Bold title with an underline as wide as the title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

pub fn kv(key: &str, value: &str) {
    println!("  {}: {value}", key.dimmed());
}

/// Marker for a cycle's terminal phase
pub fn phase_marker(phase: Phase) -> ColoredString {
    match phase {
        Phase::Committed => "✓".green(),
        Phase::NotFound => "-".yellow(),
        Phase::Failed => "✗".red(),
        _ => "·".dimmed(),
    }
}

/// Shorten an identity for one-line display, keeping both ends
pub fn truncate_middle(text: &str, max_len: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len || max_len < 5 {
        return text.to_string();
    }
    let keep = max_len - 3;
    let head = keep / 2;
    let tail = keep - head;
    let start: String = chars[..head].iter().collect();
    let end: String = chars[chars.len() - tail..].iter().collect();
    format!("{start}...{end}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_middle() {
        assert_eq!(truncate_middle("short", 10), "short");
        assert_eq!(truncate_middle("arn:a,arn:b", 9), "arn...n:b");
        assert_eq!(truncate_middle("arn:a,arn:b", 9).chars().count(), 9);
    }
}
