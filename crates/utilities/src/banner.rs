// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Boxed banners for command output
//!
//! A banner is a fixed-width box with an optional title followed by rows of
//! left- and right-justified fields.

/// Outer width of a banner, borders included
pub const BANNER_WIDTH: usize = 64;

/// Characters available between the "║ " and " ║" borders
const INNER: usize = BANNER_WIDTH - 2;

const ELLIPSIS: &str = "...";

fn border(left: char, right: char) -> String {
    let mut line = String::with_capacity(BANNER_WIDTH * 3);
    line.push(left);
    line.extend(std::iter::repeat_n('═', BANNER_WIDTH));
    line.push(right);
    line.push('\n');
    line
}

/// Shorten `text` to `width` characters, marking the cut with "..."
fn fit(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let keep = width.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

fn row(content: &str) -> String {
    format!("║ {:<INNER$} ║\n", fit(content, INNER))
}

/// One content row with `left` flush left and `right` flush right.
///
/// When both do not fit together the right field is dropped.
fn split_row(left: &str, right: &str) -> String {
    let used = left.chars().count() + right.chars().count();
    if used >= INNER {
        return row(left);
    }
    format!("║ {left}{:pad$}{right} ║\n", "", pad = INNER - used)
}

/// A banner holding only `title`
#[must_use]
pub fn format_banner_title(title: &str) -> String {
    format_banner_with_fields(Some(title), Vec::new())
}

/// A banner with an optional title and rows of `(left, right)` fields.
///
/// Either side of a row may be absent; a row with neither is blank.
#[must_use]
pub fn format_banner_with_fields(
    title: Option<&str>,
    lines: Vec<(Option<String>, Option<String>)>,
) -> String {
    let mut output = border('╔', '╗');
    if let Some(title) = title {
        output.push_str(&row(title));
    }
    for line in lines {
        let text = match line {
            (Some(left), Some(right)) => split_row(&left, &right),
            (Some(left), None) => row(&left),
            (None, Some(right)) => format!("║ {:>INNER$} ║\n", fit(&right, INNER)),
            (None, None) => row(""),
        };
        output.push_str(&text);
    }
    output.push_str(&border('╚', '╝'));
    output
}

/// A banner from parallel iterators of left and right fields; the shorter
/// side is padded with absent fields
#[must_use]
pub fn format_banner_from_iters<L, R>(title: Option<&str>, left: L, right: R) -> String
where
    L: IntoIterator<Item = String>,
    R: IntoIterator<Item = String>,
{
    let mut left = left.into_iter();
    let mut right = right.into_iter();
    let mut lines = Vec::new();
    loop {
        match (left.next(), right.next()) {
            (None, None) => break,
            pair => lines.push(pair),
        }
    }
    format_banner_with_fields(title, lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widths(banner: &str) -> Vec<usize> {
        banner.lines().map(|l| l.chars().count()).collect()
    }

    #[test]
    fn test_title_only() {
        let banner = format_banner_title("Downlink scheduler");
        let lines: Vec<&str> = banner.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('╔'));
        assert!(lines[1].contains("Downlink scheduler"));
        assert!(lines[2].ends_with('╝'));
        assert!(widths(&banner).iter().all(|w| *w == BANNER_WIDTH + 2));
    }

    #[test]
    fn test_left_and_right_fields() {
        let banner = format_banner_with_fields(
            Some("Uplink scheduler"),
            vec![
                (Some("files: 3".to_string()), Some("rows: 1200".to_string())),
                (Some("first: 10:00:00".to_string()), None),
                (None, Some("skipped: 1".to_string())),
                (None, None),
            ],
        );
        let lines: Vec<&str> = banner.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[2].starts_with("║ files: 3"));
        assert!(lines[2].ends_with("rows: 1200 ║"));
        assert!(lines[4].ends_with("skipped: 1 ║"));
        assert_eq!(lines[5].trim_matches(|c| c == '║' || c == ' '), "");
        assert!(widths(&banner).iter().all(|w| *w == BANNER_WIDTH + 2));
    }

    #[test]
    fn test_long_fields_are_truncated() {
        let long = "é".repeat(80);
        let banner = format_banner_with_fields(None, vec![(Some(long.clone()), Some("x".to_string()))]);
        let lines: Vec<&str> = banner.lines().collect();
        assert!(lines[1].contains("..."));
        assert!(!lines[1].contains('x'));
        assert!(widths(&banner).iter().all(|w| *w == BANNER_WIDTH + 2));
    }

    #[test]
    fn test_from_iters_pads_shorter_side() {
        let banner = format_banner_from_iters(
            Some("Cells"),
            ["cell 1".to_string(), "cell 2".to_string()],
            ["40 UEs".to_string()],
        );
        let lines: Vec<&str> = banner.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[2].ends_with("40 UEs ║"));
        assert!(lines[3].starts_with("║ cell 2"));
    }
}
