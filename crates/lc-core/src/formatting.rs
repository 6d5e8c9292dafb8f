//! Text rendering for postings and user-facing replies.

use crate::domain::{OrganizeOutcome, ResolvedLink};

/// Clamp `s` to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// `key: value` lines, in metadata order.
pub fn format_metadata(metadata: &[(String, String)]) -> String {
    let mut out = String::new();
    for (key, value) in metadata {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Prefix every curated posting starts with. Used to recognize a link by its
/// leading text.
pub fn posting_prefix(title: &str) -> String {
    format!("{title} - ")
}

/// One-line entry: `"{title} - {url}"`.
pub fn render_index_line(link: &ResolvedLink) -> String {
    format!("{}{}", posting_prefix(&link.title), link.url)
}

/// Full posting: index line, then summary, then metadata. The tail is clamped
/// so the whole posting fits `max_len` characters; the index line always
/// survives.
pub fn render_posting(link: &ResolvedLink, summary: &str, max_len: usize) -> String {
    let mut out = render_index_line(link);
    let summary = summary.trim();
    if !summary.is_empty() {
        out.push('\n');
        out.push_str(summary);
    }
    let metadata = format_metadata(&link.metadata);
    if !metadata.is_empty() {
        out.push('\n');
        out.push_str(metadata.trim_end());
    }
    let head_len = render_index_line(link).chars().count();
    truncate_chars(&out, max_len.max(head_len)).to_string()
}

/// Reply sent to the channel a link was posted in.
pub fn outcome_reply(outcome: &OrganizeOutcome) -> String {
    match outcome {
        OrganizeOutcome::Added { bucket, title } => {
            format!("Link added successfully! {title} → #{bucket}")
        }
        OrganizeOutcome::AlreadyExists { title } => {
            format!("The link already exists: {title}")
        }
        OrganizeOutcome::ThreadExists { title } => {
            format!("A thread for the link already exists: {title}")
        }
        OrganizeOutcome::PermissionError { scope } => {
            format!("I don't have the necessary permissions to organize links ({scope}).")
        }
        OrganizeOutcome::Failure(reason) => format!("Could not organize the link: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContentFamily;

    fn link() -> ResolvedLink {
        ResolvedLink {
            url: "http://example.com/a".to_string(),
            title: "Example Domain".to_string(),
            summary: String::new(),
            body_text: String::new(),
            metadata: vec![
                ("description".to_string(), "An example".to_string()),
                ("keywords".to_string(), "a, b".to_string()),
            ],
            content_family: ContentFamily::Webpage,
        }
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn metadata_lines_keep_order() {
        assert_eq!(
            format_metadata(&link().metadata),
            "description: An example\nkeywords: a, b\n"
        );
    }

    #[test]
    fn posting_starts_with_index_line() {
        let text = render_posting(&link(), "A short summary.", 2000);
        assert_eq!(
            text,
            "Example Domain - http://example.com/a\nA short summary.\ndescription: An example\nkeywords: a, b"
        );
    }

    #[test]
    fn long_postings_keep_the_url() {
        let summary = "x".repeat(5000);
        let text = render_posting(&link(), &summary, 100);
        assert_eq!(text.chars().count(), 100);
        assert!(text.starts_with("Example Domain - http://example.com/a\n"));
    }
}
