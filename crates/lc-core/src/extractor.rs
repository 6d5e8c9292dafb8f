use std::sync::OnceLock;

use regex::Regex;

use crate::domain::LinkCandidate;

// scheme, then one of: bracketed IPv6, IPv4, localhost, dotted hostname;
// optional port; optional path/query/fragment.
const URL_PATTERN: &str = r#"(?i)\b(?:https?|ftp)://(?:\[[0-9a-f:.]+\]|(?:\d{1,3}\.){3}\d{1,3}|localhost|(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9-]{2,}\.?)(?::\d{1,5})?(?:[/?#][^\s<>"]*)?"#;

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(URL_PATTERN).expect("url pattern compiles"))
}

/// All URLs in `text`, in order of appearance, duplicates included.
pub fn extract_urls(text: &str) -> Vec<String> {
    url_regex()
        .find_iter(text)
        .map(|m| trim_trailing(m.as_str()).to_string())
        .collect()
}

pub fn extract_candidates(text: &str) -> Vec<LinkCandidate> {
    extract_urls(text)
        .into_iter()
        .map(|raw_url| LinkCandidate {
            raw_url,
            source_text: text.to_string(),
        })
        .collect()
}

/// Strip sentence punctuation and an unbalanced closing paren.
fn trim_trailing(url: &str) -> &str {
    let mut out = url;
    loop {
        let Some(last) = out.chars().last() else {
            return out;
        };
        let strip = match last {
            '.' | ',' | ';' | ':' | '!' | '?' | '\'' | '*' => true,
            ')' => out.matches(')').count() > out.matches('(').count(),
            _ => false,
        };
        if !strip {
            return out;
        }
        out = &out[..out.len() - last.len_utf8()];
    }
}
