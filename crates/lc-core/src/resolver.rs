use std::{sync::Arc, time::Duration};

use scraper::{Html, Selector};
use tokio::time::sleep;
use url::Url;

use crate::{
    config::Config,
    domain::{ContentFamily, ResolvedLink},
    errors::Error,
    formatting::truncate_chars,
    ports::{HttpFetcher, SocialCard, SocialCardService},
    Result,
};

pub const TITLE_MAX_CHARS: usize = 100;
pub const UNTITLED: &str = "Untitled";

const SOCIAL_HOSTS: &[&str] = &["twitter.com", "x.com"];

#[derive(Clone, Copy, Debug)]
pub struct ResolverConfig {
    pub timeout: Duration,
    /// Sleep before every fetch.
    pub pacing: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            pacing: Duration::from_secs(1),
        }
    }
}

impl From<&Config> for ResolverConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            timeout: cfg.fetch_timeout,
            pacing: cfg.fetch_pacing,
        }
    }
}

/// Fetches URLs and normalizes them into `ResolvedLink`s.
pub struct ContentResolver {
    fetcher: Arc<dyn HttpFetcher>,
    social: Option<Arc<dyn SocialCardService>>,
    cfg: ResolverConfig,
}

impl ContentResolver {
    pub fn new(
        fetcher: Arc<dyn HttpFetcher>,
        social: Option<Arc<dyn SocialCardService>>,
        cfg: ResolverConfig,
    ) -> Self {
        Self {
            fetcher,
            social,
            cfg,
        }
    }

    /// Resolve `raw_url`. Never fails: every error becomes `Unresolved`.
    pub async fn resolve(&self, raw_url: &str) -> ResolvedLink {
        match self.try_resolve(raw_url).await {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(url = raw_url, error = %e, "link unresolved");
                ResolvedLink::unresolved(raw_url)
            }
        }
    }

    async fn try_resolve(&self, raw_url: &str) -> Result<ResolvedLink> {
        let parsed = validate(raw_url)?;

        if is_social_host(&parsed) {
            if let Some(social) = &self.social {
                sleep(self.cfg.pacing).await;
                let card = social.card(parsed.as_str()).await?;
                return Ok(link_from_card(raw_url, card));
            }
        }

        sleep(self.cfg.pacing).await;
        let resp = self.fetcher.get(parsed.as_str(), self.cfg.timeout).await?;
        if !resp.is_success() {
            return Err(Error::fetch_status(resp.status));
        }
        Ok(parse_page(raw_url, &resp.body))
    }
}

/// Require scheme + authority. `Url` serialization percent-encodes the rest.
pub fn validate(raw_url: &str) -> Result<Url> {
    let parsed = Url::parse(raw_url.trim()).map_err(|e| Error::InvalidUrl(format!("{raw_url}: {e}")))?;
    if parsed.scheme().is_empty() || parsed.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(Error::InvalidUrl(format!("{raw_url}: missing authority")));
    }
    Ok(parsed)
}

pub fn is_social_host(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("mobile."))
        .unwrap_or(&host);
    SOCIAL_HOSTS.contains(&host)
}

/// Clamp to 100 chars; blank titles become "Untitled".
pub fn normalize_title(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return UNTITLED.to_string();
    }
    truncate_chars(&collapsed, TITLE_MAX_CHARS).to_string()
}

/// Parse an HTML page into a `ResolvedLink`. Missing tags are simply omitted.
pub fn parse_page(raw_url: &str, html: &str) -> ResolvedLink {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, "title")
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| raw_url.to_string());

    let mut metadata = Vec::new();
    let tags = [
        ("description", r#"meta[property="og:description"]"#),
        ("title", r#"meta[property="og:title"]"#),
        ("image", r#"meta[property="og:image"]"#),
        ("keywords", r#"meta[name="keywords"]"#),
    ];
    for (key, selector) in tags {
        let Some(content) = meta_content(&doc, selector) else {
            continue;
        };
        let value = if key == "keywords" {
            content
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            content
        };
        if !value.is_empty() {
            metadata.push((key.to_string(), value));
        }
    }

    let summary = metadata
        .iter()
        .find(|(k, _)| k == "description")
        .map(|(_, v)| v.clone())
        .or_else(|| meta_content(&doc, r#"meta[name="description"]"#))
        .unwrap_or_default();

    ResolvedLink {
        url: raw_url.to_string(),
        title: normalize_title(&title),
        summary,
        body_text: visible_text(&doc),
        metadata,
        content_family: ContentFamily::Webpage,
    }
}

fn link_from_card(raw_url: &str, card: SocialCard) -> ResolvedLink {
    let text = card
        .body_html
        .as_deref()
        .map(|html| visible_text(&Html::parse_fragment(html)))
        .unwrap_or_default();

    let title = card
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| card.author.as_ref().map(|a| format!("Post by {a}")))
        .unwrap_or_else(|| raw_url.to_string());

    let mut metadata = Vec::new();
    if let Some(author) = card.author.filter(|a| !a.trim().is_empty()) {
        metadata.push(("author".to_string(), author));
    }

    ResolvedLink {
        url: raw_url.to_string(),
        title: normalize_title(&title),
        summary: text.clone(),
        body_text: text,
        metadata,
        content_family: ContentFamily::SocialCard,
    }
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .next()
        .map(|el| el.text().collect::<String>())
}

fn meta_content(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .filter_map(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty())
}

/// Text nodes outside `<script>`, `<style>`, `<noscript>` and `<head>`, with
/// whitespace collapsed.
fn visible_text(doc: &Html) -> String {
    let mut words: Vec<&str> = Vec::new();
    for node in doc.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| matches!(e.name(), "script" | "style" | "noscript" | "head" | "template"))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }
        words.extend(text.split_whitespace());
    }
    words.join(" ")
}
