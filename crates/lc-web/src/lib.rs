//! HTTP adapters: page fetching and oEmbed social cards.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use lc_core::{
    errors::Error,
    ports::{FetchResponse, HttpFetcher, SocialCard, SocialCardService},
    Result,
};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; LinkCurator/0.1)";

fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::External(format!("http client build error: {e}")))
}

fn transport_error(e: reqwest::Error) -> Error {
    let reason = if e.is_timeout() {
        "timed out".to_string()
    } else {
        e.to_string()
    };
    Error::Fetch {
        status: e.status().map(|s| s.as_u16()),
        reason,
    }
}

/// `HttpFetcher` over reqwest. Redirects are followed.
#[derive(Clone, Debug)]
pub struct ReqwestFetcher {
    http: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self { http: client()? })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchResponse> {
        let resp = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = resp.text().await.map_err(transport_error)?;
        tracing::debug!(url, status, bytes = body.len(), "fetched");
        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    title: Option<String>,
    author_name: Option<String>,
    html: Option<String>,
}

impl From<OEmbedResponse> for SocialCard {
    fn from(r: OEmbedResponse) -> Self {
        let present = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
        SocialCard {
            title: present(r.title),
            author: present(r.author_name),
            body_html: present(r.html),
        }
    }
}

/// oEmbed client for social posts (`GET {endpoint}?url=...`).
#[derive(Clone, Debug)]
pub struct OEmbedClient {
    endpoint: Url,
    token: Option<String>,
    timeout: Duration,
    http: reqwest::Client,
}

impl OEmbedClient {
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("invalid oEmbed endpoint '{endpoint}': {e}")))?;
        Ok(Self {
            endpoint,
            token,
            timeout,
            http: client()?,
        })
    }

    fn request_url(&self, post_url: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("url", post_url)
            .append_pair("omit_script", "true");
        url
    }
}

#[async_trait]
impl SocialCardService for OEmbedClient {
    async fn card(&self, url: &str) -> Result<SocialCard> {
        let mut req = self.http.get(self.request_url(url)).timeout(self.timeout);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(transport_error)?;
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited {
                retry_after: Duration::from_secs(1),
            });
        }
        if !status.is_success() {
            return Err(Error::fetch_status(status.as_u16()));
        }
        let body = resp.text().await.map_err(transport_error)?;
        parse_card(&body)
    }
}

fn parse_card(body: &str) -> Result<SocialCard> {
    let parsed: OEmbedResponse = serde_json::from_str(body)?;
    Ok(parsed.into())
}
