use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use tracing::debug;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Source of fully rendered catalog pages.
pub trait PageSource {
    /// Load `url` and return its HTML once an element matching `ready` is present.
    fn rendered(&self, url: &str, ready: &str) -> Result<String>;
}

pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Plain HTTP page source. The catalog markup is server-rendered, so waiting
/// reduces to a fixed settle delay followed by a single presence check.
pub struct HttpPageSource {
    client: Client,
    settle: Duration,
}

impl HttpPageSource {
    pub fn new(client: Client, settle: Duration) -> Self {
        HttpPageSource { client, settle }
    }
}

impl PageSource for HttpPageSource {
    fn rendered(&self, url: &str, ready: &str) -> Result<String> {
        debug!("GET {}", url);
        let html = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Failed to load {}", url))?
            .error_for_status()?
            .text()?;

        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }

        if !contains(&html, ready)? {
            bail!("`{}` never appeared on {}", ready, url);
        }
        Ok(html)
    }
}

fn contains(html: &str, css: &str) -> Result<bool> {
    let selector =
        Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector `{}`: {:?}", css, e))?;
    Ok(Html::parse_document(html).select(&selector).next().is_some())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_check() {
        let html = r#"<div class="resultCol"><dl class="modalCol"></dl></div>"#;
        assert!(contains(html, ".resultCol").unwrap());
        assert!(!contains(html, ".seriesCol select").unwrap());
    }

    #[test]
    fn bad_selector_is_an_error() {
        assert!(contains("<p></p>", "..nope").is_err());
    }
}
