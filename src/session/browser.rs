// src/session/browser.rs
//! Session implementation backed by a remote browser-automation service
//! (Browserless-style REST surface: create a session, navigate, evaluate
//! script, delete). The scripts mirror what an operator would do by hand:
//! filter the live feed to deals, read the top rows, drive infinite scroll.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use super::{FeedSession, SessionFactory};
use crate::error::{SessionError, TraversalError};
use crate::types::{ActivityStub, RawFeedRow};

/// Uncheck Wiki, restrict the type filter to deals. Row scraping then only
/// needs a software-side fallback filter.
const FILTER_SCRIPT: &str = r#"
() => {
    function setFilterByText(text, desiredState) {
        const labels = Array.from(document.querySelectorAll('label'));
        const label = labels.find(l => l.innerText.trim() === text);
        if (label) {
            const input = label.querySelector('input');
            if (input && input.checked !== desiredState) input.click();
        }
    }
    setFilterByText('Wiki', false);
    setFilterByText('Comp', false);
    setFilterByText('Forum', false);
    setFilterByText('Deal', true);
}
"#;

/// Read the top rows of the live table as plain cell text.
const ROWS_SCRIPT: &str = r#"
() => {
    const rows = Array.from(document.querySelectorAll('tbody#livebody tr')).slice(0, 20);
    return rows.map(row => {
        const cell = n => {
            const td = row.querySelector('td:nth-child(' + n + ')');
            return td ? td.innerText.trim() : '';
        };
        const icon = row.querySelector('td:nth-child(3) i');
        const link = row.querySelector('td:nth-child(4) a');
        return {
            time_str: cell(1),
            user: cell(2),
            action: icon ? (icon.getAttribute('title') || 'Unknown') : 'Unknown',
            subject: link ? link.innerText.trim() : '',
            href: link ? link.getAttribute('href') : '',
            kind_label: cell(5),
        };
    });
}
"#;

/// One scroll step on an activity page: scroll to the bottom, then report the
/// page height and every visible activity entry.
const SCROLL_SCRIPT: &str = r#"
() => {
    window.scrollTo(0, document.body.scrollHeight);
    const entries = Array.from(document.querySelectorAll('div.activities > div'))
        .map(div => {
            const action = div.querySelector('.right .action');
            if (!action) return null;
            const links = action.querySelectorAll('a');
            if (!links.length) return null;
            return {
                text: action.innerText.trim(),
                href: links[links.length - 1].getAttribute('href') || '',
            };
        })
        .filter(e => e && e.href);
    return { height: document.body.scrollHeight, entries };
}
"#;

/// How many consecutive no-growth scroll steps mean "end of feed".
const SCROLL_STALL_LIMIT: u32 = 10;

pub struct BrowserSessionFactory {
    client: reqwest::Client,
    service_url: String,
    feed_url: String,
    base_url: String,
}

impl BrowserSessionFactory {
    pub fn new(service_url: &str, feed_url: &str) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        let base_url = origin_of(feed_url);
        Ok(Self {
            client,
            service_url: service_url.trim_end_matches('/').to_string(),
            feed_url: feed_url.to_string(),
            base_url,
        })
    }
}

/// scheme://host of a URL, used as the base for relative feed hrefs.
pub fn origin_of(url: &str) -> String {
    match url.find("://").map(|i| i + 3) {
        Some(start) => match url[start..].find('/') {
            Some(end) => url[..start + end].to_string(),
            None => url.to_string(),
        },
        None => url.to_string(),
    }
}

#[async_trait]
impl SessionFactory for BrowserSessionFactory {
    async fn acquire(&self) -> Result<Box<dyn FeedSession>, SessionError> {
        #[derive(Deserialize)]
        struct Created {
            session_id: String,
        }

        let rsp = self
            .client
            .post(format!("{}/sessions", self.service_url))
            .json(&json!({ "url": self.feed_url }))
            .send()
            .await?;
        if !rsp.status().is_success() {
            return Err(SessionError::Navigation(format!(
                "session create returned {}",
                rsp.status()
            )));
        }
        let created: Created = rsp
            .json()
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        let mut session = BrowserSession {
            client: self.client.clone(),
            service_url: self.service_url.clone(),
            base_url: self.base_url.clone(),
            session_id: created.session_id,
            last_height: 0,
            stall_count: 0,
            seen_stubs: HashSet::new(),
            next_position: 0,
        };
        session.evaluate(FILTER_SCRIPT).await?;
        debug!(session = %session.session_id, "feed filters configured");
        Ok(Box::new(session))
    }
}

pub struct BrowserSession {
    client: reqwest::Client,
    service_url: String,
    base_url: String,
    session_id: String,
    last_height: u64,
    stall_count: u32,
    seen_stubs: HashSet<String>,
    next_position: usize,
}

impl BrowserSession {
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, SessionError> {
        let rsp = self
            .client
            .post(format!(
                "{}/sessions/{}/evaluate",
                self.service_url, self.session_id
            ))
            .json(&json!({ "expression": script }))
            .send()
            .await?;
        let status = rsp.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(SessionError::TransportClosed(
                "browser session no longer exists".into(),
            ));
        }
        if !status.is_success() {
            return Err(SessionError::Protocol(format!("evaluate returned {status}")));
        }
        rsp.json()
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))
    }

    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        let rsp = self
            .client
            .post(format!(
                "{}/sessions/{}/navigate",
                self.service_url, self.session_id
            ))
            .json(&json!({ "url": url }))
            .send()
            .await?;
        if !rsp.status().is_success() {
            return Err(SessionError::Navigation(format!(
                "navigate to {url} returned {}",
                rsp.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FeedSession for BrowserSession {
    async fn sample_feed(&mut self) -> Result<Vec<RawFeedRow>, SessionError> {
        let value = self.evaluate(ROWS_SCRIPT).await?;
        let rows: Vec<RawFeedRow> = serde_json::from_value::<Vec<RawRow>>(value)
            .map_err(|e| SessionError::Protocol(format!("decoding feed rows: {e}")))?
            .into_iter()
            .map(RawRow::into_feed_row)
            .collect();
        Ok(rows)
    }

    async fn begin_activity(&mut self, identity: &str) -> Result<(), TraversalError> {
        let url = format!("{}/user/{}", self.base_url, identity);
        self.navigate(&url)
            .await
            .map_err(|e| TraversalError::Unavailable {
                identity: identity.to_string(),
                reason: e.to_string(),
            })?;
        self.last_height = 0;
        self.stall_count = 0;
        self.seen_stubs.clear();
        self.next_position = 0;
        Ok(())
    }

    async fn next_activity_page(&mut self) -> Result<Option<Vec<ActivityStub>>, SessionError> {
        #[derive(Deserialize)]
        struct ScrollResult {
            height: u64,
            entries: Vec<RawEntry>,
        }
        #[derive(Deserialize)]
        struct RawEntry {
            text: String,
            href: String,
        }

        loop {
            let value = self.evaluate(SCROLL_SCRIPT).await?;
            let result: ScrollResult = serde_json::from_value(value)
                .map_err(|e| SessionError::Protocol(format!("decoding scroll result: {e}")))?;

            let mut fresh = Vec::new();
            for entry in result.entries {
                let url = crate::feed::canonicalize_url(&entry.href, &self.base_url);
                if !self.seen_stubs.insert(url.clone()) {
                    continue;
                }
                fresh.push(ActivityStub {
                    position: self.next_position,
                    url,
                    text: entry.text,
                });
                self.next_position += 1;
            }

            if !fresh.is_empty() {
                self.stall_count = 0;
                self.last_height = result.height;
                return Ok(Some(fresh));
            }

            if result.height == self.last_height {
                self.stall_count += 1;
                if self.stall_count >= SCROLL_STALL_LIMIT {
                    debug!(session = %self.session_id, "end of activity feed reached");
                    return Ok(None);
                }
            } else {
                self.last_height = result.height;
            }
            // The page grew (or may still grow) but revealed nothing new yet;
            // give the lazy loader a beat before re-reading.
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let rsp = self
            .client
            .delete(format!(
                "{}/sessions/{}",
                self.service_url, self.session_id
            ))
            .send()
            .await?;
        if !rsp.status().is_success() && rsp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(SessionError::Protocol(format!(
                "session delete returned {}",
                rsp.status()
            )));
        }
        Ok(())
    }
}

/// Wire shape of one row as the evaluate script returns it.
#[derive(Deserialize)]
struct RawRow {
    #[serde(default)]
    time_str: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    href: String,
    #[serde(default)]
    kind_label: String,
}

impl RawRow {
    fn into_feed_row(self) -> RawFeedRow {
        RawFeedRow {
            time_str: self.time_str,
            user: self.user,
            action: self.action,
            subject: self.subject,
            href: self.href,
            kind_label: self.kind_label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_strips_path() {
        assert_eq!(
            origin_of("https://www.ozbargain.com.au/live"),
            "https://www.ozbargain.com.au"
        );
        assert_eq!(origin_of("https://host"), "https://host");
    }
}
