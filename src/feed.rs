// src/feed.rs
//! Normalization of raw live-feed rows: relative-time parsing, URL
//! canonicalization, and title cleanup. Everything here is pure so the feed
//! poller stays a thin loop.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::types::{FeedRow, FeedRowKind, RawFeedRow};

/// Parse the feed's relative time column ("just now", "5 min ago",
/// "2 hours ago") against `now`. Unparseable input falls back to `now`.
pub fn parse_relative_time(time_str: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let s = time_str.trim().to_ascii_lowercase();
    if s.contains("now") {
        return now;
    }

    let mut parts = s.split_whitespace();
    let val: i64 = match parts.next().and_then(|v| v.parse().ok()) {
        Some(v) => v,
        None => return now,
    };
    let unit = match parts.next() {
        Some(u) => u,
        None => return now,
    };

    let delta = if unit.starts_with("sec") {
        Duration::seconds(val)
    } else if unit.starts_with("min") {
        Duration::minutes(val)
    } else if unit.starts_with("hour") {
        Duration::hours(val)
    } else if unit.starts_with("day") {
        Duration::days(val)
    } else {
        Duration::zero()
    };

    now - delta
}

/// Canonicalize a row's href: prefix relative paths with the site base and
/// strip `/redir` suffixes from node URLs so the same deal always resolves to
/// the same URL. Comment URLs are left intact (they lead to the node).
pub fn canonicalize_url(href: &str, base_url: &str) -> String {
    let mut url = if href.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), href)
    } else {
        href.to_string()
    };

    if url.contains("/node/") {
        if url.ends_with("/redir") {
            url = url.replace("/redir", "");
        } else if url.contains("/redir?") {
            url = url.replace("/redir?", "?");
        }
    }
    url
}

/// Extract the canonical id ("node/123" or "comment/456") from a URL.
pub fn item_id_from_url(url: &str) -> Option<String> {
    static RE_ID: OnceCell<Regex> = OnceCell::new();
    let re = RE_ID.get_or_init(|| {
        Regex::new(r"(node|comment)/(\d+)").expect("static id regex")
    });
    re.captures(url)
        .map(|c| format!("{}/{}", &c[1], &c[2]))
}

/// Extract the parent node id carried in a comment URL fragment
/// ("/node/123#comment-456" style).
pub fn parent_id_from_url(url: &str) -> Option<String> {
    if !url.contains("#comment-") {
        return None;
    }
    item_id_from_url(url.split('#').next().unwrap_or(url))
        .filter(|id| id.starts_with("node/"))
}

/// Extract a stable comment reference from either URL form:
/// "/node/123#comment-456" or "/comment/456".
pub fn comment_ref_from_url(url: &str) -> Option<String> {
    if let Some(frag) = url.split("#comment-").nth(1) {
        let digits: String = frag.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            return Some(format!("comment-{digits}"));
        }
    }
    item_id_from_url(url)
        .filter(|id| id.starts_with("comment/"))
        .map(|id| id.replace('/', "-"))
}

/// Clean a scraped title: decode HTML entities, collapse whitespace, cap
/// length. Mirrors what the extraction service does for descriptions.
pub fn clean_title(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("static ws regex"));

    let decoded = html_escape::decode_html_entities(s).to_string();
    let mut out = re_ws.replace_all(&decoded, " ").trim().to_string();
    if out.chars().count() > 300 {
        out = out.chars().take(300).collect();
    }
    out
}

/// Titles the site serves while bot-walling a request; never worth keeping
/// over what the feed row already showed.
pub fn is_placeholder_title(title: &str) -> bool {
    let t = title.trim();
    t.is_empty()
        || t == "OzBargain"
        || t == "www.ozbargain.com.au"
        || t.starts_with("Performing security verification")
}

fn row_kind(action: &str) -> FeedRowKind {
    let a = action.to_ascii_lowercase();
    if a.contains("comment") || a.contains("replied") {
        FeedRowKind::Comment
    } else if a.contains("vote") {
        FeedRowKind::Vote
    } else {
        FeedRowKind::Post
    }
}

/// Turn a raw row into a processable `FeedRow`. Returns `None` for rows the
/// poller should ignore entirely: non-deal types and rows without a target.
pub fn normalize_row(raw: &RawFeedRow, base_url: &str, now: DateTime<Utc>) -> Option<FeedRow> {
    if raw.kind_label.trim() != "Deal" {
        return None;
    }
    if raw.href.trim().is_empty() {
        return None;
    }

    let url = canonicalize_url(raw.href.trim(), base_url);
    let id = item_id_from_url(&url).unwrap_or_else(|| url.clone());
    let parent_id = parent_id_from_url(&url);
    let kind = row_kind(&raw.action);

    let user = raw.user.trim();
    Some(FeedRow {
        id,
        parent_id,
        url,
        title: clean_title(&raw.subject),
        posted_by: (!user.is_empty()).then(|| user.to_string()),
        kind,
        observed_at: parse_relative_time(&raw.time_str, now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const BASE: &str = "https://www.ozbargain.com.au";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn relative_time_units() {
        let now = t0();
        assert_eq!(parse_relative_time("just now", now), now);
        assert_eq!(parse_relative_time("5 min ago", now), now - Duration::minutes(5));
        assert_eq!(parse_relative_time("2 hours ago", now), now - Duration::hours(2));
        assert_eq!(parse_relative_time("garbage", now), now);
    }

    #[test]
    fn url_canonicalization_strips_redir_for_nodes() {
        assert_eq!(
            canonicalize_url("/node/123/redir", BASE),
            "https://www.ozbargain.com.au/node/123"
        );
        assert_eq!(
            canonicalize_url("/node/123/redir?src=live", BASE),
            "https://www.ozbargain.com.au/node/123?src=live"
        );
        // Comment URLs untouched.
        assert_eq!(
            canonicalize_url("/comment/456", BASE),
            "https://www.ozbargain.com.au/comment/456"
        );
    }

    #[test]
    fn ids_and_parents_parse() {
        assert_eq!(
            item_id_from_url("https://x/node/123?ref=1").as_deref(),
            Some("node/123")
        );
        assert_eq!(
            item_id_from_url("https://x/comment/456").as_deref(),
            Some("comment/456")
        );
        assert_eq!(item_id_from_url("https://x/about"), None);
        assert_eq!(
            parent_id_from_url("https://x/node/123#comment-456").as_deref(),
            Some("node/123")
        );
        assert_eq!(parent_id_from_url("https://x/comment/456"), None);
        assert_eq!(
            comment_ref_from_url("https://x/node/123#comment-456").as_deref(),
            Some("comment-456")
        );
        assert_eq!(
            comment_ref_from_url("https://x/comment/456").as_deref(),
            Some("comment-456")
        );
    }

    #[test]
    fn normalize_row_filters_non_deals() {
        let mut raw = RawFeedRow {
            time_str: "1 min ago".into(),
            user: "alice".into(),
            action: "Posted".into(),
            subject: "Cheap&nbsp;SSD  deal".into(),
            href: "/node/99/redir".into(),
            kind_label: "Forum".into(),
        };
        assert!(normalize_row(&raw, BASE, t0()).is_none());

        raw.kind_label = "Deal".into();
        let row = normalize_row(&raw, BASE, t0()).unwrap();
        assert_eq!(row.id, "node/99");
        assert_eq!(row.title, "Cheap SSD deal");
        assert_eq!(row.kind, FeedRowKind::Post);
        assert_eq!(row.posted_by.as_deref(), Some("alice"));
    }

    #[test]
    fn comment_rows_carry_parent() {
        let raw = RawFeedRow {
            time_str: "now".into(),
            user: "bob".into(),
            action: "Commented".into(),
            subject: "Re: Cheap SSD".into(),
            href: "/node/99#comment-777".into(),
            kind_label: "Deal".into(),
        };
        let row = normalize_row(&raw, BASE, t0()).unwrap();
        assert_eq!(row.kind, FeedRowKind::Comment);
        assert_eq!(row.parent_id.as_deref(), Some("node/99"));
    }
}
