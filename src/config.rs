// src/config.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_WATCHLIST_PATH: &str = "WATCHLIST_PATH";

/// Runtime configuration for the live monitor, read from the environment once
/// at startup. Every knob has a default so a bare `.env` still boots.
#[derive(Debug, Clone)]
pub struct MonitorCfg {
    pub feed_url: String,
    pub browser_service_url: String,
    pub extractor_url: String,
    pub poll_interval: Duration,
    pub trend_check_interval: Duration,
    pub min_heat_score: f64,
    pub session_cooldown: Duration,
    pub watchlist_reload: Duration,
    pub snapshot_retention_hours: u64,
}

impl MonitorCfg {
    pub fn from_env() -> Self {
        Self {
            feed_url: env_str("FEED_URL", "https://www.ozbargain.com.au/live"),
            browser_service_url: env_str("BROWSER_SERVICE_URL", "http://127.0.0.1:3000"),
            extractor_url: env_str("EXTRACTOR_URL", "http://127.0.0.1:8100"),
            poll_interval: Duration::from_secs(env_u64("POLL_INTERVAL_SECS", 5)),
            trend_check_interval: Duration::from_secs(
                env_u64("TREND_CHECK_INTERVAL_MINS", 30) * 60,
            ),
            min_heat_score: env_f64("MIN_HEAT_SCORE", 60.0),
            session_cooldown: Duration::from_secs(env_u64("SESSION_RESTART_COOLDOWN_SECS", 15)),
            watchlist_reload: Duration::from_secs(env_u64("WATCHLIST_RELOAD_SECS", 300)),
            snapshot_retention_hours: env_u64("SNAPSHOT_RETENTION_HOURS", 168),
        }
    }
}

/// Configuration for one backfill invocation.
#[derive(Debug, Clone)]
pub struct BackfillCfg {
    /// Stop after this many stubs have been consumed from the traversal.
    pub limit: usize,
    /// Fixed enrichment worker-pool size; bounds concurrent outbound requests.
    pub workers: usize,
    /// Pause between scroll pulls, to pace the traversal like a human reader.
    pub page_pause: Duration,
}

impl BackfillCfg {
    pub fn from_env() -> Self {
        Self {
            limit: env_u64("BACKFILL_LIMIT", 50) as usize,
            workers: (env_u64("BACKFILL_WORKERS", 8) as usize).max(1),
            page_pause: Duration::from_millis(env_u64("BACKFILL_PAGE_PAUSE_MS", 3000)),
        }
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Load the watchlist from an explicit path. Supports TOML (`tags = [...]`)
/// or a plain JSON string array.
pub fn load_watchlist_from(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading watchlist from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_watchlist(&content, ext.as_str())
}

/// Load the watchlist using env var + fallbacks:
/// 1) $WATCHLIST_PATH
/// 2) config/watchlist.toml
/// 3) config/watchlist.json
pub fn load_watchlist_default() -> Result<Vec<String>> {
    if let Ok(p) = std::env::var(ENV_WATCHLIST_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_watchlist_from(&pb);
        } else {
            return Err(anyhow!("WATCHLIST_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/watchlist.toml");
    if toml_p.exists() {
        return load_watchlist_from(&toml_p);
    }
    let json_p = PathBuf::from("config/watchlist.json");
    if json_p.exists() {
        return load_watchlist_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_watchlist(s: &str, hint_ext: &str) -> Result<Vec<String>> {
    let try_toml = hint_ext == "toml" || s.contains("tags");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported watchlist format"))
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlWl {
        tags: Vec<String>,
    }
    let v: TomlWl = toml::from_str(s)?;
    Ok(clean_list(v.tags))
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    use std::collections::BTreeSet;
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() {
            set.insert(t.to_string());
        }
    }
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn dedup_trim_and_formats_work() {
        let toml = r#"tags = [" gaming ", "", "lego", "lego"]"#;
        let json = r#"["ssd", "  lego  ", ""]"#;
        let toml_out = parse_toml(toml).unwrap();
        assert_eq!(toml_out, vec!["gaming".to_string(), "lego".to_string()]);
        let json_out = parse_json(json).unwrap();
        assert_eq!(json_out, vec!["lego".to_string(), "ssd".to_string()]);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        // Isolate CWD into a temp dir so a real config/ in the repo does not
        // interfere.
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_WATCHLIST_PATH);

        // No files in temp CWD means empty watchlist.
        let v = load_watchlist_default().unwrap();
        assert!(v.is_empty());

        // Env var takes precedence.
        let p_json = tmp.path().join("watchlist.json");
        fs::write(&p_json, r#"["gaming"]"#).unwrap();
        env::set_var(ENV_WATCHLIST_PATH, p_json.display().to_string());
        let v2 = load_watchlist_default().unwrap();
        assert_eq!(v2, vec!["gaming".to_string()]);
        env::remove_var(ENV_WATCHLIST_PATH);

        env::set_current_dir(&old).unwrap();
    }

    #[serial_test::serial]
    #[test]
    fn monitor_cfg_defaults_apply() {
        for k in [
            "POLL_INTERVAL_SECS",
            "TREND_CHECK_INTERVAL_MINS",
            "MIN_HEAT_SCORE",
            "SESSION_RESTART_COOLDOWN_SECS",
        ] {
            env::remove_var(k);
        }
        let cfg = MonitorCfg::from_env();
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.trend_check_interval, Duration::from_secs(30 * 60));
        assert_eq!(cfg.min_heat_score, 60.0);
        assert_eq!(cfg.session_cooldown, Duration::from_secs(15));
    }
}
