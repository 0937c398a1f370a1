// tests/common/mod.rs
// Scripted doubles for the collaborator traits, shared across test files.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dealwatch::error::{ExtractError, SessionError, TraversalError};
use dealwatch::extract::Extractor;
use dealwatch::notify::{AlertPayload, Notifier};
use dealwatch::session::{FeedSession, SessionFactory};
use dealwatch::types::{ActivityStub, ItemFields, RawFeedRow};

/// A session that replays scripted feed batches and activity pages.
/// Exhausted feeds return empty batches; exhausted activity returns `None`.
pub struct ScriptedSession {
    feed: Mutex<VecDeque<Result<Vec<RawFeedRow>, SessionError>>>,
    begin_ok: bool,
    pages: Mutex<VecDeque<Vec<ActivityStub>>>,
    pub closed: Arc<AtomicBool>,
}

impl ScriptedSession {
    pub fn with_feed(batches: Vec<Result<Vec<RawFeedRow>, SessionError>>) -> Self {
        Self {
            feed: Mutex::new(batches.into()),
            begin_ok: true,
            pages: Mutex::new(VecDeque::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_activity(pages: Vec<Vec<ActivityStub>>) -> Self {
        Self {
            feed: Mutex::new(VecDeque::new()),
            begin_ok: true,
            pages: Mutex::new(pages.into()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn unreachable_activity() -> Self {
        Self {
            feed: Mutex::new(VecDeque::new()),
            begin_ok: false,
            pages: Mutex::new(VecDeque::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl FeedSession for ScriptedSession {
    async fn sample_feed(&mut self) -> Result<Vec<RawFeedRow>, SessionError> {
        match self.feed.lock().unwrap().pop_front() {
            Some(batch) => batch,
            None => Ok(Vec::new()),
        }
    }

    async fn begin_activity(&mut self, identity: &str) -> Result<(), TraversalError> {
        if self.begin_ok {
            Ok(())
        } else {
            Err(TraversalError::Unavailable {
                identity: identity.to_string(),
                reason: "scripted failure".into(),
            })
        }
    }

    async fn next_activity_page(&mut self) -> Result<Option<Vec<ActivityStub>>, SessionError> {
        Ok(self.pages.lock().unwrap().pop_front())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out pre-built sessions in order; once exhausted, idle sessions that
/// observe an empty feed forever.
pub struct ScriptedFactory {
    sessions: Mutex<VecDeque<ScriptedSession>>,
    pub acquired: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new(sessions: Vec<ScriptedSession>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
            acquired: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn acquire(&self) -> Result<Box<dyn FeedSession>, SessionError> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let next = self.sessions.lock().unwrap().pop_front();
        Ok(Box::new(
            next.unwrap_or_else(|| ScriptedSession::with_feed(Vec::new())),
        ))
    }
}

#[derive(Clone)]
pub enum ExtractScript {
    Fields(ItemFields),
    Blocked,
    NotFound,
    Fail,
}

/// Extractor double: scripted responses per target URL, default fields for
/// anything unscripted, and a log of every call made.
pub struct RecordingExtractor {
    responses: Mutex<HashMap<String, ExtractScript>>,
    pub calls: Mutex<Vec<String>>,
}

impl RecordingExtractor {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, target: &str, response: ExtractScript) {
        self.responses
            .lock()
            .unwrap()
            .insert(target.to_string(), response);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Extractor for RecordingExtractor {
    async fn extract(&self, target: &str) -> Result<ItemFields, ExtractError> {
        self.calls.lock().unwrap().push(target.to_string());
        let scripted = self.responses.lock().unwrap().get(target).cloned();
        match scripted {
            Some(ExtractScript::Fields(f)) => Ok(f),
            Some(ExtractScript::Blocked) => Err(ExtractError::Blocked),
            Some(ExtractScript::NotFound) => Err(ExtractError::NotFound),
            Some(ExtractScript::Fail) => Err(ExtractError::Other("scripted failure".into())),
            None => Ok(ItemFields {
                id: dealwatch::feed::item_id_from_url(target),
                url: Some(target.to_string()),
                title: Some(format!("Extracted {target}")),
                votes: 1,
                ..Default::default()
            }),
        }
    }
}

/// Notifier double: records every payload; can be flipped to fail.
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<AlertPayload>>,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, alert: &AlertPayload) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("scripted transport failure");
        }
        self.sent.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

pub const BASE: &str = "https://www.ozbargain.com.au";

pub fn deal_row(href: &str, subject: &str, user: &str, action: &str) -> RawFeedRow {
    RawFeedRow {
        time_str: "1 min ago".into(),
        user: user.into(),
        action: action.into(),
        subject: subject.into(),
        href: href.into(),
        kind_label: "Deal".into(),
    }
}

pub fn fields(id: &str, title: &str, tags: &[&str], votes: i64) -> ItemFields {
    ItemFields {
        id: Some(id.to_string()),
        url: Some(format!("{BASE}/{id}")),
        title: Some(title.to_string()),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        votes,
        ..Default::default()
    }
}

pub fn stub(position: usize, url: &str, text: &str) -> ActivityStub {
    ActivityStub {
        position,
        url: url.to_string(),
        text: text.to_string(),
    }
}
