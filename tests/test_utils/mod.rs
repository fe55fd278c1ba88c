//! Test utilities shared by the integration tests.
//!
//! Provides an in-memory SQLite catalog with migrations applied, a scripted
//! product source and a recording notification channel.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use restock::models::Observation;
use restock::notifications::{Channel, MessageId, NotifierError};
use restock::sources::{ProductSource, SourceError};
use sea_orm::{Database, DatabaseConnection};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Sets up an in-memory SQLite database and returns an Arc.
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

pub fn observation(name: &str, url: &str, price: f64, available: bool) -> Observation {
    Observation {
        name: name.to_string(),
        url: url.to_string(),
        price,
        price_currency: "USD".to_string(),
        available,
    }
}

/// Counts sources currently inside `parse` and remembers the peak.
#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Source returning whatever the test last scripted.
pub struct ScriptedSource {
    shop: String,
    observations: Mutex<Result<Vec<Observation>, String>>,
    delay: Duration,
    in_flight: Option<Arc<InFlight>>,
}

impl ScriptedSource {
    pub fn new(shop: &str, observations: Vec<Observation>) -> Arc<Self> {
        Arc::new(Self {
            shop: shop.to_string(),
            observations: Mutex::new(Ok(observations)),
            delay: Duration::ZERO,
            in_flight: None,
        })
    }

    /// Source whose `parse` takes `delay` and reports to `in_flight`.
    pub fn slow(
        shop: &str,
        observations: Vec<Observation>,
        delay: Duration,
        in_flight: Arc<InFlight>,
    ) -> Arc<Self> {
        Arc::new(Self {
            shop: shop.to_string(),
            observations: Mutex::new(Ok(observations)),
            delay,
            in_flight: Some(in_flight),
        })
    }

    pub fn failing(shop: &str, details: &str) -> Arc<Self> {
        Arc::new(Self {
            shop: shop.to_string(),
            observations: Mutex::new(Err(details.to_string())),
            delay: Duration::ZERO,
            in_flight: None,
        })
    }

    pub fn set(&self, observations: Vec<Observation>) {
        *self.observations.lock().unwrap() = Ok(observations);
    }
}

#[async_trait]
impl ProductSource for ScriptedSource {
    fn label(&self) -> String {
        format!("ScriptedSource<{}>", self.shop)
    }

    fn shop_name(&self) -> Result<String, SourceError> {
        Ok(self.shop.clone())
    }

    async fn parse(&self) -> Result<Vec<Observation>, SourceError> {
        if let Some(in_flight) = &self.in_flight {
            in_flight.enter();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(in_flight) = &self.in_flight {
            in_flight.leave();
        }

        let scripted = self.observations.lock().unwrap().clone();
        scripted.map_err(|details| SourceError::Network {
            source_name: self.label(),
            details,
        })
    }
}

/// One call made on a [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message { id: String, text: String },
    Reply { id: String, to: String, text: String },
    Deleted { id: String },
}

/// Channel that records every call and hands out sequential message ids.
#[derive(Default)]
pub struct RecordingChannel {
    kind: String,
    calls: Mutex<Vec<Sent>>,
    next_id: Mutex<u32>,
    fail_sends: Mutex<bool>,
    fail_replies: Mutex<bool>,
}

impl RecordingChannel {
    pub fn new(kind: &str) -> Arc<Self> {
        Arc::new(Self {
            kind: kind.to_string(),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> Vec<Sent> {
        self.calls.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Sent::Message { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Sent::Reply { to, text, .. } => Some((to, text)),
                _ => None,
            })
            .collect()
    }

    pub fn fail_sends(&self, fail: bool) {
        *self.fail_sends.lock().unwrap() = fail;
    }

    pub fn fail_replies(&self, fail: bool) {
        *self.fail_replies.lock().unwrap() = fail;
    }

    fn next_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        next.to_string()
    }

    fn outage(&self) -> NotifierError {
        NotifierError::Transport {
            channel: self.kind.clone(),
            details: "channel unavailable".to_string(),
        }
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn send_message(&self, text: &str) -> Result<MessageId, NotifierError> {
        if *self.fail_sends.lock().unwrap() {
            return Err(self.outage());
        }
        let id = self.next_id();
        self.calls.lock().unwrap().push(Sent::Message {
            id: id.clone(),
            text: text.to_string(),
        });
        Ok(id)
    }

    async fn reply_to(&self, message_id: &str, text: &str) -> Result<MessageId, NotifierError> {
        if *self.fail_replies.lock().unwrap() {
            return Err(self.outage());
        }
        let id = self.next_id();
        self.calls.lock().unwrap().push(Sent::Reply {
            id: id.clone(),
            to: message_id.to_string(),
            text: text.to_string(),
        });
        Ok(id)
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), NotifierError> {
        self.calls.lock().unwrap().push(Sent::Deleted {
            id: message_id.to_string(),
        });
        Ok(())
    }
}
