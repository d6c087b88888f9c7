use std::error::Error;
use std::str::FromStr;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::RuleEngine;
use crate::error::{Result, RuleError};
use crate::wire::{self, WireGroup, WireRule};

use super::core::Manager;

/// Which rules a listing includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    #[default]
    All,
    Alerting,
    Recording,
}

impl RuleType {
    fn keeps(&self, rule: &WireRule) -> bool {
        match self {
            RuleType::All => true,
            RuleType::Alerting => rule.is_alert(),
            RuleType::Recording => rule.is_recording(),
        }
    }
}

impl FromStr for RuleType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "all" => Ok(RuleType::All),
            "alert" | "alerting" => Ok(RuleType::Alerting),
            "record" | "recording" => Ok(RuleType::Recording),
            _ => Err(format!("invalid rule type {s:?}, expected one of all, alert, record")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RulesRequest {
    pub rule_type: RuleType,
}

impl RulesRequest {
    pub fn new(rule_type: RuleType) -> Self {
        Self { rule_type }
    }
}

/// One message of a rules listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulesResponse {
    Group(WireGroup),
}

/// Receives a rules listing one message at a time.
#[async_trait]
pub trait RulesSink: Send {
    async fn send(&mut self, resp: RulesResponse) -> std::result::Result<(), Box<dyn Error + Send + Sync>>;
}

/// Sink backed by a bounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink(mpsc::Sender<RulesResponse>);

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<RulesResponse>) -> Self {
        Self(tx)
    }
}

#[async_trait]
impl RulesSink for ChannelSink {
    async fn send(&mut self, resp: RulesResponse) -> std::result::Result<(), Box<dyn Error + Send + Sync>> {
        self.0
            .send(resp)
            .await
            .map_err(|_| "rules receiver closed".into())
    }
}

/// Keep only rules of `rule_type`. Name, file, interval and strategy are
/// untouched, and a group left with no rules is still returned.
pub fn filter_group(mut group: WireGroup, rule_type: RuleType) -> WireGroup {
    if rule_type != RuleType::All {
        group.rules.retain(|r| rule_type.keeps(r));
    }
    group
}

impl<E: RuleEngine> Manager<E> {
    /// Lazily project and filter every live group. The group set is
    /// captured when the stream is created; each group's state is read as
    /// it is yielded.
    pub fn stream_rules(&self, req: RulesRequest) -> impl Stream<Item = RulesResponse> + Send + 'static {
        let index = self.file_index();
        futures::stream::iter(index.groups().to_vec()).map(move |g| {
            let projected = wire::project_group(&g, index.display_file(g.file()));
            RulesResponse::Group(filter_group(projected, req.rule_type))
        })
    }

    /// Send the listing to `sink`, one message per group. The first send
    /// failure aborts the listing; cancellation stops it before the next
    /// group is read.
    pub async fn rules<S>(&self, req: RulesRequest, sink: &mut S, cancel: &CancellationToken) -> Result<()>
    where
        S: RulesSink + ?Sized,
    {
        let mut stream = Box::pin(self.stream_rules(req));
        let mut sent = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(RuleError::Cancelled);
            }
            let Some(resp) = stream.next().await else {
                break;
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RuleError::Cancelled),
                res = sink.send(resp) => res.map_err(RuleError::Send)?,
            }
            sent += 1;
        }

        debug!(groups = sent, rule_type = ?req.rule_type, "rules listing sent");
        Ok(())
    }
}
