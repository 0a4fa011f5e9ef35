//! The SMS router: the single task draining the outgoing queue and
//! dispatching each message to an SMSC connector via `rout()`.

use rand::Rng;
use tracing::{debug, warn};

use crate::error::RouteError;
use crate::message::Sms;
use crate::queue::Queue;
use crate::smsc::{ConnectorPool, Usable};

/// Outcome of one routing attempt, reported back to callers (the admission
/// pipeline may re-enqueue on `Queued`, the store records delivery on
/// `Dispatched`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Dispatched(String),
    Queued,
    Rejected(String),
}

/// Normalize a receiver number to bearerbox's unified prefix form: strip a
/// leading `+` or `00` international prefix, leaving bare digits. This is
/// the single normalization point every connector's prefix matching relies on.
pub fn unified_prefix(receiver: &str) -> String {
    let trimmed = receiver.trim();
    if let Some(stripped) = trimmed.strip_prefix('+') {
        stripped.to_string()
    } else if let Some(stripped) = trimmed.strip_prefix("00") {
        stripped.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Select a connector for `sms` and attempt delivery, implementing the
/// routing algorithm: normalize the receiver, walk the connector list from a
/// random offset classifying each as NotEligible/Eligible/Preferred, pick
/// the lowest-load Active connector honoring a Preferred-first restriction,
/// and on driver rejection retry once over the remaining candidates (this
/// single bounded retry, rather than a fully general backoff/livelock
/// guard, is a deliberately preserved open design choice — see DESIGN.md).
pub async fn rout(pool: &ConnectorPool, sms: &Sms) -> Result<RouteOutcome, RouteError> {
    let receiver = sms
        .receiver
        .as_deref()
        .map(|b| String::from_utf8_lossy(b).to_string())
        .unwrap_or_default();
    let normalized = unified_prefix(&receiver);

    attempt(pool, sms, &normalized, &[]).await
}

async fn attempt(
    pool: &ConnectorPool,
    sms: &Sms,
    receiver: &str,
    excluded: &[String],
) -> Result<RouteOutcome, RouteError> {
    let connectors = pool.snapshot().await;
    if connectors.is_empty() {
        return Err(RouteError::NoConnectors);
    }

    let candidates: Vec<_> = connectors
        .iter()
        .filter(|c| !excluded.contains(&c.id))
        .collect();
    if candidates.is_empty() {
        return Ok(RouteOutcome::Queued);
    }

    // When the message names a target SMSC, routing is restricted to that
    // one connector and every other selector (prefix, preferred/denied
    // lists) is bypassed.
    let requested_smsc_id: Option<String> = sms
        .smsc_id
        .as_deref()
        .map(|b| String::from_utf8_lossy(b).to_string());

    let offset = rand::thread_rng().gen_range(0..candidates.len());
    let mut best_eligible: Option<&std::sync::Arc<crate::smsc::SmscConn>> = None;
    let mut best_preferred: Option<&std::sync::Arc<crate::smsc::SmscConn>> = None;

    for i in 0..candidates.len() {
        let conn = candidates[(offset + i) % candidates.len()];
        match conn.usable(receiver, requested_smsc_id.as_deref()) {
            Usable::NotEligible => continue,
            Usable::Eligible => {
                if best_eligible
                    .map(|b| conn.load() < b.load())
                    .unwrap_or(true)
                {
                    best_eligible = Some(conn);
                }
            }
            Usable::Preferred => {
                if best_preferred
                    .map(|b| conn.load() < b.load())
                    .unwrap_or(true)
                {
                    best_preferred = Some(conn);
                }
            }
        }
    }

    // A Preferred connector, if any is eligible, always wins over a merely
    // Eligible one regardless of relative load.
    let chosen = best_preferred.or(best_eligible);

    let chosen = match chosen {
        Some(c) => c,
        None => return Ok(RouteOutcome::Queued),
    };

    debug!(connector = %chosen.id, %receiver, "routing sms");
    match chosen.driver.send_msg(sms).await {
        Ok(()) => {
            chosen.queued.increase();
            Ok(RouteOutcome::Dispatched(chosen.id.clone()))
        }
        Err(err) => {
            warn!(connector = %chosen.id, %err, "driver rejected message, retrying once");
            if excluded.is_empty() {
                let mut next_excluded = excluded.to_vec();
                next_excluded.push(chosen.id.clone());
                Box::pin(attempt(pool, sms, receiver, &next_excluded)).await
            } else {
                Ok(RouteOutcome::Rejected(err.to_string()))
            }
        }
    }
}

/// Run the router as a long-lived task consuming `outgoing` until it closes
/// (all producers dropped and empty), routing each message and logging the outcome.
pub async fn run_router(pool: std::sync::Arc<ConnectorPool>, outgoing: Queue<Sms>) {
    while let Some(sms) = outgoing.consume().await {
        match rout(&pool, &sms).await {
            Ok(RouteOutcome::Dispatched(id)) => {
                debug!(connector = %id, sms_id = sms.id, "sms dispatched");
            }
            Ok(RouteOutcome::Queued) => {
                debug!(sms_id = sms.id, "sms has no eligible connector, re-queuing");
                outgoing.produce(sms).await;
            }
            Ok(RouteOutcome::Rejected(reason)) => {
                warn!(sms_id = sms.id, %reason, "sms permanently rejected by router");
            }
            Err(err) => {
                warn!(sms_id = sms.id, %err, "routing failed");
            }
        }
    }
}
