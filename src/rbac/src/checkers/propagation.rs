//! Walks along the propagation schema's ancestor chain
//!
//! The chain starts at the record's own context and climbs one declared
//! to-one hop per ancestor, nearest first. A null parent ends the chain.
//! Its length is bounded by the schema, never by live data.

use super::{holds_at, CheckEnv, CheckRequest};
use crate::error::Result;
use crate::types::Record;
use tracing::debug;

/// Visit each link until the grant check answers `stop_on`
///
/// An exhausted chain answers `!stop_on`.
async fn walk(
    env: &CheckEnv,
    request: &CheckRequest,
    action: &str,
    stop_on: bool,
) -> Result<bool> {
    let hops = env.schema.ancestors(&request.record.table);
    let mut current: Record = request.record.clone();
    let mut depth = 0;

    loop {
        let context = current.context();
        if holds_at(env, request, action, &context).await? == stop_on {
            debug!(
                "'{}' {} at {} (depth {}) from {}",
                action,
                if stop_on { "granted" } else { "missing" },
                context,
                depth,
                request.record.context()
            );
            return Ok(stop_on);
        }

        let Some(hop) = hops.get(depth) else {
            break;
        };

        match env.traverser.parent(&current, hop).await? {
            Some(parent) => current = parent,
            None => {
                debug!(
                    "Chain of {} ends early at {}: null '{}'",
                    request.record.context(),
                    context,
                    hop.relation
                );
                break;
            }
        }
        depth += 1;
    }

    Ok(!stop_on)
}

/// Action granted at the record and every ancestor
pub(super) async fn check_every(
    env: &CheckEnv,
    request: &CheckRequest,
    action: &str,
) -> Result<bool> {
    walk(env, request, action, false).await
}

/// Action granted at the record or some ancestor
pub(super) async fn check_any(
    env: &CheckEnv,
    request: &CheckRequest,
    action: &str,
) -> Result<bool> {
    walk(env, request, action, true).await
}
