//! Grant of an action at the terminals of relation paths

use super::{holds_at, CheckEnv, CheckRequest};
use crate::error::Result;
use tracing::debug;

/// True if the action holds at any terminal of any path
///
/// Paths are tried in order and terminals in traversal order; the first hit
/// stops the walk.
pub(super) async fn check(
    env: &CheckEnv,
    request: &CheckRequest,
    action: &str,
    paths: &[String],
) -> Result<bool> {
    let own = [String::new()];
    let paths = if paths.is_empty() { &own[..] } else { paths };

    for path in paths {
        let terminals = env.traverser.resolve(path, &request.record).await?;
        for (context, _) in &terminals {
            if holds_at(env, request, action, context).await? {
                debug!(
                    "'{}' granted at {} via path '{}' from {}",
                    action,
                    context,
                    path,
                    request.record.context()
                );
                return Ok(true);
            }
        }
    }

    Ok(false)
}
