//! Ownership of the record, or of records reached through a path

use super::{CheckEnv, CheckRequest};
use crate::error::Result;
use crate::types::Record;

/// Records whose owner columns are inspected: the record itself, or every
/// terminal of `via`
async fn owned_records(
    env: &CheckEnv,
    request: &CheckRequest,
    via: Option<&str>,
) -> Result<Vec<Record>> {
    match via {
        None | Some("") => Ok(vec![request.record.clone()]),
        Some(path) => Ok(env
            .traverser
            .resolve(path, &request.record)
            .await?
            .into_iter()
            .map(|(_, record)| record)
            .collect()),
    }
}

pub(super) async fn check_user(
    env: &CheckEnv,
    request: &CheckRequest,
    via: Option<&str>,
) -> Result<bool> {
    Ok(owned_records(env, request, via)
        .await?
        .iter()
        .any(|record| record.owner_user_id == Some(request.user_id)))
}

pub(super) async fn check_group(
    env: &CheckEnv,
    request: &CheckRequest,
    via: Option<&str>,
) -> Result<bool> {
    Ok(owned_records(env, request, via)
        .await?
        .iter()
        .filter_map(|record| record.owner_group_id)
        .any(|group| request.groups.contains(&group)))
}
