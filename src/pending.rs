//! Short-lived sign in state kept in redis between two requests.

use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

/// An OAuth authorization waiting for its callback, keyed by its `state` parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PendingOAuth {
    pub(crate) provider: String,
    pub(crate) code_verifier: String,
    pub(crate) callback_url: String,
}

/// A magic link that has been mailed but not yet used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PendingEmail {
    pub(crate) email: String,
    pub(crate) callback_url: String,
}

impl_redis_rv!(PendingOAuth, PendingEmail);

/// Read and delete `key` in one transaction, so a value can only be redeemed once.
pub(crate) async fn take<T>(redis: &mut ConnectionManager, key: &str) -> RedisResult<Option<T>>
where
    T: FromRedisValue,
{
    let (value, _deleted): (Option<T>, i64) = redis::pipe()
        .atomic()
        .get(key)
        .del(key)
        .query_async(redis)
        .await?;
    Ok(value)
}
