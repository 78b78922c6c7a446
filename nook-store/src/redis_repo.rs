use async_trait::async_trait;
use redis::RedisResult;
use tracing::info;

/// Fixed-window request counter keyed by caller.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// `Ok(true)` while `key` is within `limit` hits for the current window.
    async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> Result<bool, String>;
}

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        info!("Redis client configured");
        Ok(Self { client })
    }

    async fn incr_window(&self, key: &str, window_seconds: i64) -> RedisResult<i64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl RateLimiter for RedisClient {
    async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> Result<bool, String> {
        self.incr_window(key, window_seconds)
            .await
            .map(|count| count <= limit)
            .map_err(|e| e.to_string())
    }
}

/// Lets every request through. Used when Redis is not configured and in tests.
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn check_rate_limit(&self, _key: &str, _limit: i64, _window_seconds: i64) -> Result<bool, String> {
        Ok(true)
    }
}
