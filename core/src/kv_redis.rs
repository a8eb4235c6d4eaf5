//! Redis-backed [`KvStore`]. `ConnectionManager` already multiplexes and
//! auto-reconnects a single connection; the semaphore here additionally caps
//! in-flight commands at the configured pool size so a burst of room actors
//! waits for a slot rather than overwhelming the backend, matching the
//! "bounded pool, FIFO return, waits rather than fails" requirement of
//! spec §4.2.

use crate::error::{CoreError, CoreResult};
use crate::kv::KvStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub struct RedisKv {
    manager: ConnectionManager,
    pool_permits: Arc<Semaphore>,
    command_timeout: Duration,
    available: Arc<AtomicBool>,
}

impl RedisKv {
    pub async fn connect(url: &str, pool_size: usize, connect_timeout_ms: u64, command_timeout_ms: u64) -> CoreResult<Self> {
        let client = redis::Client::open(url).map_err(|e| CoreError::Internal(e.to_string()))?;
        let manager = tokio::time::timeout(
            Duration::from_millis(connect_timeout_ms),
            client.get_connection_manager(),
        )
        .await
        .map_err(|_| CoreError::Unavailable)?
        .map_err(CoreError::from)?;

        Ok(RedisKv {
            manager,
            pool_permits: Arc::new(Semaphore::new(pool_size.max(1))),
            command_timeout: Duration::from_millis(command_timeout_ms),
            available: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Runs a single Redis command under the pool's backpressure semaphore
    /// and the configured command timeout, updating the liveness flag from
    /// the outcome.
    async fn run<F, Fut, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let _permit = self.pool_permits.acquire().await.map_err(|_| CoreError::Unavailable)?;
        let conn = self.manager.clone();
        let result = tokio::time::timeout(self.command_timeout, f(conn)).await;
        match result {
            Ok(Ok(value)) => {
                self.available.store(true, Ordering::Relaxed);
                Ok(value)
            }
            Ok(Err(e)) => {
                let err = CoreError::from(e);
                if matches!(err, CoreError::Unavailable) {
                    self.available.store(false, Ordering::Relaxed);
                }
                Err(err)
            }
            Err(_) => {
                self.available.store(false, Ordering::Relaxed);
                Err(CoreError::Unavailable)
            }
        }
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn hash_get(&self, key: &str, field: &str) -> CoreResult<Option<String>> {
        let key = key.to_string();
        let field = field.to_string();
        self.run(|mut c| async move { c.hget(key, field).await }).await
    }

    async fn hash_set(&self, key: &str, field: &str, value: String) -> CoreResult<()> {
        let key = key.to_string();
        let field = field.to_string();
        self.run(|mut c| async move { c.hset(key, field, value).await }).await
    }

    async fn hash_get_all(&self, key: &str) -> CoreResult<HashMap<String, String>> {
        let key = key.to_string();
        self.run(|mut c| async move { c.hgetall(key).await }).await
    }

    async fn hash_del(&self, key: &str, field: &str) -> CoreResult<()> {
        let key = key.to_string();
        let field = field.to_string();
        self.run(|mut c| async move { c.hdel(key, field).await }).await
    }

    async fn set_add(&self, key: &str, member: String) -> CoreResult<()> {
        let key = key.to_string();
        self.run(|mut c| async move { c.sadd(key, member).await }).await
    }

    async fn set_rem(&self, key: &str, member: &str) -> CoreResult<()> {
        let key = key.to_string();
        let member = member.to_string();
        self.run(|mut c| async move { c.srem(key, member).await }).await
    }

    async fn set_members(&self, key: &str) -> CoreResult<HashSet<String>> {
        let key = key.to_string();
        self.run(|mut c| async move { c.smembers(key).await }).await
    }

    async fn zset_add(&self, key: &str, member: String, score: f64) -> CoreResult<()> {
        let key = key.to_string();
        self.run(|mut c| async move { c.zadd(key, member, score).await }).await
    }

    async fn zset_rem(&self, key: &str, member: &str) -> CoreResult<()> {
        let key = key.to_string();
        let member = member.to_string();
        self.run(|mut c| async move { c.zrem(key, member).await }).await
    }

    async fn zset_range(&self, key: &str, start: isize, stop: isize) -> CoreResult<Vec<String>> {
        let key = key.to_string();
        self.run(|mut c| async move { c.zrange(key, start as isize, stop as isize).await })
            .await
    }

    async fn list_lpush(&self, key: &str, value: String) -> CoreResult<usize> {
        let key = key.to_string();
        self.run(|mut c| async move { c.lpush(key, value).await }).await
    }

    async fn list_ltrim(&self, key: &str, start: isize, stop: isize) -> CoreResult<()> {
        let key = key.to_string();
        self.run(|mut c| async move { c.ltrim(key, start, stop).await }).await
    }

    async fn list_lrange(&self, key: &str, start: isize, stop: isize) -> CoreResult<Vec<String>> {
        let key = key.to_string();
        self.run(|mut c| async move { c.lrange(key, start, stop).await }).await
    }

    async fn exists(&self, key: &str) -> CoreResult<bool> {
        let key = key.to_string();
        self.run(|mut c| async move { c.exists(key).await }).await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> CoreResult<()> {
        let key = key.to_string();
        self.run(|mut c| async move { c.expire(key, ttl_secs as i64).await }).await
    }

    async fn ping(&self) -> CoreResult<()> {
        self.run(|mut c| async move { redis::cmd("PING").query_async(&mut c).await }).await
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }
}
