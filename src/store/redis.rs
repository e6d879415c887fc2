//! Redis store backend
//!
//! Uses a multiplexed async connection: one TCP connection shared by every
//! clone of the handle. Reconnection is *not* delegated to the `redis` crate;
//! the [`crate::connection::ConnectionManager`] owns that lifecycle so the
//! state is observable.

use super::{Command, Reply};
use crate::config::{redact_url, CacheConfig};
use crate::error::{CacheError, CacheResult};
use crate::lock::script::COMPARE_AND_DELETE;
use ::redis::aio::MultiplexedConnection;
use ::redis::IntoConnectionInfo;
use std::sync::Arc;
use tracing::debug;

/// Connection factory for a Redis-compatible server
#[derive(Clone)]
pub struct RedisStore {
    client: ::redis::Client,
    url: String,
    compare_and_delete: Arc<::redis::Script>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("url", &self.redacted_url())
            .finish()
    }
}

impl RedisStore {
    /// Create a store client from configuration. No network I/O happens here.
    pub fn from_config(config: &CacheConfig) -> CacheResult<Self> {
        let mut info = config.url.as_str().into_connection_info().map_err(|e| {
            CacheError::config(format!(
                "Invalid store URL {}: {}",
                redact_url(&config.url),
                e
            ))
        })?;

        if let Some(password) = &config.password {
            info.redis.password = Some(password.clone());
        }
        info.redis.db = config.db;

        let client = ::redis::Client::open(info).map_err(|e| {
            CacheError::Connection(format!("Failed to create Redis client: {}", e))
        })?;

        Ok(Self {
            client,
            url: config.url.clone(),
            compare_and_delete: Arc::new(COMPARE_AND_DELETE.to_redis_script()),
        })
    }

    pub fn redacted_url(&self) -> String {
        redact_url(&self.url)
    }

    /// Open a connection, including AUTH and SELECT
    pub async fn open(&self) -> CacheResult<RedisConnection> {
        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(format!("Failed to connect to Redis: {}", e)))?;

        debug!(url = %self.redacted_url(), "Redis connection established");

        Ok(RedisConnection {
            connection,
            compare_and_delete: Arc::clone(&self.compare_and_delete),
        })
    }
}

/// Live Redis connection handle
#[derive(Clone)]
pub struct RedisConnection {
    connection: MultiplexedConnection,
    compare_and_delete: Arc<::redis::Script>,
}

impl RedisConnection {
    pub async fn execute(&mut self, command: Command) -> CacheResult<Reply> {
        let name = command.name();
        let conn = &mut self.connection;

        let reply = match command {
            Command::Get { key } => {
                let value: Option<String> = ::redis::cmd("GET")
                    .arg(&key)
                    .query_async(conn)
                    .await
                    .map_err(|e| classify(name, e))?;
                value.map(Reply::Text).unwrap_or(Reply::Nil)
            }
            Command::MGet { keys } => {
                let values: Vec<Option<String>> = ::redis::cmd("MGET")
                    .arg(&keys)
                    .query_async(conn)
                    .await
                    .map_err(|e| classify(name, e))?;
                Reply::List(values)
            }
            cmd @ Command::Set { .. } => {
                let written: Option<String> = build_cmd(&cmd)
                    .query_async(conn)
                    .await
                    .map_err(|e| classify(name, e))?;
                if written.is_some() {
                    Reply::Ok
                } else {
                    Reply::Nil
                }
            }
            Command::Scan {
                cursor,
                pattern,
                count,
            } => {
                let (next_cursor, keys): (u64, Vec<String>) = ::redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(count)
                    .query_async(conn)
                    .await
                    .map_err(|e| classify(name, e))?;
                Reply::ScanPage {
                    cursor: next_cursor,
                    keys,
                }
            }
            Command::CompareAndDelete { key, expected } => {
                let deleted: i64 = self
                    .compare_and_delete
                    .key(&key)
                    .arg(&expected)
                    .invoke_async(conn)
                    .await
                    .map_err(|e| classify(name, e))?;
                Reply::Int(deleted)
            }
            Command::Ping => {
                let pong: String = ::redis::cmd("PING")
                    .query_async(conn)
                    .await
                    .map_err(|e| classify(name, e))?;
                Reply::Text(pong)
            }
            cmd => {
                // DEL, EXISTS, INCRBY, EXPIRE, TTL all answer with an integer
                let n: i64 = build_cmd(&cmd)
                    .query_async(conn)
                    .await
                    .map_err(|e| classify(name, e))?;
                Reply::Int(n)
            }
        };

        Ok(reply)
    }

    pub async fn execute_batch(&mut self, commands: Vec<Command>) -> CacheResult<()> {
        let mut pipe = ::redis::pipe();
        pipe.atomic();
        for command in &commands {
            if matches!(command, Command::CompareAndDelete { .. }) {
                return Err(CacheError::Backend(
                    "compare-and-delete cannot be pipelined".to_string(),
                ));
            }
            pipe.add_command(build_cmd(command)).ignore();
        }

        let _: () = pipe
            .query_async(&mut self.connection)
            .await
            .map_err(|e| classify("MULTI", e))?;
        Ok(())
    }

    pub async fn quit(&mut self) {
        let result: ::redis::RedisResult<()> =
            ::redis::cmd("QUIT").query_async(&mut self.connection).await;
        if let Err(e) = result {
            debug!(error = %e, "QUIT failed, dropping connection anyway");
        }
    }
}

/// Translate a command into its RESP form
fn build_cmd(command: &Command) -> ::redis::Cmd {
    match command {
        Command::Get { key } => {
            let mut cmd = ::redis::cmd("GET");
            cmd.arg(key);
            cmd
        }
        Command::MGet { keys } => {
            let mut cmd = ::redis::cmd("MGET");
            cmd.arg(keys);
            cmd
        }
        Command::Set {
            key,
            value,
            ttl,
            only_if_absent,
        } => {
            let mut cmd = ::redis::cmd("SET");
            cmd.arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg((ttl.as_millis() as u64).max(1));
            }
            if *only_if_absent {
                cmd.arg("NX");
            }
            cmd
        }
        Command::Del { keys } => {
            let mut cmd = ::redis::cmd("DEL");
            cmd.arg(keys);
            cmd
        }
        Command::Exists { key } => {
            let mut cmd = ::redis::cmd("EXISTS");
            cmd.arg(key);
            cmd
        }
        Command::IncrBy { key, delta } => {
            let mut cmd = ::redis::cmd("INCRBY");
            cmd.arg(key).arg(*delta);
            cmd
        }
        Command::Expire { key, ttl } => {
            let mut cmd = ::redis::cmd("EXPIRE");
            cmd.arg(key).arg(ttl.as_secs().max(1));
            cmd
        }
        Command::Ttl { key } => {
            let mut cmd = ::redis::cmd("TTL");
            cmd.arg(key);
            cmd
        }
        Command::Scan {
            cursor,
            pattern,
            count,
        } => {
            let mut cmd = ::redis::cmd("SCAN");
            cmd.arg(*cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(*count);
            cmd
        }
        Command::CompareAndDelete { key, expected } => {
            let mut cmd = ::redis::cmd("EVAL");
            cmd.arg(COMPARE_AND_DELETE.source)
                .arg(1)
                .arg(key)
                .arg(expected);
            cmd
        }
        Command::Ping => ::redis::cmd("PING"),
    }
}

/// Split transport failures (reconnect needed) from command rejections
fn classify(command: &str, err: ::redis::RedisError) -> CacheError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_unrecoverable_error() {
        CacheError::ConnectionLost(format!("Redis {} failed: {}", command, err))
    } else {
        CacheError::Backend(format!("Redis {} failed: {}", command, err))
    }
}
