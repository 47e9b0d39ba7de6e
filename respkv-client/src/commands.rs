//! # Typed Commands
//!
//! Thin wrappers over [`KvClient::send`]: each one builds the argument list,
//! sends it, and asserts the reply kind the command is documented to return.
//! Read-style commands fail with `ClientError::NotFound` when the value is
//! absent; combine with [`OptionalExt::optional`](crate::OptionalExt) for an
//! `Option`.

use crate::client::KvClient;
use crate::error::{ClientError, ClientResult};
use crate::resp::Reply;

impl KvClient {
    // Keys and server

    /// Pings the server and returns the status text.
    pub fn ping(&self) -> ClientResult<String> {
        self.send("PING", &[])?.into_status()
    }

    /// Authenticates the pooled connection this call happens to use.
    ///
    /// Prefer `ClientConfig::password`, which authenticates every connection.
    pub fn auth(&self, password: &str) -> ClientResult<()> {
        self.send("AUTH", &[password.as_bytes()])?.into_status().map(drop)
    }

    /// Returns true when the key exists.
    pub fn exists(&self, key: &str) -> ClientResult<bool> {
        Ok(self.send("EXISTS", &[key.as_bytes()])?.into_integer()? == 1)
    }

    /// Deletes a key. Returns true when a key was removed.
    pub fn del(&self, key: &str) -> ClientResult<bool> {
        Ok(self.send("DEL", &[key.as_bytes()])?.into_integer()? == 1)
    }

    /// Returns the value type name, e.g. "string" or "none".
    pub fn key_type(&self, key: &str) -> ClientResult<String> {
        self.send("TYPE", &[key.as_bytes()])?.into_status()
    }

    /// Lists keys matching a glob pattern.
    pub fn keys(&self, pattern: &str) -> ClientResult<Vec<String>> {
        match self.send("KEYS", &[pattern.as_bytes()])? {
            Reply::Array(items) => Ok(strings(items)),
            // Very old servers answer with one space-separated bulk.
            Reply::Bulk(data) => Ok(String::from_utf8_lossy(&data)
                .split_ascii_whitespace()
                .map(str::to_string)
                .collect()),
            other => Err(ClientError::UnexpectedReply(format!("KEYS returned {:?}", other))),
        }
    }

    /// Renames a key, replacing any existing `dst`.
    pub fn rename(&self, src: &str, dst: &str) -> ClientResult<()> {
        self.send("RENAME", &[src.as_bytes(), dst.as_bytes()])?
            .into_status()
            .map(drop)
    }

    /// Sets a time-to-live in seconds. Returns true when the TTL was set.
    pub fn expire(&self, key: &str, seconds: i64) -> ClientResult<bool> {
        let seconds = seconds.to_string();
        Ok(self
            .send("EXPIRE", &[key.as_bytes(), seconds.as_bytes()])?
            .into_integer()?
            == 1)
    }

    /// Remaining TTL in seconds; -1 without expiry, -2 for a missing key.
    pub fn ttl(&self, key: &str) -> ClientResult<i64> {
        self.send("TTL", &[key.as_bytes()])?.into_integer()
    }

    /// Number of keys in the selected database.
    pub fn dbsize(&self) -> ClientResult<i64> {
        self.send("DBSIZE", &[])?.into_integer()
    }

    /// Removes every key in the selected database, or in all of them.
    pub fn flush(&self, all: bool) -> ClientResult<()> {
        let command = if all { "FLUSHALL" } else { "FLUSHDB" };
        self.send(command, &[])?.into_status().map(drop)
    }

    // Strings

    /// Fetches a value; `NotFound` when the key is missing.
    pub fn get(&self, key: &str) -> ClientResult<Vec<u8>> {
        self.send("GET", &[key.as_bytes()])?.into_bulk()
    }

    /// Stores a value, replacing any previous one.
    pub fn set(&self, key: &str, value: &[u8]) -> ClientResult<()> {
        self.send("SET", &[key.as_bytes(), value])?.into_status().map(drop)
    }

    /// Sets only when the key is absent. Returns true when it was set.
    pub fn setnx(&self, key: &str, value: &[u8]) -> ClientResult<bool> {
        Ok(self.send("SETNX", &[key.as_bytes(), value])?.into_integer()? == 1)
    }

    /// Sets a value that expires after `seconds`.
    pub fn setex(&self, key: &str, seconds: u64, value: &[u8]) -> ClientResult<()> {
        let seconds = seconds.to_string();
        self.send("SETEX", &[key.as_bytes(), seconds.as_bytes(), value])?
            .into_status()
            .map(drop)
    }

    /// Sets a value and returns the previous one.
    pub fn getset(&self, key: &str, value: &[u8]) -> ClientResult<Vec<u8>> {
        self.send("GETSET", &[key.as_bytes(), value])?.into_bulk()
    }

    /// Fetches several values; missing keys come back as `None`.
    pub fn mget(&self, keys: &[&str]) -> ClientResult<Vec<Option<Vec<u8>>>> {
        let args: Vec<&[u8]> = keys.iter().map(|key| key.as_bytes()).collect();
        self.send("MGET", &args)?.into_array()
    }

    /// Increments an integer value by one. Returns the new value.
    pub fn incr(&self, key: &str) -> ClientResult<i64> {
        self.send("INCR", &[key.as_bytes()])?.into_integer()
    }

    /// Adds `delta` to an integer value.
    pub fn incrby(&self, key: &str, delta: i64) -> ClientResult<i64> {
        let delta = delta.to_string();
        self.send("INCRBY", &[key.as_bytes(), delta.as_bytes()])?
            .into_integer()
    }

    /// Decrements an integer value by one.
    pub fn decr(&self, key: &str) -> ClientResult<i64> {
        self.send("DECR", &[key.as_bytes()])?.into_integer()
    }

    /// Subtracts `delta` from an integer value.
    pub fn decrby(&self, key: &str, delta: i64) -> ClientResult<i64> {
        let delta = delta.to_string();
        self.send("DECRBY", &[key.as_bytes(), delta.as_bytes()])?
            .into_integer()
    }

    /// Appends to a string value. Returns the new length.
    pub fn append(&self, key: &str, value: &[u8]) -> ClientResult<i64> {
        self.send("APPEND", &[key.as_bytes(), value])?.into_integer()
    }

    // Lists

    /// Appends to a list. Returns the new length.
    pub fn rpush(&self, key: &str, value: &[u8]) -> ClientResult<i64> {
        self.send("RPUSH", &[key.as_bytes(), value])?.into_integer()
    }

    /// Prepends to a list. Returns the new length.
    pub fn lpush(&self, key: &str, value: &[u8]) -> ClientResult<i64> {
        self.send("LPUSH", &[key.as_bytes(), value])?.into_integer()
    }

    /// Length of a list; 0 for a missing key.
    pub fn llen(&self, key: &str) -> ClientResult<i64> {
        self.send("LLEN", &[key.as_bytes()])?.into_integer()
    }

    /// Elements between `start` and `end` inclusive; negatives count from the tail.
    pub fn lrange(&self, key: &str, start: i64, end: i64) -> ClientResult<Vec<Vec<u8>>> {
        let (start, end) = (start.to_string(), end.to_string());
        let items = self
            .send("LRANGE", &[key.as_bytes(), start.as_bytes(), end.as_bytes()])?
            .into_array()?;
        Ok(values(items))
    }

    /// Removes and returns the head of a list.
    pub fn lpop(&self, key: &str) -> ClientResult<Vec<u8>> {
        self.send("LPOP", &[key.as_bytes()])?.into_bulk()
    }

    /// Removes and returns the tail of a list.
    pub fn rpop(&self, key: &str) -> ClientResult<Vec<u8>> {
        self.send("RPOP", &[key.as_bytes()])?.into_bulk()
    }

    /// Blocking pop from the head of the first non-empty list.
    ///
    /// The timeout is enforced by the server, not locally. Returns the key
    /// and value, or `None` when the server timed out.
    pub fn blpop(&self, keys: &[&str], timeout_secs: u64) -> ClientResult<Option<(String, Vec<u8>)>> {
        self.blocking_pop("BLPOP", keys, timeout_secs)
    }

    /// Blocking pop from the tail of the first non-empty list.
    pub fn brpop(&self, keys: &[&str], timeout_secs: u64) -> ClientResult<Option<(String, Vec<u8>)>> {
        self.blocking_pop("BRPOP", keys, timeout_secs)
    }

    fn blocking_pop(
        &self,
        command: &str,
        keys: &[&str],
        timeout_secs: u64,
    ) -> ClientResult<Option<(String, Vec<u8>)>> {
        let timeout = timeout_secs.to_string();
        let mut args: Vec<&[u8]> = keys.iter().map(|key| key.as_bytes()).collect();
        args.push(timeout.as_bytes());

        let items = self.send(command, &args)?.into_array()?;
        let mut items = items.into_iter();
        match (items.next().flatten(), items.next().flatten()) {
            (Some(key), Some(value)) => Ok(Some((String::from_utf8_lossy(&key).into_owned(), value))),
            _ => Ok(None),
        }
    }

    // Sets

    /// Adds a member. Returns true when it was not already present.
    pub fn sadd(&self, key: &str, member: &[u8]) -> ClientResult<bool> {
        Ok(self.send("SADD", &[key.as_bytes(), member])?.into_integer()? == 1)
    }

    /// Removes a member. Returns true when it was present.
    pub fn srem(&self, key: &str, member: &[u8]) -> ClientResult<bool> {
        Ok(self.send("SREM", &[key.as_bytes(), member])?.into_integer()? == 1)
    }

    /// Returns true when `member` belongs to the set.
    pub fn sismember(&self, key: &str, member: &[u8]) -> ClientResult<bool> {
        Ok(self
            .send("SISMEMBER", &[key.as_bytes(), member])?
            .into_integer()?
            == 1)
    }

    /// All members of a set, in no particular order.
    pub fn smembers(&self, key: &str) -> ClientResult<Vec<Vec<u8>>> {
        Ok(values(self.send("SMEMBERS", &[key.as_bytes()])?.into_array()?))
    }

    /// Number of members in a set.
    pub fn scard(&self, key: &str) -> ClientResult<i64> {
        self.send("SCARD", &[key.as_bytes()])?.into_integer()
    }

    /// Members present in every listed set.
    pub fn sinter(&self, keys: &[&str]) -> ClientResult<Vec<Vec<u8>>> {
        self.set_algebra("SINTER", keys)
    }

    /// Members present in any listed set.
    pub fn sunion(&self, keys: &[&str]) -> ClientResult<Vec<Vec<u8>>> {
        self.set_algebra("SUNION", keys)
    }

    /// Members of the first set missing from all the others.
    pub fn sdiff(&self, keys: &[&str]) -> ClientResult<Vec<Vec<u8>>> {
        self.set_algebra("SDIFF", keys)
    }

    fn set_algebra(&self, command: &str, keys: &[&str]) -> ClientResult<Vec<Vec<u8>>> {
        let args: Vec<&[u8]> = keys.iter().map(|key| key.as_bytes()).collect();
        Ok(values(self.send(command, &args)?.into_array()?))
    }

    // Sorted sets

    /// Adds a member with a score. Returns true when the member is new.
    pub fn zadd(&self, key: &str, score: f64, member: &[u8]) -> ClientResult<bool> {
        let score = score.to_string();
        Ok(self
            .send("ZADD", &[key.as_bytes(), score.as_bytes(), member])?
            .into_integer()?
            == 1)
    }

    /// Score of a member; `NotFound` when the member is absent.
    pub fn zscore(&self, key: &str, member: &[u8]) -> ClientResult<f64> {
        let raw = self.send("ZSCORE", &[key.as_bytes(), member])?.into_bulk()?;
        String::from_utf8_lossy(&raw)
            .trim()
            .parse()
            .map_err(|_| ClientError::protocol("score is not a number"))
    }

    /// Members ranked between `start` and `end` inclusive.
    pub fn zrange(&self, key: &str, start: i64, end: i64) -> ClientResult<Vec<Vec<u8>>> {
        let (start, end) = (start.to_string(), end.to_string());
        let items = self
            .send("ZRANGE", &[key.as_bytes(), start.as_bytes(), end.as_bytes()])?
            .into_array()?;
        Ok(values(items))
    }

    /// Number of members in a sorted set.
    pub fn zcard(&self, key: &str) -> ClientResult<i64> {
        self.send("ZCARD", &[key.as_bytes()])?.into_integer()
    }

    // Hashes

    /// Sets a hash field. Returns true when the field is new.
    pub fn hset(&self, key: &str, field: &str, value: &[u8]) -> ClientResult<bool> {
        Ok(self
            .send("HSET", &[key.as_bytes(), field.as_bytes(), value])?
            .into_integer()?
            == 1)
    }

    /// Fetches a hash field; `NotFound` when the field is missing.
    pub fn hget(&self, key: &str, field: &str) -> ClientResult<Vec<u8>> {
        self.send("HGET", &[key.as_bytes(), field.as_bytes()])?
            .into_bulk()
    }

    /// Deletes a hash field. Returns true when it was present.
    pub fn hdel(&self, key: &str, field: &str) -> ClientResult<bool> {
        Ok(self
            .send("HDEL", &[key.as_bytes(), field.as_bytes()])?
            .into_integer()?
            == 1)
    }

    /// Number of fields in a hash.
    pub fn hlen(&self, key: &str) -> ClientResult<i64> {
        self.send("HLEN", &[key.as_bytes()])?.into_integer()
    }

    /// Field names of a hash.
    pub fn hkeys(&self, key: &str) -> ClientResult<Vec<String>> {
        Ok(strings(self.send("HKEYS", &[key.as_bytes()])?.into_array()?))
    }

    /// Returns true when the hash has `field`.
    pub fn hexists(&self, key: &str, field: &str) -> ClientResult<bool> {
        Ok(self
            .send("HEXISTS", &[key.as_bytes(), field.as_bytes()])?
            .into_integer()?
            == 1)
    }

    /// Adds `delta` to an integer hash field. Returns the new value.
    pub fn hincrby(&self, key: &str, field: &str, delta: i64) -> ClientResult<i64> {
        let delta = delta.to_string();
        self.send("HINCRBY", &[key.as_bytes(), field.as_bytes(), delta.as_bytes()])?
            .into_integer()
    }

    /// Values of a hash.
    pub fn hvals(&self, key: &str) -> ClientResult<Vec<Vec<u8>>> {
        Ok(values(self.send("HVALS", &[key.as_bytes()])?.into_array()?))
    }

    /// All field/value pairs of a hash, in server order.
    pub fn hgetall(&self, key: &str) -> ClientResult<Vec<(String, Vec<u8>)>> {
        pairs(self.send("HGETALL", &[key.as_bytes()])?.into_array()?)
    }

    // Pub/sub

    /// Publishes a payload. Returns the number of receivers.
    pub fn publish(&self, channel: &str, payload: &[u8]) -> ClientResult<i64> {
        self.send("PUBLISH", &[channel.as_bytes(), payload])?
            .into_integer()
    }
}

fn values(items: Vec<Option<Vec<u8>>>) -> Vec<Vec<u8>> {
    items.into_iter().flatten().collect()
}

fn strings(items: Vec<Option<Vec<u8>>>) -> Vec<String> {
    items
        .into_iter()
        .flatten()
        .map(|item| String::from_utf8_lossy(&item).into_owned())
        .collect()
}

pub(crate) fn pairs(items: Vec<Option<Vec<u8>>>) -> ClientResult<Vec<(String, Vec<u8>)>> {
    if items.len() % 2 != 0 {
        return Err(ClientError::protocol("field/value reply has odd length"));
    }
    let mut out = Vec::with_capacity(items.len() / 2);
    let mut items = items.into_iter();
    while let (Some(field), Some(value)) = (items.next(), items.next()) {
        let field = field.ok_or_else(|| ClientError::protocol("hash field is missing"))?;
        let value = value.ok_or_else(|| ClientError::protocol("hash value is missing"))?;
        out.push((String::from_utf8_lossy(&field).into_owned(), value));
    }
    Ok(out)
}
