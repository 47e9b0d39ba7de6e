//! # Keyspace Commands
//!
//! Handlers for every command that reads or writes one logical database.
//! Connection-level commands (AUTH, SELECT, pub/sub) live in the server
//! loop; everything here only needs the selected [`Db`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use crate::glob::glob_match;
use crate::protocol::{
    resp_array, resp_bulk, resp_error, resp_error_kind, resp_integer, resp_null, resp_simple,
};
use crate::store::{Db, TtlStatus, Value};

/// Reply on success, error reply otherwise. Both are already encoded.
type CommandResult = Result<Vec<u8>, Vec<u8>>;

type Handler = fn(&mut Db, &[Vec<u8>]) -> CommandResult;

/// A keyspace command.
///
/// `arity` counts the command name. A negative arity means "at least
/// `-arity` arguments".
pub struct Command {
    pub name: &'static str,
    pub arity: i32,
    handler: Handler,
}

impl Command {
    fn accepts(&self, argc: usize) -> bool {
        let argc = argc as i32;
        if self.arity >= 0 {
            argc == self.arity
        } else {
            argc >= -self.arity
        }
    }
}

const COMMANDS: &[Command] = &[
    Command { name: "flushdb", arity: 1, handler: flushdb },
    Command { name: "dbsize", arity: 1, handler: dbsize },
    Command { name: "exists", arity: -2, handler: exists },
    Command { name: "del", arity: -2, handler: del },
    Command { name: "type", arity: 2, handler: key_type },
    Command { name: "keys", arity: 2, handler: keys },
    Command { name: "rename", arity: 3, handler: rename },
    Command { name: "expire", arity: 3, handler: expire },
    Command { name: "ttl", arity: 2, handler: ttl },
    Command { name: "get", arity: 2, handler: get },
    Command { name: "set", arity: -3, handler: set },
    Command { name: "setnx", arity: 3, handler: setnx },
    Command { name: "setex", arity: 4, handler: setex },
    Command { name: "getset", arity: 3, handler: getset },
    Command { name: "mget", arity: -2, handler: mget },
    Command { name: "incr", arity: 2, handler: incr },
    Command { name: "incrby", arity: 3, handler: incrby },
    Command { name: "decr", arity: 2, handler: decr },
    Command { name: "decrby", arity: 3, handler: decrby },
    Command { name: "append", arity: 3, handler: append },
    Command { name: "rpush", arity: -3, handler: rpush },
    Command { name: "lpush", arity: -3, handler: lpush },
    Command { name: "llen", arity: 2, handler: llen },
    Command { name: "lrange", arity: 4, handler: lrange },
    Command { name: "lpop", arity: 2, handler: lpop },
    Command { name: "rpop", arity: 2, handler: rpop },
    Command { name: "sadd", arity: -3, handler: sadd },
    Command { name: "srem", arity: -3, handler: srem },
    Command { name: "sismember", arity: 3, handler: sismember },
    Command { name: "smembers", arity: 2, handler: smembers },
    Command { name: "scard", arity: 2, handler: scard },
    Command { name: "sinter", arity: -2, handler: sinter },
    Command { name: "sunion", arity: -2, handler: sunion },
    Command { name: "sdiff", arity: -2, handler: sdiff },
    Command { name: "hset", arity: -4, handler: hset },
    Command { name: "hmset", arity: -4, handler: hmset },
    Command { name: "hget", arity: 3, handler: hget },
    Command { name: "hexists", arity: 3, handler: hexists },
    Command { name: "hincrby", arity: 4, handler: hincrby },
    Command { name: "hdel", arity: -3, handler: hdel },
    Command { name: "hlen", arity: 2, handler: hlen },
    Command { name: "hkeys", arity: 2, handler: hkeys },
    Command { name: "hvals", arity: 2, handler: hvals },
    Command { name: "hgetall", arity: 2, handler: hgetall },
];

pub fn lookup(name: &[u8]) -> Option<&'static Command> {
    COMMANDS
        .iter()
        .find(|command| command.name.as_bytes().eq_ignore_ascii_case(name))
}

/// Runs `args` against `db` if it names a keyspace command.
///
/// Returns `None` for names this module does not handle.
pub fn execute(db: &mut Db, args: &[Vec<u8>]) -> Option<Vec<u8>> {
    let command = lookup(args.first()?)?;
    if !command.accepts(args.len()) {
        return Some(resp_error(&format!(
            "wrong number of arguments for '{}' command",
            command.name
        )));
    }
    Some((command.handler)(db, args).unwrap_or_else(|err| err))
}

fn wrong_type() -> Vec<u8> {
    resp_error_kind(
        "WRONGTYPE",
        "Operation against a key holding the wrong kind of value",
    )
}

fn parse_int(arg: &[u8]) -> Result<i64, Vec<u8>> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| resp_error("value is not an integer or out of range"))
}

fn ok() -> CommandResult {
    Ok(resp_simple("OK"))
}

fn string_value<'a>(db: &'a mut Db, key: &[u8]) -> Result<Option<&'a [u8]>, Vec<u8>> {
    match db.get(key) {
        None => Ok(None),
        Some(Value::Str(data)) => Ok(Some(data)),
        Some(_) => Err(wrong_type()),
    }
}

fn existing_list<'a>(
    db: &'a mut Db,
    key: &[u8],
) -> Result<Option<&'a mut VecDeque<Vec<u8>>>, Vec<u8>> {
    match db.get_mut(key) {
        None => Ok(None),
        Some(Value::List(items)) => Ok(Some(items)),
        Some(_) => Err(wrong_type()),
    }
}

fn list_entry<'a>(db: &'a mut Db, key: &[u8]) -> Result<&'a mut VecDeque<Vec<u8>>, Vec<u8>> {
    match db.get_or_insert_with(key, || Value::List(VecDeque::new())) {
        Value::List(items) => Ok(items),
        _ => Err(wrong_type()),
    }
}

fn existing_set<'a>(db: &'a mut Db, key: &[u8]) -> Result<Option<&'a mut HashSet<Vec<u8>>>, Vec<u8>> {
    match db.get_mut(key) {
        None => Ok(None),
        Some(Value::Set(members)) => Ok(Some(members)),
        Some(_) => Err(wrong_type()),
    }
}

fn set_entry<'a>(db: &'a mut Db, key: &[u8]) -> Result<&'a mut HashSet<Vec<u8>>, Vec<u8>> {
    match db.get_or_insert_with(key, || Value::Set(HashSet::new())) {
        Value::Set(members) => Ok(members),
        _ => Err(wrong_type()),
    }
}

fn existing_hash<'a>(
    db: &'a mut Db,
    key: &[u8],
) -> Result<Option<&'a mut HashMap<Vec<u8>, Vec<u8>>>, Vec<u8>> {
    match db.get_mut(key) {
        None => Ok(None),
        Some(Value::Hash(fields)) => Ok(Some(fields)),
        Some(_) => Err(wrong_type()),
    }
}

fn hash_entry<'a>(db: &'a mut Db, key: &[u8]) -> Result<&'a mut HashMap<Vec<u8>, Vec<u8>>, Vec<u8>> {
    match db.get_or_insert_with(key, || Value::Hash(HashMap::new())) {
        Value::Hash(fields) => Ok(fields),
        _ => Err(wrong_type()),
    }
}

// keys

fn flushdb(db: &mut Db, _args: &[Vec<u8>]) -> CommandResult {
    db.clear();
    ok()
}

fn dbsize(db: &mut Db, _args: &[Vec<u8>]) -> CommandResult {
    Ok(resp_integer(db.len() as i64))
}

fn exists(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let count = args[1..].iter().filter(|key| db.contains(key)).count();
    Ok(resp_integer(count as i64))
}

fn del(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let removed = args[1..]
        .iter()
        .filter(|key| db.remove(key).is_some())
        .count();
    Ok(resp_integer(removed as i64))
}

fn key_type(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    Ok(resp_simple(db.get(&args[1]).map_or("none", Value::type_name)))
}

fn keys(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let pattern = &args[1];
    let matched: Vec<Vec<u8>> = db
        .keys()
        .into_iter()
        .filter(|key| glob_match(pattern, key))
        .collect();
    Ok(resp_array(matched.iter().map(|key| Some(key.as_slice()))))
}

fn rename(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    if db.rename(&args[1], &args[2]) {
        ok()
    } else {
        Err(resp_error("no such key"))
    }
}

fn expire(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let seconds = parse_int(&args[2])?;
    let applied = if seconds <= 0 {
        db.remove(&args[1]).is_some()
    } else {
        db.expire(&args[1], Duration::from_secs(seconds as u64))
    };
    Ok(resp_integer(applied as i64))
}

fn ttl(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let seconds = match db.ttl(&args[1]) {
        TtlStatus::Missing => -2,
        TtlStatus::NoExpiry => -1,
        TtlStatus::ExpiresIn(remaining) => ((remaining.as_millis() + 500) / 1000) as i64,
    };
    Ok(resp_integer(seconds))
}

// strings

fn get(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    Ok(string_value(db, &args[1])?.map_or_else(resp_null, resp_bulk))
}

fn set(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let ttl = match &args[3..] {
        [] => None,
        [option, seconds] if option.eq_ignore_ascii_case(b"EX") => match parse_int(seconds)? {
            seconds if seconds > 0 => Some(Duration::from_secs(seconds as u64)),
            _ => return Err(resp_error("invalid expire time in 'set' command")),
        },
        _ => return Err(resp_error("syntax error")),
    };

    db.insert(args[1].clone(), Value::Str(args[2].clone()));
    if let Some(ttl) = ttl {
        db.expire(&args[1], ttl);
    }
    ok()
}

fn setnx(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    if db.contains(&args[1]) {
        return Ok(resp_integer(0));
    }
    db.insert(args[1].clone(), Value::Str(args[2].clone()));
    Ok(resp_integer(1))
}

fn setex(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let seconds = parse_int(&args[2])?;
    if seconds <= 0 {
        return Err(resp_error("invalid expire time in 'setex' command"));
    }
    db.insert(args[1].clone(), Value::Str(args[3].clone()));
    db.expire(&args[1], Duration::from_secs(seconds as u64));
    ok()
}

fn getset(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let previous = string_value(db, &args[1])?.map(<[u8]>::to_vec);
    db.insert(args[1].clone(), Value::Str(args[2].clone()));
    Ok(previous.map_or_else(resp_null, |data| resp_bulk(&data)))
}

fn mget(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let values: Vec<Option<Vec<u8>>> = args[1..]
        .iter()
        .map(|key| match db.get(key) {
            Some(Value::Str(data)) => Some(data.clone()),
            _ => None,
        })
        .collect();
    Ok(resp_array(values.iter().map(Option::as_deref)))
}

fn add_to_integer(db: &mut Db, key: &[u8], delta: i64) -> CommandResult {
    let current = match string_value(db, key)? {
        Some(data) => parse_int(data)?,
        None => 0,
    };
    let next = current
        .checked_add(delta)
        .ok_or_else(|| resp_error("increment or decrement would overflow"))?;
    db.replace(key, Value::Str(next.to_string().into_bytes()));
    Ok(resp_integer(next))
}

fn incr(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    add_to_integer(db, &args[1], 1)
}

fn incrby(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let delta = parse_int(&args[2])?;
    add_to_integer(db, &args[1], delta)
}

fn decr(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    add_to_integer(db, &args[1], -1)
}

fn decrby(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let delta = parse_int(&args[2])?
        .checked_neg()
        .ok_or_else(|| resp_error("decrement would overflow"))?;
    add_to_integer(db, &args[1], delta)
}

fn append(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let mut data = string_value(db, &args[1])?.map(<[u8]>::to_vec).unwrap_or_default();
    data.extend_from_slice(&args[2]);
    let len = data.len();
    db.replace(&args[1], Value::Str(data));
    Ok(resp_integer(len as i64))
}

// lists

fn rpush(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let items = list_entry(db, &args[1])?;
    items.extend(args[2..].iter().cloned());
    Ok(resp_integer(items.len() as i64))
}

fn lpush(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let items = list_entry(db, &args[1])?;
    for item in &args[2..] {
        items.push_front(item.clone());
    }
    Ok(resp_integer(items.len() as i64))
}

fn llen(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let len = existing_list(db, &args[1])?.map_or(0, |items| items.len());
    Ok(resp_integer(len as i64))
}

/// Resolves inclusive, possibly negative indexes against `len`.
fn range_bounds(len: usize, start: i64, end: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { len + end } else { end.min(len - 1) };
    if start > end || start >= len {
        None
    } else {
        Some((start as usize, end as usize))
    }
}

fn lrange(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let start = parse_int(&args[2])?;
    let end = parse_int(&args[3])?;
    let items = match existing_list(db, &args[1])? {
        Some(items) => items,
        None => return Ok(resp_array(std::iter::empty())),
    };
    match range_bounds(items.len(), start, end) {
        Some((start, end)) => Ok(resp_array(
            items.range(start..=end).map(|item| Some(item.as_slice())),
        )),
        None => Ok(resp_array(std::iter::empty())),
    }
}

fn pop(db: &mut Db, key: &[u8], front: bool) -> CommandResult {
    let item = match existing_list(db, key)? {
        Some(items) if front => items.pop_front(),
        Some(items) => items.pop_back(),
        None => None,
    };
    db.remove_if_empty(key);
    Ok(item.map_or_else(resp_null, |item| resp_bulk(&item)))
}

fn lpop(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    pop(db, &args[1], true)
}

fn rpop(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    pop(db, &args[1], false)
}

// sets

fn sadd(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let members = set_entry(db, &args[1])?;
    let added = args[2..]
        .iter()
        .filter(|member| members.insert(member.to_vec()))
        .count();
    Ok(resp_integer(added as i64))
}

fn srem(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let removed = match existing_set(db, &args[1])? {
        Some(members) => args[2..]
            .iter()
            .filter(|member| members.remove(member.as_slice()))
            .count(),
        None => 0,
    };
    db.remove_if_empty(&args[1]);
    Ok(resp_integer(removed as i64))
}

fn sismember(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let found = existing_set(db, &args[1])?.map_or(false, |members| members.contains(&args[2]));
    Ok(resp_integer(found as i64))
}

fn smembers(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    match existing_set(db, &args[1])? {
        Some(members) => Ok(resp_array(members.iter().map(|m| Some(m.as_slice())))),
        None => Ok(resp_array(std::iter::empty())),
    }
}

fn scard(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let len = existing_set(db, &args[1])?.map_or(0, |members| members.len());
    Ok(resp_integer(len as i64))
}

/// Snapshot of every set named in `keys`; missing keys read as empty.
fn collect_sets(db: &mut Db, keys: &[Vec<u8>]) -> Result<Vec<HashSet<Vec<u8>>>, Vec<u8>> {
    let mut sets = Vec::with_capacity(keys.len());
    for key in keys {
        sets.push(existing_set(db, key)?.map(|members| members.clone()).unwrap_or_default());
    }
    Ok(sets)
}

fn members_reply(members: &HashSet<Vec<u8>>) -> Vec<u8> {
    resp_array(members.iter().map(|m| Some(m.as_slice())))
}

fn sinter(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let sets = collect_sets(db, &args[1..])?;
    let (first, rest) = match sets.split_first() {
        Some(split) => split,
        None => return Ok(resp_array(std::iter::empty())),
    };
    let common: HashSet<Vec<u8>> = first
        .iter()
        .filter(|member| rest.iter().all(|other| other.contains(*member)))
        .cloned()
        .collect();
    Ok(members_reply(&common))
}

fn sunion(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let sets = collect_sets(db, &args[1..])?;
    let all: HashSet<Vec<u8>> = sets.into_iter().flatten().collect();
    Ok(members_reply(&all))
}

fn sdiff(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let mut sets = collect_sets(db, &args[1..])?.into_iter();
    let mut remaining = sets.next().unwrap_or_default();
    for other in sets {
        remaining.retain(|member| !other.contains(member));
    }
    Ok(members_reply(&remaining))
}

// hashes

fn store_fields(db: &mut Db, args: &[Vec<u8>], command: &str) -> Result<usize, Vec<u8>> {
    let pairs = &args[2..];
    if pairs.len() % 2 != 0 {
        return Err(resp_error(&format!(
            "wrong number of arguments for '{}' command",
            command
        )));
    }
    let fields = hash_entry(db, &args[1])?;
    let created = pairs
        .chunks_exact(2)
        .filter(|pair| fields.insert(pair[0].clone(), pair[1].clone()).is_none())
        .count();
    Ok(created)
}

fn hset(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let created = store_fields(db, args, "hset")?;
    Ok(resp_integer(created as i64))
}

fn hmset(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    store_fields(db, args, "hmset")?;
    ok()
}

fn hget(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let value = existing_hash(db, &args[1])?.and_then(|fields| fields.get(&args[2]));
    Ok(value.map_or_else(resp_null, |data| resp_bulk(data)))
}

fn hexists(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let found = existing_hash(db, &args[1])?.map_or(false, |fields| fields.contains_key(&args[2]));
    Ok(resp_integer(found as i64))
}

fn hincrby(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let delta = parse_int(&args[3])?;
    let fields = hash_entry(db, &args[1])?;
    let current = match fields.get(&args[2]) {
        Some(data) => parse_int(data).map_err(|_| resp_error("hash value is not an integer"))?,
        None => 0,
    };
    let next = current
        .checked_add(delta)
        .ok_or_else(|| resp_error("increment or decrement would overflow"))?;
    fields.insert(args[2].clone(), next.to_string().into_bytes());
    Ok(resp_integer(next))
}

fn hdel(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let removed = match existing_hash(db, &args[1])? {
        Some(fields) => args[2..]
            .iter()
            .filter(|field| fields.remove(field.as_slice()).is_some())
            .count(),
        None => 0,
    };
    db.remove_if_empty(&args[1]);
    Ok(resp_integer(removed as i64))
}

fn hlen(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let len = existing_hash(db, &args[1])?.map_or(0, |fields| fields.len());
    Ok(resp_integer(len as i64))
}

fn hkeys(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    match existing_hash(db, &args[1])? {
        Some(fields) => Ok(resp_array(fields.keys().map(|f| Some(f.as_slice())))),
        None => Ok(resp_array(std::iter::empty())),
    }
}

fn hvals(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    match existing_hash(db, &args[1])? {
        Some(fields) => Ok(resp_array(fields.values().map(|v| Some(v.as_slice())))),
        None => Ok(resp_array(std::iter::empty())),
    }
}

fn hgetall(db: &mut Db, args: &[Vec<u8>]) -> CommandResult {
    let fields = match existing_hash(db, &args[1])? {
        Some(fields) => fields,
        None => return Ok(resp_array(std::iter::empty())),
    };
    let items: Vec<Option<&[u8]>> = fields
        .iter()
        .flat_map(|(field, value)| [Some(field.as_slice()), Some(value.as_slice())])
        .collect();
    Ok(resp_array(items.into_iter()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(db: &mut Db, parts: &[&str]) -> Vec<u8> {
        let args: Vec<Vec<u8>> = parts.iter().map(|p| p.as_bytes().to_vec()).collect();
        execute(db, &args).expect("keyspace command")
    }

    #[test]
    fn string_commands() {
        let mut db = Db::default();
        assert_eq!(run(&mut db, &["SET", "k", "v"]), b"+OK\r\n");
        assert_eq!(run(&mut db, &["get", "k"]), b"$1\r\nv\r\n");
        assert_eq!(run(&mut db, &["GET", "missing"]), b"$-1\r\n");
        assert_eq!(run(&mut db, &["APPEND", "k", "w"]), b":2\r\n");
        assert_eq!(run(&mut db, &["GETSET", "k", "x"]), b"$2\r\nvw\r\n");
        assert_eq!(run(&mut db, &["SETNX", "k", "y"]), b":0\r\n");
        assert_eq!(
            run(&mut db, &["MGET", "k", "missing"]),
            b"*2\r\n$1\r\nx\r\n$-1\r\n"
        );
    }

    #[test]
    fn counters() {
        let mut db = Db::default();
        assert_eq!(run(&mut db, &["INCR", "n"]), b":1\r\n");
        assert_eq!(run(&mut db, &["INCRBY", "n", "41"]), b":42\r\n");
        assert_eq!(run(&mut db, &["DECRBY", "n", "2"]), b":40\r\n");
        assert_eq!(run(&mut db, &["DECR", "n"]), b":39\r\n");

        run(&mut db, &["SET", "s", "abc"]);
        assert_eq!(
            run(&mut db, &["INCR", "s"]),
            b"-ERR value is not an integer or out of range\r\n"
        );
    }

    #[test]
    fn wrong_type_is_reported() {
        let mut db = Db::default();
        run(&mut db, &["RPUSH", "l", "a"]);
        let reply = run(&mut db, &["GET", "l"]);
        assert!(reply.starts_with(b"-WRONGTYPE "));
        assert!(run(&mut db, &["SADD", "l", "a"]).starts_with(b"-WRONGTYPE "));
        assert_eq!(run(&mut db, &["TYPE", "l"]), b"+list\r\n");
    }

    #[test]
    fn arity_is_checked() {
        let mut db = Db::default();
        assert_eq!(
            run(&mut db, &["GET"]),
            b"-ERR wrong number of arguments for 'get' command\r\n"
        );
        assert_eq!(
            run(&mut db, &["HSET", "h", "f", "v", "g"]),
            b"-ERR wrong number of arguments for 'hset' command\r\n"
        );
        assert!(execute(&mut db, &[b"SUBSCRIBE".to_vec()]).is_none());
    }

    #[test]
    fn list_commands() {
        let mut db = Db::default();
        assert_eq!(run(&mut db, &["RPUSH", "l", "b", "c"]), b":2\r\n");
        assert_eq!(run(&mut db, &["LPUSH", "l", "a"]), b":3\r\n");
        assert_eq!(
            run(&mut db, &["LRANGE", "l", "0", "-1"]),
            b"*3\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n"
        );
        assert_eq!(run(&mut db, &["LRANGE", "l", "5", "9"]), b"*0\r\n");
        assert_eq!(run(&mut db, &["LPOP", "l"]), b"$1\r\na\r\n");
        assert_eq!(run(&mut db, &["RPOP", "l"]), b"$1\r\nc\r\n");
        assert_eq!(run(&mut db, &["RPOP", "l"]), b"$1\r\nb\r\n");
        assert_eq!(run(&mut db, &["EXISTS", "l"]), b":0\r\n");
        assert_eq!(run(&mut db, &["LPOP", "l"]), b"$-1\r\n");
    }

    #[test]
    fn set_and_hash_commands() {
        let mut db = Db::default();
        assert_eq!(run(&mut db, &["SADD", "s", "a", "a", "b"]), b":2\r\n");
        assert_eq!(run(&mut db, &["SISMEMBER", "s", "a"]), b":1\r\n");
        assert_eq!(run(&mut db, &["SREM", "s", "a"]), b":1\r\n");
        assert_eq!(run(&mut db, &["SCARD", "s"]), b":1\r\n");

        assert_eq!(run(&mut db, &["HMSET", "h", "f", "1", "g", "2"]), b"+OK\r\n");
        assert_eq!(run(&mut db, &["HSET", "h", "f", "3"]), b":0\r\n");
        assert_eq!(run(&mut db, &["HGET", "h", "f"]), b"$1\r\n3\r\n");
        assert_eq!(run(&mut db, &["HLEN", "h"]), b":2\r\n");
        assert_eq!(run(&mut db, &["HDEL", "h", "f", "g"]), b":2\r\n");
        assert_eq!(run(&mut db, &["HGETALL", "h"]), b"*0\r\n");
    }

    #[test]
    fn set_algebra() {
        let mut db = Db::default();
        run(&mut db, &["SADD", "a", "x", "y"]);
        run(&mut db, &["SADD", "b", "y", "z"]);
        assert_eq!(run(&mut db, &["SINTER", "a", "b"]), b"*1\r\n$1\r\ny\r\n");
        assert_eq!(run(&mut db, &["SDIFF", "a", "b"]), b"*1\r\n$1\r\nx\r\n");
        assert_eq!(run(&mut db, &["SINTER", "a", "missing"]), b"*0\r\n");
        assert!(run(&mut db, &["SUNION", "a", "b", "missing"]).starts_with(b"*3\r\n"));

        run(&mut db, &["SET", "str", "v"]);
        assert!(run(&mut db, &["SUNION", "a", "str"]).starts_with(b"-WRONGTYPE "));
    }

    #[test]
    fn hash_counters_and_lookups() {
        let mut db = Db::default();
        assert_eq!(run(&mut db, &["HINCRBY", "h", "n", "5"]), b":5\r\n");
        assert_eq!(run(&mut db, &["HINCRBY", "h", "n", "-7"]), b":-2\r\n");
        assert_eq!(run(&mut db, &["HEXISTS", "h", "n"]), b":1\r\n");
        assert_eq!(run(&mut db, &["HEXISTS", "h", "other"]), b":0\r\n");
        assert_eq!(run(&mut db, &["HVALS", "h"]), b"*1\r\n$2\r\n-2\r\n");
        assert_eq!(run(&mut db, &["HVALS", "missing"]), b"*0\r\n");

        run(&mut db, &["HSET", "h", "word", "abc"]);
        assert_eq!(
            run(&mut db, &["HINCRBY", "h", "word", "1"]),
            b"-ERR hash value is not an integer\r\n"
        );
    }

    #[test]
    fn keys_and_expiry() {
        let mut db = Db::default();
        run(&mut db, &["SET", "user:1", "a"]);
        run(&mut db, &["SET", "user:2", "b"]);
        run(&mut db, &["SET", "order:1", "c"]);
        assert_eq!(run(&mut db, &["KEYS", "order:*"]), b"*1\r\n$7\r\norder:1\r\n");
        assert_eq!(run(&mut db, &["DBSIZE"]), b":3\r\n");

        assert_eq!(run(&mut db, &["TTL", "user:1"]), b":-1\r\n");
        assert_eq!(run(&mut db, &["EXPIRE", "user:1", "100"]), b":1\r\n");
        assert_eq!(run(&mut db, &["TTL", "user:1"]), b":100\r\n");
        assert_eq!(run(&mut db, &["TTL", "nope"]), b":-2\r\n");

        assert_eq!(run(&mut db, &["RENAME", "user:2", "user:3"]), b"+OK\r\n");
        assert_eq!(run(&mut db, &["RENAME", "user:2", "x"]), b"-ERR no such key\r\n");
        assert_eq!(run(&mut db, &["DEL", "user:1", "user:3", "nope"]), b":2\r\n");
    }

    #[test]
    fn range_bounds_clamp() {
        assert_eq!(range_bounds(3, 0, -1), Some((0, 2)));
        assert_eq!(range_bounds(3, -10, 1), Some((0, 1)));
        assert_eq!(range_bounds(3, 2, 100), Some((2, 2)));
        assert_eq!(range_bounds(0, 0, -1), None);
        assert_eq!(range_bounds(3, 2, 1), None);
    }
}
