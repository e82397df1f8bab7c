//! Command descriptor table and the seven command handlers.
//!
//! A hash map from lowercased name to handler, built once at startup and
//! never mutated afterwards. The arity check lives inside each handler,
//! so an unknown command can return the generic error without consulting
//! a separate arity table.

use std::collections::HashMap;

use thiserror::Error;
use tokio::io::AsyncWrite;

use crate::bulk::Bulk;
use crate::proto::{write_array_header, write_bulk, write_integer, write_null_bulk, write_simple};
use crate::store::Store;

/// Client command errors: reported to the client, connection stays open.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("ERR wrong number of arguments")]
    WrongArity,
    #[error("ERR unknown command")]
    Unknown,
}

/// `true` = keep the connection open, `false` = close after the
/// already-written reply.
pub type CommandResult = std::io::Result<bool>;

type CommandFn =
    for<'a> fn(
        &'a mut (dyn AsyncWrite + Unpin + Send),
        &'a Store,
        &'a [Bulk],
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = CommandResult> + Send + 'a>>;

/// The case-insensitive name -> handler table. Built once at startup.
pub struct CommandTable(HashMap<&'static str, CommandFn>);

impl CommandTable {
    pub fn new() -> Self {
        let mut table: HashMap<&'static str, CommandFn> = HashMap::new();
        table.insert("ping", |s, st, a| Box::pin(ping(s, st, a)));
        table.insert("set", |s, st, a| Box::pin(set(s, st, a)));
        table.insert("get", |s, st, a| Box::pin(get(s, st, a)));
        table.insert("del", |s, st, a| Box::pin(del(s, st, a)));
        table.insert("dbsize", |s, st, a| Box::pin(dbsize(s, st, a)));
        table.insert("keys", |s, st, a| Box::pin(keys(s, st, a)));
        table.insert("quit", |s, st, a| Box::pin(quit(s, st, a)));
        Self(table)
    }

    /// Look up a command by its (already-lowercased) name.
    pub fn get(&self, name: &[u8]) -> Option<&CommandFn> {
        std::str::from_utf8(name).ok().and_then(|n| self.0.get(n))
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

async fn ping<S: AsyncWrite + Unpin + Send + ?Sized>(
    stream: &mut S,
    _store: &Store,
    args: &[Bulk],
) -> CommandResult {
    match args.len() {
        1 => write_simple(stream, "PONG").await?,
        2 => write_bulk(stream, args[1].as_slice()).await?,
        _ => return wrong_arity(stream).await,
    }
    Ok(true)
}

async fn set<S: AsyncWrite + Unpin + Send + ?Sized>(
    stream: &mut S,
    store: &Store,
    args: &[Bulk],
) -> CommandResult {
    if args.len() != 3 {
        return wrong_arity(stream).await;
    }
    store.set(args[1].clone(), args[2].clone());
    write_simple(stream, "OK").await?;
    Ok(true)
}

async fn get<S: AsyncWrite + Unpin + Send + ?Sized>(
    stream: &mut S,
    store: &Store,
    args: &[Bulk],
) -> CommandResult {
    if args.len() != 2 {
        return wrong_arity(stream).await;
    }
    match store.get(args[1].as_slice()) {
        Some(value) => write_bulk(stream, value.as_slice()).await?,
        None => write_null_bulk(stream).await?,
    }
    Ok(true)
}

async fn del<S: AsyncWrite + Unpin + Send + ?Sized>(
    stream: &mut S,
    store: &Store,
    args: &[Bulk],
) -> CommandResult {
    if args.len() < 2 {
        return wrong_arity(stream).await;
    }
    let mut count = 0i64;
    for key in &args[1..] {
        if store.delete(key.as_slice()).is_some() {
            count += 1;
        }
    }
    write_integer(stream, count).await?;
    Ok(true)
}

async fn dbsize<S: AsyncWrite + Unpin + Send + ?Sized>(
    stream: &mut S,
    store: &Store,
    _args: &[Bulk],
) -> CommandResult {
    write_integer(stream, store.count() as i64).await?;
    Ok(true)
}

/// Arity is not validated for `KEYS` — any argument count is accepted.
async fn keys<S: AsyncWrite + Unpin + Send + ?Sized>(
    stream: &mut S,
    store: &Store,
    _args: &[Bulk],
) -> CommandResult {
    let snapshot = store.keys();
    write_array_header(stream, snapshot.len()).await?;
    for key in &snapshot {
        write_bulk(stream, key.as_slice()).await?;
    }
    Ok(true)
}

async fn quit<S: AsyncWrite + Unpin + Send + ?Sized>(
    stream: &mut S,
    _store: &Store,
    _args: &[Bulk],
) -> CommandResult {
    // Best-effort reply: write `+OK` without checking the result before
    // closing.
    let _ = write_simple(stream, "OK").await;
    Ok(false)
}

async fn wrong_arity<S: AsyncWrite + Unpin + Send + ?Sized>(stream: &mut S) -> CommandResult {
    crate::proto::write_error(stream, &CommandError::WrongArity.to_string()).await?;
    Ok(true)
}
