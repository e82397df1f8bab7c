//! The listening socket and accept loop: bind, log connect/disconnect per
//! client, and spawn one task per connection so many clients are served
//! concurrently on a small pool of OS threads.

use std::sync::Arc;

use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use tokio::net::TcpListener;

use crate::commands::CommandTable;
use crate::connection;
use crate::stats::{self, Stats};
use crate::store::Store;

/// Best-effort raise of the open-file-descriptor limit, since every
/// connection holds one socket for its lifetime.
fn raise_nofile_limit() {
    match rlimit::increase_nofile_limit(u64::MAX) {
        Ok(limit) => info!("raised RLIMIT_NOFILE to {limit}"),
        Err(err) => log::warn!("could not raise RLIMIT_NOFILE: {err}"),
    }
}

/// Bind `port`, then accept connections forever, spawning one task per
/// connection. Returns only on a fatal bind/accept error.
pub async fn start(port: u16) -> Result<()> {
    raise_nofile_limit();

    let commands = Arc::new(CommandTable::new());
    let store = Arc::new(Store::new());
    let stats = Arc::new(Stats::new());

    tokio::spawn(stats::run(Arc::clone(&stats)));

    let addr = ("0.0.0.0", port);
    let listener = TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding to port {port}"))?;

    // These two lines are part of the wire-level contract clients/ops
    // tooling can grep for, so they go straight to stdout rather than
    // through the logger (which env_logger sends to stderr by default).
    println!("Using runtime: tokio");
    println!("Started BlueBox on port {port}");

    loop {
        let (socket, peer) = listener.accept().await.wrap_err("accepting connection")?;
        socket.set_nodelay(true).ok();
        info!("client connected: {peer}");

        let commands = Arc::clone(&commands);
        let store = Arc::clone(&store);
        let stats = Arc::clone(&stats);
        tokio::spawn(connection::handle(socket, commands, store, stats));
    }
}
