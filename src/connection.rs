//! The per-connection cooperative task: decode → dispatch → encode, with
//! pipelining-aware flushing and teardown.
//!
//! Peels one request off the stream, dispatches it, writes a reply, and
//! repeats until the stream closes or a handler asks to close.

use std::sync::Arc;

use log::{info, warn};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;

use crate::commands::{CommandError, CommandTable};
use crate::proto::{self, DecodeOutcome};
use crate::stats::Stats;
use crate::store::Store;

/// Requests are flushed after this many pipelined commands even if the
/// client keeps sending more without pausing.
const PIPELINE_FLUSH_THRESHOLD: u32 = 1000;

/// Drive one accepted TCP connection to completion.
pub async fn handle(socket: TcpStream, commands: Arc<CommandTable>, store: Arc<Store>, stats: Arc<Stats>) {
    stats.connection_opened();
    let peer = socket.peer_addr().ok();
    let (read_half, write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);
    let mut pipelined = 0u32;

    loop {
        let outcome = match proto::read_command(&mut reader, &mut writer).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("connection {:?} read error: {err}", peer);
                break;
            }
        };

        let args = match outcome {
            None => break,
            Some(DecodeOutcome::Empty) => continue,
            Some(DecodeOutcome::Command(args)) => args,
        };

        stats.command_processed();

        let keep_open = match commands.get(args[0].as_slice()) {
            None => {
                let msg = CommandError::Unknown.to_string();
                if proto::write_error(&mut writer, &msg).await.is_err() {
                    break;
                }
                true
            }
            Some(handler) => match handler(&mut writer, &store, &args).await {
                Ok(keep_open) => keep_open,
                Err(err) => {
                    warn!("connection {:?} write error: {err}", peer);
                    break;
                }
            },
        };

        if !keep_open {
            let _ = writer.flush().await;
            break;
        }

        pipelined += 1;
        let drained = reader.buffer().is_empty();
        if pipelined >= PIPELINE_FLUSH_THRESHOLD || drained {
            if writer.flush().await.is_err() {
                break;
            }
            pipelined = 0;
        }
    }

    stats.connection_closed();
    info!("connection {:?} closed", peer);
}
