//! Wire protocol: the multi-bulk/inline request decoder and the reply
//! encoder.
//!
//! Framing follows a subset of the well-known RESP wire format: requests
//! arrive either as a length-prefixed array of length-prefixed bulks
//! (`*n\r\n$m\r\n...`) or as a single whitespace-tokenised inline line (the
//! "telnet" form). Replies are always one of the five RESP reply types.
//!
//! One-byte pushback — needed to tell the two request forms apart without
//! consuming the first byte — comes for free from tokio's buffered reader
//! contract: [`AsyncBufReadExt::fill_buf`] hands back the next byte(s)
//! without committing to having read them; [`AsyncBufReadExt::consume`]
//! is the actual "read".

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::bulk::Bulk;

/// Bulks longer than this are rejected.
pub const MAX_BULK_LEN: i64 = 500 * 1024 * 1024;
/// Inline ("telnet") request lines longer than this close the connection.
const MAX_INLINE_LINE: usize = 1024 * 1024;

/// A framed protocol error with an exact wire string. Writing one of these
/// to the client and closing the connection is the only client-visible
/// effect of a malformed request; I/O errors and EOF never produce one of
/// these.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("ERR Protocol error: invalid multibulk length")]
    InvalidMultibulkLength,
    #[error("ERR Protocol error: invalid bulk length")]
    InvalidBulkLength,
    #[error("ERR Protocol error: unbalanced quotes in request")]
    UnbalancedQuotes,
    #[error("ERR Protocol error: expected '$', got '{0}'")]
    ExpectedDollar(char),
}

impl ProtocolError {
    fn expected_dollar(got: u8) -> Self {
        let c = if (0x20..=0x7e).contains(&got) {
            got as char
        } else {
            '?'
        };
        ProtocolError::ExpectedDollar(c)
    }
}

/// Outcome of decoding one request frame.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// A fully-decoded command. `args[0]` is already lowercased.
    Command(Vec<Bulk>),
    /// A frame that carries no command (`*0`, `*-n`, or a blank inline
    /// line). The driver should simply read the next frame.
    Empty,
}

/// Read one request frame from `stream`.
///
/// Returns `Ok(None)` when the connection should be closed: either because
/// of clean EOF/I/O error (silent — no reply is written), or because a
/// framed protocol error was already written and flushed to the client
/// (this function does that writing itself, from inside the read path).
pub async fn read_command<R, W>(
    reader: &mut R,
    writer: &mut W,
) -> std::io::Result<Option<DecodeOutcome>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let first = match peek_byte(reader).await? {
        Some(b) => b,
        None => return Ok(None),
    };

    if first == b'*' {
        consume(reader, 1);
        read_multibulk(reader, writer).await
    } else {
        read_inline(reader, writer).await
    }
}

async fn read_multibulk<R, W>(
    reader: &mut R,
    writer: &mut W,
) -> std::io::Result<Option<DecodeOutcome>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let n = match read_decimal_line(reader, 32).await? {
        Some(Ok(n)) => n,
        Some(Err(())) => {
            write_protocol_error(writer, ProtocolError::InvalidMultibulkLength).await?;
            return Ok(None);
        }
        None => return Ok(None),
    };

    if n <= 0 {
        return Ok(Some(DecodeOutcome::Empty));
    }

    let mut args = Vec::with_capacity(n as usize);
    for _ in 0..n {
        match read_bulk(reader, writer).await? {
            ReadBulkOutcome::Bulk(b) => args.push(b),
            ReadBulkOutcome::Closed => return Ok(None),
        }
    }

    lowercase_first(&mut args);
    Ok(Some(DecodeOutcome::Command(args)))
}

enum ReadBulkOutcome {
    Bulk(Bulk),
    Closed,
}

async fn read_bulk<R, W>(reader: &mut R, writer: &mut W) -> std::io::Result<ReadBulkOutcome>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let prefix = match peek_byte(reader).await? {
        Some(b) => b,
        None => return Ok(ReadBulkOutcome::Closed),
    };
    if prefix != b'$' {
        consume(reader, 1);
        write_protocol_error(writer, ProtocolError::expected_dollar(prefix)).await?;
        return Ok(ReadBulkOutcome::Closed);
    }
    consume(reader, 1);

    let m = match read_decimal_line(reader, 32).await? {
        Some(Ok(m)) => m,
        Some(Err(())) | None => {
            write_protocol_error(writer, ProtocolError::InvalidBulkLength).await?;
            return Ok(ReadBulkOutcome::Closed);
        }
    };

    if m < -1 || m > MAX_BULK_LEN {
        write_protocol_error(writer, ProtocolError::InvalidBulkLength).await?;
        return Ok(ReadBulkOutcome::Closed);
    }
    if m == -1 {
        // Null bulk is not accepted inside a request.
        write_protocol_error(writer, ProtocolError::InvalidBulkLength).await?;
        return Ok(ReadBulkOutcome::Closed);
    }

    let len = m as usize;
    let mut buf = vec![0u8; len];
    if reader.read_exact(&mut buf).await.is_err() {
        return Ok(ReadBulkOutcome::Closed);
    }
    // Trailing \r\n is consumed but not validated byte-for-byte beyond
    // "did we get two more bytes".
    let mut trailer = [0u8; 2];
    if reader.read_exact(&mut trailer).await.is_err() {
        return Ok(ReadBulkOutcome::Closed);
    }

    Ok(ReadBulkOutcome::Bulk(Bulk::from_vec(buf)))
}

async fn read_inline<R, W>(
    reader: &mut R,
    writer: &mut W,
) -> std::io::Result<Option<DecodeOutcome>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let line = match read_capped_line(reader, MAX_INLINE_LINE).await? {
        Some(line) => line,
        None => return Ok(None),
    };

    match tokenize_inline(&line) {
        Ok(mut tokens) => {
            lowercase_first(&mut tokens);
            if tokens.is_empty() {
                Ok(Some(DecodeOutcome::Empty))
            } else {
                Ok(Some(DecodeOutcome::Command(tokens)))
            }
        }
        Err(()) => {
            write_protocol_error(writer, ProtocolError::UnbalancedQuotes).await?;
            Ok(None)
        }
    }
}

/// Tokenise one inline line: space/tab separated, with `'`/`"` taken
/// verbatim (no escapes) up to the matching quote.
fn tokenize_inline(line: &[u8]) -> Result<Vec<Bulk>, ()> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < line.len() {
        match line[i] {
            b' ' | b'\t' => {
                i += 1;
            }
            q @ (b'\'' | b'"') => {
                let start = i + 1;
                let end = line[start..].iter().position(|&b| b == q).map(|p| start + p);
                match end {
                    Some(end) => {
                        tokens.push(Bulk::from_vec(line[start..end].to_vec()));
                        i = end + 1;
                    }
                    None => return Err(()),
                }
            }
            _ => {
                let start = i;
                while i < line.len() && line[i] != b' ' && line[i] != b'\t' {
                    i += 1;
                }
                tokens.push(Bulk::from_vec(line[start..i].to_vec()));
            }
        }
    }
    Ok(tokens)
}

fn lowercase_first(args: &mut [Bulk]) {
    if let Some(first) = args.first() {
        let lowered: Vec<u8> = first.as_slice().iter().map(|b| b.to_ascii_lowercase()).collect();
        args[0] = Bulk::from_vec(lowered);
    }
}

/// Peek the next byte without consuming it. `Ok(None)` is EOF.
async fn peek_byte<S>(stream: &mut S) -> std::io::Result<Option<u8>>
where
    S: AsyncBufRead + Unpin,
{
    let buf = stream.fill_buf().await?;
    Ok(buf.first().copied())
}

fn consume<S: AsyncBufRead + Unpin>(stream: &mut S, n: usize) {
    std::pin::Pin::new(stream).consume(n);
}

/// Read a line terminated by `\n` (optional `\r` stripped), bounded by
/// `cap` bytes. `Ok(None)` means EOF before any terminator or content.
/// Exceeding `cap` without a terminator is treated the same as an I/O
/// error: silent close.
async fn read_capped_line<S>(stream: &mut S, cap: usize) -> std::io::Result<Option<Vec<u8>>>
where
    S: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        let buf = stream.fill_buf().await?;
        if buf.is_empty() {
            return if line.is_empty() {
                Ok(None)
            } else {
                // EOF mid-line: no terminator ever arrived.
                Ok(None)
            };
        }
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            line.extend_from_slice(&buf[..pos]);
            let n = pos + 1;
            consume(stream, n);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Ok(Some(line));
        }
        if line.len() + buf.len() > cap {
            let n = buf.len();
            consume(stream, n);
            return Ok(None);
        }
        line.extend_from_slice(buf);
        let n = buf.len();
        consume(stream, n);
    }
}

/// Read a decimal-integer line (digits, optional leading `-`, terminated by
/// `\n` with an optional preceding `\r`). `Ok(None)` is EOF/close; the inner
/// `Result` is `Err(())` for a non-numeric or empty line.
async fn read_decimal_line<S>(
    stream: &mut S,
    cap: usize,
) -> std::io::Result<Option<Result<i64, ()>>>
where
    S: AsyncBufRead + Unpin,
{
    let line = match read_capped_line(stream, cap).await? {
        Some(line) => line,
        None => return Ok(None),
    };
    let text = match std::str::from_utf8(&line) {
        Ok(t) => t,
        Err(_) => return Ok(Some(Err(()))),
    };
    match text.parse::<i64>() {
        Ok(n) => Ok(Some(Ok(n))),
        Err(_) => Ok(Some(Err(()))),
    }
}

async fn write_protocol_error<S>(stream: &mut S, err: ProtocolError) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(b"-").await?;
    stream.write_all(err.to_string().as_bytes()).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await
}

/// Write a simple-string reply: `+<text>\r\n`.
pub async fn write_simple<S: AsyncWrite + Unpin>(stream: &mut S, text: &str) -> std::io::Result<()> {
    stream.write_all(b"+").await?;
    stream.write_all(text.as_bytes()).await?;
    stream.write_all(b"\r\n").await
}

/// Write an error reply: `-<text>\r\n`.
pub async fn write_error<S: AsyncWrite + Unpin>(stream: &mut S, text: &str) -> std::io::Result<()> {
    stream.write_all(b"-").await?;
    stream.write_all(text.as_bytes()).await?;
    stream.write_all(b"\r\n").await
}

/// Write an integer reply: `:<n>\r\n`.
pub async fn write_integer<S: AsyncWrite + Unpin>(stream: &mut S, n: i64) -> std::io::Result<()> {
    stream.write_all(format!(":{n}\r\n").as_bytes()).await
}

/// Write a bulk reply: `$<len>\r\n<bytes>\r\n`.
pub async fn write_bulk<S: AsyncWrite + Unpin>(stream: &mut S, data: &[u8]) -> std::io::Result<()> {
    stream
        .write_all(format!("${}\r\n", data.len()).as_bytes())
        .await?;
    stream.write_all(data).await?;
    stream.write_all(b"\r\n").await
}

/// Write the null bulk reply: `$-1\r\n`.
pub async fn write_null_bulk<S: AsyncWrite + Unpin>(stream: &mut S) -> std::io::Result<()> {
    stream.write_all(b"$-1\r\n").await
}

/// Write an array header: `*<count>\r\n`. Caller writes the `count`
/// further items.
pub async fn write_array_header<S: AsyncWrite + Unpin>(
    stream: &mut S,
    count: usize,
) -> std::io::Result<()> {
    stream.write_all(format!("*{count}\r\n").as_bytes()).await
}
