//! Line-delimited serve loop
//!
//! One JSON-RPC message per `\n`-terminated line over any byte stream;
//! standard input/output is the expected transport. Only protocol messages
//! are written to the stream; all logging goes through `tracing` on the
//! sideband.

use crate::dispatcher::{ConnectionState, Dispatcher};
use agrama_core::BufferPool;
use std::io::{BufRead, Write};

/// Serve one connection until EOF.
///
/// Parse failures and dispatch errors are answered on the wire and never
/// terminate the loop; only I/O failure on the stream itself ends it.
/// Response framing reuses a pooled buffer across lines.
pub fn serve_connection(
    dispatcher: &Dispatcher,
    reader: impl BufRead,
    mut writer: impl Write,
) -> std::io::Result<()> {
    let mut conn = ConnectionState::default();
    let buffers = BufferPool::new(2);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        tracing::debug!(bytes = line.len(), "request line");
        if let Some(response) = dispatcher.handle_line(&mut conn, &line) {
            let mut frame = buffers.checkout();
            frame.extend_from_slice(response.as_bytes());
            frame.push(b'\n');
            let outcome = writer.write_all(&frame).and_then(|_| writer.flush());
            buffers.giveback(frame);
            outcome?;
        }
    }
    tracing::debug!(agent = %conn.agent_id, "connection closed");
    Ok(())
}
