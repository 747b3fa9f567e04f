//! Protocol line framing and the channel-to-writer pump.

use loom_bridge::CancellationToken;
use serde_json::json;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

pub const ERROR_LINE_PREFIX: &str = "error:";

/// Frames one producer line for the wire.
///
/// `error:<message>` lines become a `code: -1` data frame; every other line
/// gets a trailing newline, which turns `data:<json>\n` into a complete event.
///
/// The compositor never writes `error:` lines itself; its failures travel as
/// `data:` failure envelopes. The error branch serves agent runtimes and
/// upstream services that push raw `error:<message>` lines into the channel.
///
/// # Examples
///
/// ```
/// use loom_gateway::frame_line;
///
/// assert_eq!(frame_line("data:{}\n"), "data:{}\n\n");
/// assert_eq!(
///     frame_line("error:quota exceeded"),
///     "data: {\"code\":-1,\"message\":\"quota exceeded\"}\n\n"
/// );
/// ```
pub fn frame_line(line: &str) -> String {
    match line.strip_prefix(ERROR_LINE_PREFIX) {
        Some(message) => format!("data: {}\n\n", json!({"code": -1, "message": message})),
        None => format!("{line}\n"),
    }
}

/// Drains `lines` into `writer`, flushing after every frame, then writes the
/// optional done message. Returns the number of frames written.
///
/// A write failure means the client went away: the token is cancelled so the
/// producer unwinds, and the error is returned.
pub async fn write_stream<W>(
    mut lines: mpsc::Receiver<String>,
    writer: &mut W,
    label: &str,
    done_message: Option<&str>,
    token: &CancellationToken,
) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    loop {
        let line = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!(label, written, "line writer cancelled");
                return Ok(written);
            }
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            break;
        };
        write_frame(writer, &frame_line(&line), label, token).await?;
        written += 1;
    }
    if let Some(done) = done_message {
        write_frame(writer, &frame_line(done), label, token).await?;
        written += 1;
    }
    tracing::debug!(label, written, "line writer finished");
    Ok(written)
}

async fn write_frame<W>(
    writer: &mut W,
    frame: &str,
    label: &str,
    token: &CancellationToken,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let result = async {
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await
    }
    .await;
    if let Err(error) = &result {
        tracing::warn!(label, %error, "connection closed while streaming");
        token.cancel();
    }
    result
}
