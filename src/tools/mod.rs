//! Caller-facing operation surface.
//!
//! [`Harness`] owns at most one [`ActiveSession`](crate::session::ActiveSession)
//! and answers [`ToolRequest`]s with plain-text [`ToolResponse`]s. [`serve`]
//! drives it over a newline-delimited JSON stream.

pub mod dispatch;
pub mod registry;

pub use dispatch::{Harness, ToolRequest, ToolResponse};
pub use registry::{find_tool, render_tool_list, ToolDef, TOOLS};

use crate::error::{HarnessError, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Answer one JSON request per input line until EOF. Malformed lines get an
/// `INVALID_REQUEST` response and the loop continues.
pub async fn serve<R, W>(harness: &mut Harness, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.map_err(stream_error)? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ToolRequest>(&line) {
            Ok(request) => harness.handle(request).await,
            Err(e) => ToolResponse::failure(&HarnessError::InvalidRequest(e.to_string())),
        };
        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        writer
            .write_all(encoded.as_bytes())
            .await
            .map_err(stream_error)?;
        writer.flush().await.map_err(stream_error)?;
    }
    tracing::info!("Request stream closed");
    Ok(())
}

fn stream_error(err: std::io::Error) -> HarnessError {
    HarnessError::storage("<stdio>", "request stream failed", err)
}
