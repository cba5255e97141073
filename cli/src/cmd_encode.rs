//! `textsink encode`: turn NDJSON into length-prefixed frames.

use anyhow::{Context, Result};
use textsink_core::{write_frame, Destination};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::debug;

use crate::cmd_render::open_input;

pub async fn run(input: &str, output: &str) -> Result<()> {
    let reader = open_input(input).await?;
    let mut writer = BufWriter::new(
        Destination::parse(output)
            .open()
            .with_context(|| format!("cannot open output '{output}'"))?,
    );

    let mut lines = BufReader::new(reader).lines();
    let mut line_no = 0usize;
    let mut frames = 0usize;
    while let Some(line) = lines.next_line().await.context("reading input")? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        serde_json::from_str::<serde_json::Value>(line)
            .with_context(|| format!("line {line_no} is not valid JSON"))?;
        write_frame(&mut writer, line.as_bytes())
            .await
            .with_context(|| format!("writing frame for line {line_no}"))?;
        frames += 1;
    }
    writer.flush().await.context("flushing output")?;
    debug!(frames, "encode complete");
    Ok(())
}
