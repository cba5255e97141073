//! `textsink render`: feed framed input through a `TextOutput`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use textsink_core::{
    format, ExitOnFatal, FrameReader, JsonRecord, LogFatal, SinkConfig, TextOutput,
};
use tokio::io::AsyncRead;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TextFormat {
    /// One compact JSON document per line
    Jsonl,
    /// `---` separated YAML documents, closed with `...`
    Yaml,
}

pub struct RenderArgs {
    pub input: String,
    pub output: String,
    pub format: TextFormat,
    pub capacity: Option<usize>,
    pub config: Option<PathBuf>,
    pub exit_on_fatal: bool,
}

pub async fn run(args: RenderArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SinkConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SinkConfig::default(),
    };
    if let Some(capacity) = args.capacity {
        config.queue_capacity = capacity;
    }

    // Open the input first so a bad path leaves an existing output untouched.
    let input = open_input(&args.input).await?;

    let output = match args.format {
        TextFormat::Jsonl => TextOutput::<JsonRecord, _>::from_filename(
            &args.output,
            format::json_lines,
            format::no_trailer,
            &config,
        ),
        TextFormat::Yaml => TextOutput::<JsonRecord, _>::from_filename(
            &args.output,
            format::yaml_documents,
            format::yaml_end,
            &config,
        ),
    }
    .with_context(|| format!("cannot set up output '{}'", args.output))?;

    let output = if args.exit_on_fatal {
        output.on_fatal(ExitOnFatal)
    } else {
        output.on_fatal(LogFatal)
    };
    let output = Arc::new(output);
    let worker = output.spawn_output_loop();

    let mut reader = FrameReader::with_max_len(input, config.max_frame_len);
    let read_result = loop {
        if output.is_halted() {
            break Ok(());
        }
        match reader.next_frame().await {
            Ok(Some(frame)) => output.submit(frame).await,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    let closed = output.close().await;
    let run = worker.await.context("output loop panicked")?;

    read_result.with_context(|| {
        format!(
            "reading frame {} from '{}'",
            reader.frames_read(),
            args.input
        )
    })?;
    run.context("rendering failed")?;
    closed.context("closing output failed")?;

    let m = output.metrics();
    info!(
        frames = m.frames_written,
        bytes = m.bytes_written,
        "render complete"
    );
    Ok(())
}

/// Open a framed or NDJSON input; `""` and `"-"` mean stdin.
pub(crate) async fn open_input(name: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
    match name {
        "" | "-" => Ok(Box::new(tokio::io::stdin())),
        path => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("cannot open input {path}"))?;
            Ok(Box::new(file))
        }
    }
}
