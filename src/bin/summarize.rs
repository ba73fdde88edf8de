//! Summarize an email body read from stdin.
//!
//! ```text
//! GEMINI_API_KEY=... summarize < message.txt
//! ```

use std::io::Read;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use inbox_todo::config::{SummarizeCommand, SummarizerConfig};
use inbox_todo::llm::{ModelFamily, SummaryRequest, create_summarizer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = SummarizerConfig::from_env()?;
    let command = SummarizeCommand::from_env()?;

    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("failed to read email body from stdin")?;
    if text.trim().is_empty() {
        anyhow::bail!("no input on stdin");
    }

    let summarizer = create_summarizer(&config)?;

    let mut request = SummaryRequest::new(ModelFamily::Gemini, command.prompt, text);
    if let Some(model) = command.model {
        request = request.with_model(model);
    }
    if let Some(max) = command.max_input_tokens {
        request = request.with_max_input_tokens(max);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling request");
            on_signal.cancel();
        }
    });

    let summary = summarizer.summarize(&request, &cancel).await?;

    println!("{}", summary.summary.trim());
    eprintln!("\n   Model: {}", summary.model);
    eprintln!(
        "   Tokens used in window: {}",
        summarizer.tracker().current_usage()
    );
    Ok(())
}
