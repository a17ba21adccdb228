//! Shared CLI utilities for the gpt2-bpe binaries.

use std::io::Read;
use std::path::Path;

/// Initialize tracing/logging to stderr.
///
/// If `disable` is true, no output is produced.
/// Otherwise respects `RUST_LOG` env var, defaulting to WARN.
pub fn init_logging(disable: bool) {
    use tracing_subscriber::EnvFilter;

    if disable {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Collect the batch rows from prompts, a file, or stdin.
///
/// Prompts become one row each. File and stdin input are split into one row
/// per line, with `\r\n` endings stripped.
pub fn read_rows(
    prompts: &[String],
    file: Option<&Path>,
    use_stdin: bool,
) -> Result<Vec<String>, String> {
    if !prompts.is_empty() {
        return Ok(prompts.to_vec());
    }

    if let Some(path) = file {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read file '{}': {}", path.display(), e))?;
        return Ok(split_rows(&text));
    }

    if use_stdin {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("Failed to read stdin: {}", e))?;
        return Ok(split_rows(&buf));
    }

    Err("No input provided. Use --prompt, --file, or --stdin".to_string())
}

fn split_rows(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}
