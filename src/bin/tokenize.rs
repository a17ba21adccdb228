//! gpt2-tokenize: Encode text rows into padded GPT-2 token id batches.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use gpt2_bpe::{cli, BatchEncoder, BatchEncoding, TokenizerConfig};

#[derive(Parser)]
#[command(
    name = "gpt2-tokenize",
    about = "Encode text with a GPT-2 vocab.json and merges.txt"
)]
struct Args {
    /// Path to vocab.json
    #[arg(long)]
    vocab: PathBuf,

    /// Path to merges.txt
    #[arg(long)]
    merges: PathBuf,

    /// Row length: -1 pads to the longest row, N > 0 truncates or pads to N
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    padding_length: i64,

    /// Text to tokenize; repeat for more rows
    #[arg(short = 'p', long, conflicts_with_all = ["file", "stdin"])]
    prompt: Vec<String>,

    /// Read rows from file, one per line
    #[arg(short = 'f', long, conflicts_with = "stdin")]
    file: Option<PathBuf>,

    /// Read rows from stdin, one per line
    #[arg(long)]
    stdin: bool,

    /// Output format: text or json
    #[arg(long, default_value = "text", value_parser = validate_output_format)]
    output_format: String,

    /// Suppress all logging
    #[arg(long)]
    log_disable: bool,
}

fn validate_output_format(s: &str) -> Result<String, String> {
    match s {
        "text" | "json" => Ok(s.to_string()),
        _ => Err(format!("Unknown output format '{}'. Options: text, json", s)),
    }
}

fn main() {
    let args = Args::parse();
    cli::init_logging(args.log_disable);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let rows = cli::read_rows(&args.prompt, args.file.as_deref(), args.stdin)?;

    let config = TokenizerConfig::from_files(&args.vocab, &args.merges, args.padding_length)?;
    let encoder = BatchEncoder::new(&config)?;
    let encoding = encoder.encode(&rows);

    match args.output_format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&encoding)?),
        _ => print_text(&rows, &encoding),
    }

    Ok(())
}

fn print_text(rows: &[String], encoding: &BatchEncoding) {
    println!("shape: {:?}", encoding.shape);
    for (i, text) in rows.iter().enumerate() {
        let Some((ids, mask)) = encoding.row(i) else {
            break;
        };
        println!("[{}] {:?}", i, text);
        println!("  input_ids:      {:?}", ids);
        println!("  attention_mask: {:?}", mask);
    }
}
