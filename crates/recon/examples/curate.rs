//! Example: Curate an NER dataset saved as JSONL.
//!
//! Usage:
//!   cargo run --example curate -- <data.jsonl> <output_dir>
//!
//! Set `RUST_LOG=recon=debug` to see every recorded step.

use std::env;
use std::path::Path;

use serde_json::json;
use tracing_subscriber::EnvFilter;

use recon::{CallArgs, Dataset, io};

fn main() -> recon::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("recon=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: cargo run --example curate -- <data.jsonl> <output_dir>");
        std::process::exit(1);
    }

    let input = Path::new(&args[1]);
    let name = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("train")
        .to_string();

    let mut dataset = Dataset::new(name, io::read_examples(input)?);
    println!("{}", dataset.summary());

    dataset.pipe_in_place([
        ("recon.v1.strip_annotations", CallArgs::new()),
        ("recon.v1.upcase_labels", CallArgs::new()),
        ("recon.v1.filter_overlaps", CallArgs::new()),
        (
            "recon.v1.fix_annotations",
            CallArgs::new().kwarg(
                "corrections",
                json!([{"annotation": "n/a", "to_label": null}]),
            ),
        ),
    ])?;

    let separator = "=".repeat(80);
    println!("{}", separator);
    for record in dataset.operations() {
        println!(
            "  {:<32} {:<10} +{} -{} ~{}",
            record.name,
            record.status.label(),
            record.examples_added,
            record.examples_removed,
            record.examples_changed
        );
    }
    println!("{}", separator);
    println!("{}", dataset.summary());

    dataset.to_disk(&args[2], true)?;
    dataset.export_history_csv(Path::new(&args[2]).join("history.csv"))?;
    println!("Saved to {}", args[2]);

    Ok(())
}
