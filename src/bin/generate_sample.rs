use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use vpr_dashboard::data::generator::generate_mock;
use vpr_dashboard::data::loader::{write_json, write_marks_parquet};

/// Write the demo dataset as marks.parquet, scores.json and bias.json.
#[derive(Parser)]
#[command(name = "generate_sample")]
struct Args {
    /// Output directory (created if missing)
    #[arg(default_value = "data")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let store = generate_mock();
    write_marks_parquet(&args.out_dir.join("marks.parquet"), &store.marks)?;
    write_json(&args.out_dir.join("scores.json"), &store.scores)?;
    write_json(&args.out_dir.join("bias.json"), &store.bias)?;

    println!(
        "Wrote {} mark, {} score and {} bias records to {}",
        store.marks.len(),
        store.scores.len(),
        store.bias.len(),
        args.out_dir.display()
    );
    Ok(())
}
