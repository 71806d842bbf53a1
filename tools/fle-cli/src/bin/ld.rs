use anyhow::Result;
use clap::Parser;
use fle::linker::{link, LinkOptions};
use std::path::PathBuf;

/// Link FLE relocatable objects, archives, and shared objects.
#[derive(Parser)]
#[command(name = "ld")]
struct Args {
    /// Output file
    #[arg(short, long, default_value = "a.out")]
    output: PathBuf,
    /// Entry symbol
    #[arg(short, long, default_value = "_start")]
    entry: String,
    /// Produce a shared object instead of an executable
    #[arg(short, long)]
    shared: bool,
    /// Input files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut objects = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        objects.push(fle::reader::from_path(path)?);
    }

    let options = LinkOptions {
        output: args
            .output
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "a.out".to_string()),
        entry: args.entry,
        shared: args.shared,
    };
    let out = link(&objects, &options)?;
    fle::writer::to_path(&out, &args.output)?;
    Ok(())
}
