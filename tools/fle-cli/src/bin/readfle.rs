use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// Pretty-print an FLE object.
#[derive(Parser)]
#[command(name = "readfle")]
struct Args {
    /// Input file
    input: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let obj = fle::reader::from_path(&args.input)?;
    print!("{}", fle::readfle::render(&obj));
    Ok(())
}
