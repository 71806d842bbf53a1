use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// List symbols of an FLE object.
#[derive(Parser)]
#[command(name = "nm")]
struct Args {
    /// Input file
    input: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let obj = fle::reader::from_path(&args.input)?;
    print!("{}", fle::nm::render(&obj));
    Ok(())
}
