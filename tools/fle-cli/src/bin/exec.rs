use anyhow::{bail, Result};
use clap::Parser;
use fle::loader::Loader;
use std::path::PathBuf;

/// Load an FLE executable and jump to its entry point.
#[derive(Parser)]
#[command(name = "exec")]
struct Args {
    /// Executable file
    input: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let exe = fle::reader::from_path(&args.input)?;

    // Needed shared objects are looked up next to the executable.
    let dir = args.input.parent().map(PathBuf::from).unwrap_or_default();
    let mut libs = Vec::new();
    for name in &exe.needed {
        let path = dir.join(name);
        if !path.exists() {
            bail!("needed library not found: {name}");
        }
        libs.push(fle::reader::from_path(&path)?);
    }

    let mut loader: Loader = Loader::new();
    let image = loader.load(&exe, &libs)?;
    unsafe { image.run() }
}
