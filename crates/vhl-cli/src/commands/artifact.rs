use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use vhl_run::Lab;

#[derive(Args, Debug)]
pub struct ArtifactArgs {
    pub run_id: String,
    /// File name inside the run directory, e.g. `merged.cir`.
    pub file: String,
    /// Write to this path instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run(lab: &Lab, args: &ArtifactArgs) -> Result<(), Box<dyn Error>> {
    let bytes = lab
        .artifact(&args.run_id, &args.file)?
        .ok_or_else(|| format!("run `{}` has no artifact `{}`", args.run_id, args.file))?;
    match &args.out {
        Some(path) => fs::write(path, &bytes)?,
        None => std::io::stdout().write_all(&bytes)?,
    }
    Ok(())
}
