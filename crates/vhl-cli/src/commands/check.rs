use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Args;
use vhl_run::Lab;
use vhl_template::TemplateKind;

#[derive(Args, Debug)]
pub struct CheckArgs {
    pub kind: TemplateKind,
    /// Template file to validate.
    pub file: PathBuf,
}

pub async fn run(lab: &Lab, args: &CheckArgs) -> Result<(), Box<dyn Error>> {
    let content = fs::read_to_string(&args.file)?;
    match lab.check_template(args.kind, &content).await? {
        None => {
            println!("{}: ok", args.file.display());
            Ok(())
        }
        Some(message) => {
            eprintln!("{message}");
            Err(format!("{} failed validation", args.file.display()).into())
        }
    }
}
