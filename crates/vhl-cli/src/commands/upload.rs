use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Args;
use vhl_run::Lab;
use vhl_template::TemplateKind;

use super::print_json;

#[derive(Args, Debug)]
pub struct UploadArgs {
    pub kind: TemplateKind,
    /// Template file to upload.
    pub file: PathBuf,
    /// Stored name; defaults to the file name.
    #[arg(long)]
    pub name: Option<String>,
}

pub async fn run(lab: &Lab, args: &UploadArgs) -> Result<(), Box<dyn Error>> {
    let content = fs::read_to_string(&args.file)?;
    let name = match &args.name {
        Some(name) => name.clone(),
        None => args
            .file
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or("file name is not valid UTF-8")?
            .to_string(),
    };
    let receipt = lab.upload_template(args.kind, &name, &content).await?;
    print_json(&receipt)
}
