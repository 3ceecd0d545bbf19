use std::error::Error;

use clap::Args;
use vhl_run::Lab;
use vhl_template::TemplateKind;

use super::print_json;

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub kind: TemplateKind,
    pub name: String,
    /// Print the parsed metadata block instead of the raw file.
    #[arg(long)]
    pub metadata: bool,
}

pub fn run(lab: &Lab, args: &ShowArgs) -> Result<(), Box<dyn Error>> {
    if args.metadata {
        let metadata = lab
            .template_metadata(args.kind, &args.name)
            .ok_or_else(|| not_found(args))?;
        return print_json(&metadata);
    }
    let content = lab
        .template_content(args.kind, &args.name)
        .ok_or_else(|| not_found(args))?;
    print!("{content}");
    Ok(())
}

fn not_found(args: &ShowArgs) -> Box<dyn Error> {
    format!("no {} template named `{}`", args.kind, args.name).into()
}
