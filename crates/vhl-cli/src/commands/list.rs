use std::error::Error;

use clap::Args;
use vhl_run::Lab;
use vhl_template::TemplateKind;

use super::print_json;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// `model` or `control`.
    pub kind: TemplateKind,
}

pub fn run(lab: &Lab, args: &ListArgs) -> Result<(), Box<dyn Error>> {
    print_json(&lab.list_templates(args.kind))
}
