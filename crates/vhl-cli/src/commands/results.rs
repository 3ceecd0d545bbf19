use std::error::Error;

use clap::Args;
use vhl_run::Lab;

use super::print_json;

#[derive(Args, Debug)]
pub struct ResultsArgs {
    pub run_id: String,
}

pub fn run(lab: &Lab, args: &ResultsArgs) -> Result<(), Box<dyn Error>> {
    match lab.read_results(&args.run_id)? {
        Some(manifest) => print_json(&manifest),
        None => Err(format!("no run `{}`", args.run_id).into()),
    }
}
