use std::error::Error;

use clap::Args;
use serde::Serialize;
use vhl_run::{Lab, UNKNOWN_VERSION};

use super::print_json;

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Emit JSON including the probed simulator version.
    #[arg(long)]
    pub long: bool,
}

#[derive(Debug, Serialize)]
struct VersionInfo {
    version: String,
    simulator: String,
    simulator_version: String,
}

pub async fn run(lab: &Lab, args: &VersionArgs) -> Result<(), Box<dyn Error>> {
    if !args.long {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let info = VersionInfo {
        version: env!("CARGO_PKG_VERSION").into(),
        simulator: lab.config().simulator.program.clone(),
        simulator_version: lab
            .simulator_version()
            .await
            .unwrap_or_else(|| UNKNOWN_VERSION.into()),
    };
    print_json(&info)
}
