use std::collections::BTreeMap;
use std::error::Error;

use clap::Args;
use serde_json::Value;
use vhl_run::{Lab, RunRequest};

use super::print_json;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Model template name.
    #[arg(long)]
    pub model: String,
    /// Control template name.
    #[arg(long)]
    pub control: String,
    /// JSON object of model parameter overrides.
    #[arg(long, default_value = "{}")]
    pub model_params: String,
    /// JSON object of control parameter overrides.
    #[arg(long, default_value = "{}")]
    pub control_params: String,
    /// Explicit run id; derived from time and parameters when omitted.
    #[arg(long)]
    pub id: Option<String>,
}

pub async fn run(lab: &Lab, args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let request = RunRequest {
        model_name: args.model.clone(),
        model_params: parse_params("--model-params", &args.model_params)?,
        control_name: args.control.clone(),
        control_params: parse_params("--control-params", &args.control_params)?,
        run_id: args.id.clone(),
    };
    let manifest = lab.start_sim(request).await?;
    print_json(&manifest)
}

fn parse_params(flag: &str, raw: &str) -> Result<BTreeMap<String, Value>, Box<dyn Error>> {
    serde_json::from_str(raw).map_err(|err| format!("{flag} must be a JSON object: {err}").into())
}
