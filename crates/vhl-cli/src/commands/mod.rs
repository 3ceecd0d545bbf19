use std::error::Error;

use serde::Serialize;
use vhl_core::serde::to_pretty_json_string;

pub mod artifact;
pub mod check;
pub mod list;
pub mod results;
pub mod run;
pub mod runs;
pub mod show;
pub mod upload;
pub mod version;

pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", to_pretty_json_string(value)?);
    Ok(())
}
