use std::error::Error;

use vhl_run::Lab;

pub fn run(lab: &Lab) -> Result<(), Box<dyn Error>> {
    for run_id in lab.list_runs()? {
        println!("{run_id}");
    }
    Ok(())
}
