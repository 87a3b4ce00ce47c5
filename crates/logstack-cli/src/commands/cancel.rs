use super::{core_err, print_record, EXIT_SUCCESS};
use logstack_core::Orchestrator;

pub fn run(orch: &Orchestrator, id: &str, json: bool) -> Result<u8, String> {
    let record = orch.cancel(id).map_err(core_err)?;
    print_record(&record, json)?;
    Ok(EXIT_SUCCESS)
}
