use super::{core_err, print_record, with_spinner, EXIT_SUCCESS};
use logstack_core::Orchestrator;

pub fn run(orch: &Orchestrator, id: &str, json: bool) -> Result<u8, String> {
    with_spinner(
        json,
        &format!("creating index {id}..."),
        &format!("index {id} created"),
        &format!("creating index {id} failed"),
        || orch.create_index(id),
    )?;
    let record = orch.inspect(id).map_err(core_err)?;
    print_record(&record, json)?;
    Ok(EXIT_SUCCESS)
}
