use super::{print_record, with_spinner, EXIT_FAILURE, EXIT_SUCCESS};
use logstack_core::Orchestrator;
use logstack_schema::ResourceStatus;

pub fn run(orch: &Orchestrator, id: &str, json: bool) -> Result<u8, String> {
    let record = with_spinner(
        json,
        &format!("waiting for {id}..."),
        &format!("{id} settled"),
        &format!("waiting for {id} failed"),
        || orch.wait(id),
    )?;
    print_record(&record, json)?;
    Ok(if record.status == ResourceStatus::Failed {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    })
}
