use super::{core_err, print_record, EXIT_FAILURE, EXIT_SUCCESS};
use logstack_core::Orchestrator;
use logstack_schema::ResourceStatus;

pub fn run(orch: &Orchestrator, id: &str, json: bool) -> Result<u8, String> {
    let record = orch.reconcile(id).map_err(core_err)?;
    print_record(&record, json)?;
    Ok(if record.status == ResourceStatus::Failed {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    })
}
