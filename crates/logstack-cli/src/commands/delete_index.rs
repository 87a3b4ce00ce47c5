use super::{confirm, print_record, with_spinner, EXIT_SUCCESS};
use logstack_core::Orchestrator;

pub fn run(orch: &Orchestrator, id: &str, yes: bool, json: bool) -> Result<u8, String> {
    confirm(
        &format!("Delete index '{id}' and all of its documents from the search server?"),
        yes,
    )?;
    let record = with_spinner(
        json,
        &format!("deleting index {id}..."),
        &format!("index {id} deleted"),
        &format!("deleting index {id} failed"),
        || orch.delete_index(id),
    )?;
    print_record(&record, json)?;
    Ok(EXIT_SUCCESS)
}
