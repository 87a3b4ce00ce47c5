use super::{colorize_status, core_err, json_pretty, summary, EXIT_SUCCESS};
use logstack_core::Orchestrator;

pub fn run(orch: &Orchestrator, json: bool) -> Result<u8, String> {
    let records = orch.list().map_err(core_err)?;
    if json {
        let out: Vec<_> = records.iter().map(summary).collect();
        println!("{}", json_pretty(&out)?);
    } else if records.is_empty() {
        println!("no resources declared");
    } else {
        println!("{:<28} {:<18} {:<14} LAST_FAILURE", "ID", "KIND", "STATUS");
        for record in &records {
            let failure = record
                .last_failure
                .as_ref()
                .map(|f| format!("{}: {}", f.stage, f.message))
                .unwrap_or_default();
            println!(
                "{:<28} {:<18} {:<14} {}",
                record.id.as_str(),
                record.kind().as_str(),
                colorize_status(&record.status.to_string()),
                failure
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
