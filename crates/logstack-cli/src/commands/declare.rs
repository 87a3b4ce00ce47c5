use super::{colorize_status, core_err, json_pretty, summary, EXIT_SUCCESS};
use logstack_core::Orchestrator;
use logstack_schema::parse_declarations_file;
use std::path::Path;

pub fn run(orch: &Orchestrator, file: &Path, json: bool) -> Result<u8, String> {
    let declarations =
        parse_declarations_file(file).map_err(|e| format!("declaration error: {e}"))?;

    let mut records = Vec::with_capacity(declarations.len());
    for declaration in declarations {
        records.push(orch.declare(declaration).map_err(core_err)?);
    }

    if json {
        let out: Vec<_> = records.iter().map(summary).collect();
        println!("{}", json_pretty(&out)?);
    } else {
        for record in &records {
            println!(
                "declared {} {} ({})",
                record.kind(),
                record.id,
                colorize_status(&record.status.to_string())
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
