use super::{colorize_status, core_err, json_pretty, EXIT_SUCCESS};
use logstack_core::Orchestrator;

pub fn run(orch: &Orchestrator, id: &str, json: bool) -> Result<u8, String> {
    let record = orch.inspect(id).map_err(core_err)?;
    if json {
        println!("{}", json_pretty(&record)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("id:          {}", record.id);
    println!("kind:        {}", record.kind());
    println!("status:      {}", colorize_status(&record.status.to_string()));
    let refs = record.spec.references();
    if !refs.is_empty() {
        let refs: Vec<&str> = refs.iter().map(|r| r.as_str()).collect();
        println!("depends_on:  {}", refs.join(", "));
    }
    if record.kind() == logstack_schema::ResourceKind::SearchIndex {
        println!("created:     {}", record.created);
    }
    if record.completed_stages.is_empty() {
        println!("stages:      (none)");
    } else {
        println!("stages:      {}", record.completed_stages.join(", "));
    }
    if let Some(job) = &record.pending_job {
        println!("pending_job: {} ({}, {})", job.job_id, job.stage, job.status_url);
    }
    if let Some(failure) = &record.last_failure {
        println!("failure:     [{}] {} at {}", failure.stage, failure.message, failure.at);
    }
    println!("created_at:  {}", record.created_at);
    println!("updated_at:  {}", record.updated_at);
    Ok(EXIT_SUCCESS)
}
