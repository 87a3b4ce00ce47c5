use super::{confirm, core_err, print_record, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use logstack_core::{Orchestrator, ProvisionOutcome};
use logstack_schema::ResourceStatus;

pub fn run(orch: &Orchestrator, id: &str, wait: bool, yes: bool, json: bool) -> Result<u8, String> {
    let record = orch.inspect(id).map_err(core_err)?;
    confirm(
        &format!("Provision {} '{id}' on its target hosts?", record.kind()),
        yes,
    )?;

    let pb = if json {
        None
    } else {
        Some(spinner(&format!("provisioning {id}...")))
    };
    let outcome = match orch.provision(id) {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("provisioning {id} failed"));
            }
            return Err(core_err(e));
        }
    };

    let record = match outcome {
        ProvisionOutcome::Active => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("{id} is active"));
            }
            orch.inspect(id).map_err(core_err)?
        }
        ProvisionOutcome::Dispatched(job) if wait => {
            if let Some(ref pb) = pb {
                pb.set_message(format!("waiting for stage '{}' ({})...", job.stage, job.job_id));
            }
            let record = orch.wait(id).map_err(|e| {
                if let Some(ref pb) = pb {
                    spin_fail(pb, &format!("waiting for {id} failed"));
                }
                core_err(e)
            })?;
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("{id} is {}", record.status));
            }
            record
        }
        ProvisionOutcome::Dispatched(job) => {
            if let Some(ref pb) = pb {
                spin_ok(
                    pb,
                    &format!("stage '{}' dispatched as job {}", job.stage, job.job_id),
                );
            }
            orch.inspect(id).map_err(core_err)?
        }
    };

    print_record(&record, json)?;
    match &record.last_failure {
        Some(failure) if record.status == ResourceStatus::Failed => Err(format!(
            "{id} failed at stage '{}': {}",
            failure.stage, failure.message
        )),
        _ => Ok(EXIT_SUCCESS),
    }
}
