use crate::CoreError;
use logstack_schema::{ResourceKind, ResourceStatus};

/// Whether `from -> to` is a permitted edge for a resource of `kind`.
pub fn is_allowed(kind: ResourceKind, from: ResourceStatus, to: ResourceStatus) -> bool {
    use ResourceStatus::{Active, Declared, Deleted, Failed, Provisioning, Retiring};

    let common = matches!(
        (from, to),
        (Declared | Failed, Provisioning) | (Provisioning, Active | Failed)
    );
    let teardown = kind.supports_teardown()
        && matches!(
            (from, to),
            (Active, Retiring) | (Retiring, Deleted) | (Deleted, Provisioning)
        );
    common || teardown
}

pub fn validate_transition(
    resource: &str,
    kind: ResourceKind,
    from: ResourceStatus,
    to: ResourceStatus,
) -> Result<(), CoreError> {
    if is_allowed(kind, from, to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            resource: resource.to_owned(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
