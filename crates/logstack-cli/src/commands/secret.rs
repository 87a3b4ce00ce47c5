use super::{core_err, json_pretty, EXIT_SUCCESS};
use logstack_core::Orchestrator;
use logstack_schema::{Secret, SecretRef};
use std::io::Read;

/// Store the secret read from stdin under `reference`.
pub fn run_set(orch: &Orchestrator, reference: &str, json: bool) -> Result<u8, String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| format!("failed to read secret from stdin: {e}"))?;
    let value = strip_newline(&input);
    if value.is_empty() {
        return Err("refusing to store an empty secret".to_owned());
    }

    let key = SecretRef::new(reference);
    orch.put_secret(&key, &Secret::new(value))
        .map_err(core_err)?;

    if json {
        let out = serde_json::json!({
            "reference": reference,
            "vault": orch.vault().name(),
        });
        println!("{}", json_pretty(&out)?);
    } else {
        println!("stored secret '{reference}' in {} vault", orch.vault().name());
    }
    Ok(EXIT_SUCCESS)
}

fn strip_newline(input: &str) -> &str {
    input
        .strip_suffix("\r\n")
        .or_else(|| input.strip_suffix('\n'))
        .unwrap_or(input)
}

#[cfg(test)]
mod tests {
    use super::strip_newline;

    #[test]
    fn only_one_trailing_newline_is_removed() {
        assert_eq!(strip_newline("s3cret\n"), "s3cret");
        assert_eq!(strip_newline("s3cret\r\n"), "s3cret");
        assert_eq!(strip_newline("s3cret\n\n"), "s3cret\n");
        assert_eq!(strip_newline("  padded  "), "  padded  ");
    }
}
