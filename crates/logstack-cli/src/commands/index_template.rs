use super::EXIT_SUCCESS;
use logstack_schema::IndexSchema;

/// Print the canonical container log schema for `index_id`.
///
/// The text output is the bare JSON document so it can be redirected
/// straight into a declaration's schema file.
pub fn run(index_id: &str, _json: bool) -> Result<u8, String> {
    let schema =
        IndexSchema::log_template(index_id).map_err(|e| format!("declaration error: {e}"))?;
    println!("{}", schema.to_json_pretty());
    Ok(EXIT_SUCCESS)
}
