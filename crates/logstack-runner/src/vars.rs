use logstack_schema::Secret;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Printed in place of every secret value.
pub const MASK: &str = "***";

#[derive(Clone, PartialEq, Eq)]
pub enum BundleValue {
    Text(String),
    Number(u64),
    Secret(Secret),
}

impl BundleValue {
    fn redacted(&self) -> Value {
        match self {
            BundleValue::Text(s) => Value::String(s.clone()),
            BundleValue::Number(n) => Value::from(*n),
            BundleValue::Secret(_) => Value::String(MASK.to_owned()),
        }
    }

    fn exposed(&self) -> Value {
        match self {
            BundleValue::Secret(s) => Value::String(s.expose().to_owned()),
            other => other.redacted(),
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, BundleValue::Secret(_))
    }
}

impl fmt::Debug for BundleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleValue::Text(s) => write!(f, "{s:?}"),
            BundleValue::Number(n) => write!(f, "{n}"),
            BundleValue::Secret(_) => f.write_str(MASK),
        }
    }
}

/// Flat, case-sensitive variable set handed to one playbook run.
///
/// Secrets only leave the bundle through [`to_extra_vars`](Self::to_extra_vars);
/// `Debug` and [`redacted`](Self::redacted) print [`MASK`] instead.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct VariableBundle {
    schema_version: u32,
    values: BTreeMap<String, BundleValue>,
}

impl VariableBundle {
    pub fn new(schema_version: u32) -> Self {
        Self {
            schema_version,
            values: BTreeMap::new(),
        }
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn insert_text(&mut self, key: &str, value: impl Into<String>) {
        self.values
            .insert(key.to_owned(), BundleValue::Text(value.into()));
    }

    pub fn insert_number(&mut self, key: &str, value: u64) {
        self.values.insert(key.to_owned(), BundleValue::Number(value));
    }

    pub fn insert_secret(&mut self, key: &str, value: Secret) {
        self.values.insert(key.to_owned(), BundleValue::Secret(value));
    }

    pub fn get(&self, key: &str) -> Option<&BundleValue> {
        self.values.get(key)
    }

    /// Non-secret text value of `key`.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            BundleValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn redacted(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.redacted()))
            .collect()
    }

    /// Plaintext form written to the executor's extra-vars file.
    pub fn to_extra_vars(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.exposed()))
            .collect()
    }
}

impl fmt::Debug for VariableBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableBundle")
            .field("schema_version", &self.schema_version)
            .field("values", &self.values)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VariableBundle {
        let mut b = VariableBundle::new(1);
        b.insert_text("S3_REGION", "eu-1");
        b.insert_number("quickwit_port", 7280);
        b.insert_secret("SECRET_KEY", Secret::new("hunter2"));
        b
    }

    #[test]
    fn debug_masks_secrets() {
        let printed = format!("{:?}", sample());
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("SECRET_KEY"));
        assert!(printed.contains(MASK));
        assert!(printed.contains("eu-1"));
    }

    #[test]
    fn redacted_map_masks_secrets() {
        let map = sample().redacted();
        assert_eq!(map["SECRET_KEY"], MASK);
        assert_eq!(map["quickwit_port"], 7280);
    }

    #[test]
    fn extra_vars_expose_secrets() {
        let map = sample().to_extra_vars();
        assert_eq!(map["SECRET_KEY"], "hunter2");
        assert_eq!(map["S3_REGION"], "eu-1");
    }

    #[test]
    fn text_accessor_skips_secrets() {
        let b = sample();
        assert_eq!(b.text("S3_REGION"), Some("eu-1"));
        assert_eq!(b.text("SECRET_KEY"), None);
        assert!(b.get("SECRET_KEY").unwrap().is_secret());
        assert_eq!(b.len(), 3);
        assert_eq!(
            b.keys().collect::<Vec<_>>(),
            vec!["S3_REGION", "SECRET_KEY", "quickwit_port"]
        );
    }
}
