use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Recursive key-value sink an object's state is written into.
///
/// Backends implement it in whatever shape suits their physical format.
pub trait StateWriter: Sized {
    fn write_oid(&mut self, oid: &str);
    fn write_type(&mut self, spec_name: &str);
    fn write_field(&mut self, name: &str, value: Option<&str>);
    /// `current` is the version the stored record is expected to carry
    /// (absent on insert), `next` the one it will carry afterwards.
    fn write_version(&mut self, current: Option<&str>, next: &str);
    fn write_user(&mut self, user: &str);
    fn write_time(&mut self, time: &str);
    fn write_encryption_type(&mut self, kind: &str);
    /// Nested block for an aggregated reference, attached under `id`.
    fn add_aggregate(&mut self, id: &str) -> &mut Self;
    /// Detached block for one aggregated collection element.
    fn create_element_writer(&self) -> Self;
    fn write_collection(&mut self, id: &str, elements: Vec<Self>);
}

/// Source counterpart of `StateWriter`.
pub trait StateReader: Sized {
    fn read_oid(&self) -> Option<&str>;
    fn read_type(&self) -> Option<&str>;
    fn read_field(&self, name: &str) -> Option<&str>;
    fn read_version(&self) -> Option<&str>;
    fn read_user(&self) -> Option<&str>;
    fn read_time(&self) -> Option<&str>;
    fn read_encryption_type(&self) -> Option<&str>;
    fn read_aggregate(&self, id: &str) -> Option<&Self>;
    fn read_collection(&self, id: &str) -> &[Self];
}

/// In-memory state record; both sink and source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectData {
    pub oid: Option<String>,
    pub spec: Option<String>,
    pub fields: BTreeMap<String, Option<String>>,
    pub version: Option<String>,
    /// Version the writer expected to replace; never stored.
    #[serde(skip)]
    pub expected_version: Option<String>,
    pub user: Option<String>,
    pub time: Option<String>,
    pub encryption_type: Option<String>,
    pub aggregates: BTreeMap<String, ObjectData>,
    pub collections: BTreeMap<String, Vec<ObjectData>>,
}

impl ObjectData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(&self) -> Option<&str> {
        self.oid.as_deref()
    }
}

impl StateWriter for ObjectData {
    fn write_oid(&mut self, oid: &str) {
        self.oid = Some(oid.to_string());
    }

    fn write_type(&mut self, spec_name: &str) {
        self.spec = Some(spec_name.to_string());
    }

    fn write_field(&mut self, name: &str, value: Option<&str>) {
        self.fields
            .insert(name.to_string(), value.map(str::to_string));
    }

    fn write_version(&mut self, current: Option<&str>, next: &str) {
        self.expected_version = current.map(str::to_string);
        self.version = Some(next.to_string());
    }

    fn write_user(&mut self, user: &str) {
        self.user = Some(user.to_string());
    }

    fn write_time(&mut self, time: &str) {
        self.time = Some(time.to_string());
    }

    fn write_encryption_type(&mut self, kind: &str) {
        self.encryption_type = Some(kind.to_string());
    }

    fn add_aggregate(&mut self, id: &str) -> &mut Self {
        self.aggregates.entry(id.to_string()).or_default()
    }

    fn create_element_writer(&self) -> Self {
        ObjectData::new()
    }

    fn write_collection(&mut self, id: &str, elements: Vec<Self>) {
        self.collections.insert(id.to_string(), elements);
    }
}

impl StateReader for ObjectData {
    fn read_oid(&self) -> Option<&str> {
        self.oid.as_deref()
    }

    fn read_type(&self) -> Option<&str> {
        self.spec.as_deref()
    }

    fn read_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|value| value.as_deref())
    }

    fn read_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn read_user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    fn read_time(&self) -> Option<&str> {
        self.time.as_deref()
    }

    fn read_encryption_type(&self) -> Option<&str> {
        self.encryption_type.as_deref()
    }

    fn read_aggregate(&self, id: &str) -> Option<&Self> {
        self.aggregates.get(id)
    }

    fn read_collection(&self, id: &str) -> &[Self] {
        self.collections
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_writers() {
        let mut data = ObjectData::new();
        data.write_oid("Customer:1");
        data.write_field("name", Some("Alice"));
        data.write_field("nickname", None);
        data.add_aggregate("address").write_field("city", Some("Oslo"));

        let mut element = data.create_element_writer();
        element.write_field("sku", Some("A-1"));
        data.write_collection("lines", vec![element]);

        assert_eq!(data.read_field("name"), Some("Alice"));
        assert_eq!(data.read_field("nickname"), None);
        assert_eq!(
            data.read_aggregate("address").unwrap().read_field("city"),
            Some("Oslo")
        );
        assert_eq!(data.read_collection("lines")[0].read_field("sku"), Some("A-1"));
        assert!(data.read_collection("missing").is_empty());
    }

    #[test]
    fn test_expected_version_not_serialized() {
        let mut data = ObjectData::new();
        data.write_version(Some("3"), "4");
        let json = serde_json::to_string(&data).unwrap();
        let restored: ObjectData = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.version.as_deref(), Some("4"));
        assert_eq!(restored.expected_version, None);
    }
}
