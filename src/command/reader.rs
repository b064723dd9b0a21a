use super::{DataEncryption, NO_ENCRYPTION, StateReader, encryption_for};
use crate::core::{Result, StoreError};
use crate::object::{
    AdapterManager, AssociationKind, FieldValue, ObjectAdapter, Oid, Pojo, REFERENCE_DELIMITER,
    SpecificationRegistry, Version, VersionScheme,
};

/// Rebuilds adapters from stored state; the inverse of `ObjectWriter`.
///
/// Records written without a header (unversioned stores) are decrypted
/// with the reader's default encryption type.
pub struct ObjectReader<'a> {
    specs: &'a SpecificationRegistry,
    scheme: VersionScheme,
    default_encryption: &'a str,
    encryption_key: Option<&'a str>,
}

impl<'a> ObjectReader<'a> {
    pub fn new(specs: &'a SpecificationRegistry, scheme: VersionScheme) -> Self {
        Self {
            specs,
            scheme,
            default_encryption: NO_ENCRYPTION,
            encryption_key: None,
        }
    }

    pub fn with_encryption(mut self, type_name: &'a str, key: Option<&'a str>) -> Self {
        self.default_encryption = type_name;
        self.encryption_key = key;
        self
    }

    /// Loads a root record and its aggregates into `adapters`. An identity
    /// already present in the arena is returned as is.
    ///
    /// Returns the root identity followed by every newly loaded identity.
    pub fn read_object<R: StateReader>(
        &self,
        reader: &R,
        adapters: &mut AdapterManager,
    ) -> Result<Vec<Oid>> {
        let oid = read_identity(reader)?;
        if adapters.contains(&oid) {
            return Ok(vec![oid]);
        }

        let mut loaded = vec![oid.clone()];
        let encryption_type = reader
            .read_encryption_type()
            .unwrap_or(self.default_encryption);
        let cipher = encryption_for(encryption_type, self.encryption_key)?;
        self.read_into(reader, oid.clone(), cipher.as_ref(), adapters, &mut loaded)?;

        if let Some(sequence) = reader.read_version() {
            let version = Version::from_parts(
                self.scheme,
                sequence,
                reader.read_user().unwrap_or_default(),
                reader.read_time().unwrap_or("0"),
            )?;
            adapters.require_mut(&oid)?.set_version(version);
        }
        Ok(loaded)
    }

    fn read_into<R: StateReader>(
        &self,
        reader: &R,
        oid: Oid,
        cipher: &dyn DataEncryption,
        adapters: &mut AdapterManager,
        loaded: &mut Vec<Oid>,
    ) -> Result<()> {
        let spec_name = reader.read_type().unwrap_or(oid.spec_name());
        let spec = self.specs.get(spec_name)?;
        let mut pojo = Pojo::for_specification(&spec);

        for association in spec.associations() {
            if association.is_not_persisted() {
                continue;
            }
            let id = association.id.as_str();
            let value = match &association.kind {
                AssociationKind::Value(codec) => match reader.read_field(id) {
                    Some(stored) => FieldValue::Value(codec.decode(&cipher.decrypt(stored)?)?),
                    None => FieldValue::null(),
                },
                AssociationKind::Reference {
                    aggregated: true, ..
                } => match reader.read_aggregate(id) {
                    Some(child) => {
                        let child_oid = read_identity(child)?;
                        self.read_into(child, child_oid.clone(), cipher, adapters, loaded)?;
                        loaded.push(child_oid.clone());
                        FieldValue::Reference(Some(child_oid))
                    }
                    None => FieldValue::Reference(None),
                },
                AssociationKind::Reference {
                    aggregated: false, ..
                } => match reader.read_field(id) {
                    Some(stored) => FieldValue::Reference(Some(Oid::parse(stored)?)),
                    None => FieldValue::Reference(None),
                },
                AssociationKind::Collection {
                    element_aggregated: true,
                    ..
                } => {
                    let mut elements = Vec::new();
                    for element in reader.read_collection(id) {
                        let element_oid = read_identity(element)?;
                        self.read_into(element, element_oid.clone(), cipher, adapters, loaded)?;
                        loaded.push(element_oid.clone());
                        elements.push(element_oid);
                    }
                    FieldValue::Collection(elements)
                }
                AssociationKind::Collection {
                    element_aggregated: false,
                    ..
                } => {
                    let elements = reader
                        .read_field(id)
                        .unwrap_or_default()
                        .split(REFERENCE_DELIMITER)
                        .filter(|part| !part.is_empty())
                        .map(Oid::parse)
                        .collect::<Result<Vec<_>>>()?;
                    FieldValue::Collection(elements)
                }
            };
            pojo.set(id, value);
        }

        adapters.insert(ObjectAdapter::new(oid, spec, pojo))?;
        Ok(())
    }
}

fn read_identity<R: StateReader>(reader: &R) -> Result<Oid> {
    let encoded = reader
        .read_oid()
        .ok_or_else(|| StoreError::Storage("Stored record has no identity".into()))?;
    Oid::parse(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{NoEncryption, ObjectData, ObjectWriter, StateWriter};
    use crate::core::{Value, ValueType};
    use crate::object::ObjectSpecification;

    fn registry() -> SpecificationRegistry {
        let specs = SpecificationRegistry::new();
        specs
            .register(
                ObjectSpecification::builder("Customer")
                    .property("name", ValueType::Text)
                    .aggregate("address", "Address")
                    .build(),
            )
            .unwrap();
        specs
            .register(
                ObjectSpecification::builder("Address")
                    .aggregated()
                    .property("y", ValueType::Integer)
                    .build(),
            )
            .unwrap();
        specs
    }

    #[test]
    fn test_round_trip_with_nested_aggregate() {
        let specs = registry();
        let root = Oid::persistent("Customer", 1);
        let child = Oid::aggregated("Address", root.clone(), "address");

        let mut written = AdapterManager::new();
        let mut pojo = Pojo::for_specification(&specs.get("Customer").unwrap());
        pojo.set("name", Value::from("X"));
        pojo.set("address", child.clone());
        written
            .insert(ObjectAdapter::new(root.clone(), specs.get("Customer").unwrap(), pojo))
            .unwrap();
        let mut address = Pojo::for_specification(&specs.get("Address").unwrap());
        address.set("y", Value::Integer(1));
        written
            .insert(ObjectAdapter::new(child.clone(), specs.get("Address").unwrap(), address))
            .unwrap();

        let mut data = ObjectData::new();
        ObjectWriter::new(&written, &NoEncryption)
            .write_object(&mut data, &root)
            .unwrap();
        data.write_version(None, "1");
        data.write_user("alice");
        data.write_time("1700000000000");

        let mut read = AdapterManager::new();
        let loaded = ObjectReader::new(&specs, VersionScheme::Serial)
            .read_object(&data, &mut read)
            .unwrap();
        assert_eq!(loaded, vec![root.clone(), child.clone()]);

        let customer = read.require(&root).unwrap();
        assert_eq!(customer.pojo().value("name"), Some(&Value::from("X")));
        assert_eq!(customer.pojo().reference("address"), Some(&child));
        assert_eq!(customer.version().unwrap().sequence_string(), "1");
        assert_eq!(
            read.require(&child).unwrap().pojo().value("y"),
            Some(&Value::Integer(1))
        );
        assert!(read.require(&child).unwrap().version().is_none());
    }

    #[test]
    fn test_existing_identity_not_reloaded() {
        let specs = registry();
        let root = Oid::persistent("Customer", 1);
        let mut adapters = AdapterManager::new();
        adapters
            .insert(ObjectAdapter::new(
                root.clone(),
                specs.get("Customer").unwrap(),
                Pojo::new(),
            ))
            .unwrap();

        let mut data = ObjectData::new();
        data.write_oid("Customer:1");
        data.write_type("Customer");
        data.write_field("name", Some("Changed"));

        let loaded = ObjectReader::new(&specs, VersionScheme::Serial)
            .read_object(&data, &mut adapters)
            .unwrap();
        assert_eq!(loaded, vec![root.clone()]);
        assert_eq!(adapters.require(&root).unwrap().pojo().value("name"), None);
    }

    #[test]
    fn test_unknown_type_is_domain_error() {
        let specs = registry();
        let mut data = ObjectData::new();
        data.write_oid("Invoice:3");
        let err = ObjectReader::new(&specs, VersionScheme::Serial)
            .read_object(&data, &mut AdapterManager::new())
            .unwrap_err();
        assert!(err.is_domain_model_error());
    }
}
