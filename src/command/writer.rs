use super::{DataEncryption, StateWriter};
use crate::core::{Result, StoreError};
use crate::object::{
    AdapterManager, Association, AssociationKind, FieldValue, ObjectAdapter, Oid,
    REFERENCE_DELIMITER,
};

/// Serializes an object and everything it aggregates into a state writer.
pub struct ObjectWriter<'a> {
    adapters: &'a AdapterManager,
    encryption: &'a dyn DataEncryption,
}

impl<'a> ObjectWriter<'a> {
    pub fn new(adapters: &'a AdapterManager, encryption: &'a dyn DataEncryption) -> Self {
        Self {
            adapters,
            encryption,
        }
    }

    /// Writes the identity header followed by every persisted association.
    pub fn write_object<W: StateWriter>(&self, writer: &mut W, oid: &Oid) -> Result<()> {
        let adapter = self.adapters.require(oid)?;
        writer.write_oid(&oid.to_string());
        writer.write_type(adapter.specification().name());
        self.write_fields(writer, adapter)
    }

    fn write_fields<W: StateWriter>(&self, writer: &mut W, adapter: &ObjectAdapter) -> Result<()> {
        for association in adapter.specification().associations() {
            if association.is_not_persisted() {
                continue;
            }
            self.write_association(writer, adapter, association)?;
        }
        Ok(())
    }

    fn write_association<W: StateWriter>(
        &self,
        writer: &mut W,
        adapter: &ObjectAdapter,
        association: &Association,
    ) -> Result<()> {
        let id = association.id.as_str();
        match (&association.kind, association.get(adapter)) {
            (AssociationKind::Value(codec), FieldValue::Value(value)) => {
                let stored = codec.encode(value)?.map(|plain| self.encryption.encrypt(&plain));
                writer.write_field(id, stored.as_deref());
            }
            (AssociationKind::Reference { aggregated: true, .. }, FieldValue::Reference(target)) => {
                match target {
                    None => writer.write_field(id, None),
                    Some(target) => {
                        self.require_owned(adapter, association, target)?;
                        let child = writer.add_aggregate(id);
                        self.write_object(child, target)?;
                    }
                }
            }
            (AssociationKind::Reference { aggregated: false, .. }, FieldValue::Reference(target)) => {
                match target {
                    None => writer.write_field(id, None),
                    Some(target) => {
                        self.require_standalone(adapter, association, target)?;
                        writer.write_field(id, Some(&target.to_string()));
                    }
                }
            }
            (
                AssociationKind::Collection {
                    element_aggregated: true,
                    ..
                },
                FieldValue::Collection(elements),
            ) => {
                let mut element_writers = Vec::with_capacity(elements.len());
                for element in elements {
                    self.require_owned(adapter, association, element)?;
                    let mut element_writer = writer.create_element_writer();
                    self.write_object(&mut element_writer, element)?;
                    element_writers.push(element_writer);
                }
                writer.write_collection(id, element_writers);
            }
            (
                AssociationKind::Collection {
                    element_aggregated: false,
                    ..
                },
                FieldValue::Collection(elements),
            ) => {
                let mut encoded = Vec::with_capacity(elements.len());
                for element in elements {
                    if self.is_parented(element) {
                        return Err(StoreError::DomainModel(format!(
                            "Collection {}#{} of plain references contains aggregated object {}",
                            adapter.specification().name(),
                            id,
                            element
                        )));
                    }
                    self.require_standalone(adapter, association, element)?;
                    encoded.push(element.to_string());
                }
                let joined = encoded.join(&REFERENCE_DELIMITER.to_string());
                writer.write_field(id, Some(&joined));
            }
            (kind, value) => {
                return Err(StoreError::DomainModel(format!(
                    "{}#{} is declared as {:?} but holds {}",
                    adapter.specification().name(),
                    id,
                    kind,
                    value
                )));
            }
        }
        Ok(())
    }

    fn is_parented(&self, oid: &Oid) -> bool {
        oid.is_aggregated()
            || self
                .adapters
                .get(oid)
                .is_some_and(|adapter| adapter.specification().is_parented())
    }

    /// Aggregate associations must point at an aggregated identity owned by
    /// the writing object.
    fn require_owned(
        &self,
        owner: &ObjectAdapter,
        association: &Association,
        target: &Oid,
    ) -> Result<()> {
        if !target.is_aggregated() {
            return Err(StoreError::DomainModel(format!(
                "Aggregate association {}#{} refers to non-aggregated object {}",
                owner.specification().name(),
                association.id,
                target
            )));
        }
        if target.parent() != Some(owner.oid()) {
            return Err(StoreError::DomainModel(format!(
                "Aggregated object {} is not owned by {}",
                target,
                owner.oid()
            )));
        }
        Ok(())
    }

    fn require_standalone(
        &self,
        owner: &ObjectAdapter,
        association: &Association,
        target: &Oid,
    ) -> Result<()> {
        if target.is_aggregated() {
            return Err(StoreError::DomainModel(format!(
                "Reference {}#{} points at aggregated object {}",
                owner.specification().name(),
                association.id,
                target
            )));
        }
        if target.is_transient() {
            return Err(StoreError::InternalConsistency(format!(
                "Reference {}#{} points at transient object {} that was never persisted",
                owner.specification().name(),
                association.id,
                target
            )));
        }
        Ok(())
    }
}
