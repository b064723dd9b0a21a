use super::{PrePostValue, PropertyValue};
use crate::object::{Bookmark, Oid};
use std::hash::{Hash, Hasher};

/// Before/after values of one property of one entity within a unit of work.
///
/// Identity is the (bookmark, property) pair held as plain strings, so
/// records stay comparable after the adapter they came from is gone.
#[derive(Debug, Clone)]
pub struct PropertyChangeRecord {
    oid: Oid,
    bookmark: Bookmark,
    property_id: String,
    member_id: String,
    bookmark_string: String,
    value: PrePostValue,
}

impl PropertyChangeRecord {
    pub fn new(oid: &Oid, property_id: &str, pre: PropertyValue) -> Self {
        let bookmark = Bookmark::from(oid);
        Self {
            oid: oid.clone(),
            member_id: format!("{}#{}", oid.spec_name(), property_id),
            bookmark_string: bookmark.to_string(),
            bookmark,
            property_id: property_id.to_string(),
            value: PrePostValue::pre(pre),
        }
    }

    pub fn with_post(mut self, post: PropertyValue) -> Self {
        self.value = self.value.with_post(post);
        self
    }

    /// Keeps this record's pre value but takes `later`'s post value.
    pub fn merged_with(mut self, later: &PropertyChangeRecord) -> Self {
        if let Some(post) = later.value.post_value() {
            self.value = self.value.with_post(post.clone());
        }
        self
    }

    /// Same record under a new identity, e.g. once a transient object has
    /// been stored.
    pub fn rebased(&self, oid: &Oid) -> Self {
        let mut rebased = PropertyChangeRecord::new(oid, &self.property_id, self.value.pre_value().clone());
        rebased.value = self.value.clone();
        rebased
    }

    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    pub fn bookmark(&self) -> &Bookmark {
        &self.bookmark
    }

    pub fn bookmark_string(&self) -> &str {
        &self.bookmark_string
    }

    pub fn property_id(&self) -> &str {
        &self.property_id
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn value(&self) -> &PrePostValue {
        &self.value
    }

    pub fn should_publish(&self) -> bool {
        self.value.should_publish()
    }
}

impl PartialEq for PropertyChangeRecord {
    fn eq(&self, other: &Self) -> bool {
        self.bookmark_string == other.bookmark_string && self.property_id == other.property_id
    }
}

impl Eq for PropertyChangeRecord {}

impl Hash for PropertyChangeRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bookmark_string.hash(state);
        self.property_id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::object::FieldValue;
    use std::collections::HashSet;

    fn text(s: &str) -> PropertyValue {
        PropertyValue::Present(FieldValue::Value(Value::from(s)))
    }

    #[test]
    fn test_identity_is_bookmark_and_property() {
        let oid = Oid::persistent("Customer", 1);
        let a = PropertyChangeRecord::new(&oid, "name", text("a")).with_post(text("b"));
        let b = PropertyChangeRecord::new(&oid, "name", text("x")).with_post(text("y"));
        let c = PropertyChangeRecord::new(&oid, "email", text("a"));

        let set: HashSet<_> = [a.clone(), b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(a.member_id(), "Customer#name");
        assert_eq!(a.bookmark_string(), "Customer:1");
    }

    #[test]
    fn test_merge_keeps_first_pre() {
        let oid = Oid::persistent("Customer", 1);
        let first = PropertyChangeRecord::new(&oid, "name", text("a")).with_post(text("b"));
        let later = PropertyChangeRecord::new(&oid, "name", text("b")).with_post(text("c"));

        let merged = first.merged_with(&later);
        assert_eq!(merged.value().pre_string(), Some("a"));
        assert_eq!(merged.value().post_string(), Some("c"));
    }

    #[test]
    fn test_rebased_keeps_values() {
        let record = PropertyChangeRecord::new(&Oid::transient("Customer", -1), "name", PropertyValue::New)
            .with_post(text("b"));
        let rebased = record.rebased(&Oid::persistent("Customer", 3));
        assert_eq!(rebased.bookmark_string(), "Customer:3");
        assert!(rebased.value().pre_value().is_new());
        assert_eq!(rebased.value().post_string(), Some("b"));
    }
}
