use crate::object::FieldValue;
use serde::{Deserialize, Serialize};

pub const NEW_MARKER: &str = "[NEW]";
pub const DELETED_MARKER: &str = "[DELETED]";

/// One side of a before/after pair.
///
/// `New` means the object did not exist before the unit of work, `Deleted`
/// that it no longer exists after it. Both differ from a plain null.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyValue {
    New,
    Deleted,
    Present(FieldValue),
}

impl PropertyValue {
    pub fn is_new(&self) -> bool {
        matches!(self, PropertyValue::New)
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, PropertyValue::Deleted)
    }

    pub fn render(&self) -> Option<String> {
        match self {
            PropertyValue::New => Some(NEW_MARKER.to_string()),
            PropertyValue::Deleted => Some(DELETED_MARKER.to_string()),
            PropertyValue::Present(value) => value.render(),
        }
    }
}

impl From<FieldValue> for PropertyValue {
    fn from(value: FieldValue) -> Self {
        PropertyValue::Present(value)
    }
}

/// Immutable before/after pair of one property.
///
/// The renderings are taken when the pair is built: by the time a publisher
/// consumes it the referenced objects may already be gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrePostValue {
    pre: PropertyValue,
    post: Option<PropertyValue>,
    pre_string: Option<String>,
    post_string: Option<String>,
}

impl PrePostValue {
    /// Pair whose post value has not been captured yet.
    pub fn pre(pre: PropertyValue) -> Self {
        let pre_string = pre.render();
        Self {
            pre,
            post: None,
            pre_string,
            post_string: None,
        }
    }

    pub fn new(pre: PropertyValue, post: PropertyValue) -> Self {
        Self::pre(pre).with_post(post)
    }

    pub fn with_post(&self, post: PropertyValue) -> Self {
        Self {
            pre: self.pre.clone(),
            pre_string: self.pre_string.clone(),
            post_string: post.render(),
            post: Some(post),
        }
    }

    pub fn pre_value(&self) -> &PropertyValue {
        &self.pre
    }

    pub fn post_value(&self) -> Option<&PropertyValue> {
        self.post.as_ref()
    }

    pub fn pre_string(&self) -> Option<&str> {
        self.pre_string.as_deref()
    }

    pub fn post_string(&self) -> Option<&str> {
        self.post_string.as_deref()
    }

    /// Created-then-deleted cancels out; any other creation or deletion
    /// is published; otherwise only a real value change is.
    pub fn should_publish(&self) -> bool {
        let Some(post) = &self.post else {
            return false;
        };
        match (&self.pre, post) {
            (PropertyValue::New, PropertyValue::Deleted) => false,
            (PropertyValue::New, _) | (_, PropertyValue::Deleted) => true,
            (pre, post) => pre != post,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    fn present(value: i64) -> PropertyValue {
        PropertyValue::Present(FieldValue::Value(Value::Integer(value)))
    }

    fn null() -> PropertyValue {
        PropertyValue::Present(FieldValue::null())
    }

    #[test]
    fn test_created_then_deleted_is_suppressed() {
        assert!(!PrePostValue::new(PropertyValue::New, PropertyValue::Deleted).should_publish());
    }

    #[test]
    fn test_creation_and_deletion_always_published() {
        assert!(PrePostValue::new(PropertyValue::New, present(1)).should_publish());
        assert!(PrePostValue::new(PropertyValue::New, null()).should_publish());
        assert!(PrePostValue::new(present(1), PropertyValue::Deleted).should_publish());
        assert!(PrePostValue::new(null(), PropertyValue::Deleted).should_publish());
    }

    #[test]
    fn test_updates_published_only_when_changed() {
        assert!(PrePostValue::new(present(1), present(2)).should_publish());
        assert!(PrePostValue::new(null(), present(2)).should_publish());
        assert!(!PrePostValue::new(present(1), present(1)).should_publish());
        assert!(!PrePostValue::new(null(), null()).should_publish());
    }

    #[test]
    fn test_uncaptured_post_not_published() {
        assert!(!PrePostValue::pre(PropertyValue::New).should_publish());
    }

    #[test]
    fn test_renderings_cached() {
        let pair = PrePostValue::new(PropertyValue::New, present(7));
        assert_eq!(pair.pre_string(), Some(NEW_MARKER));
        assert_eq!(pair.post_string(), Some("7"));

        let pair = PrePostValue::new(null(), PropertyValue::Deleted);
        assert_eq!(pair.pre_string(), None);
        assert_eq!(pair.post_string(), Some(DELETED_MARKER));
    }
}
