//! Event type filters

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::types::EventType;

/// Immutable set of accepted event types
///
/// An empty set accepts every event. Sets are shared, so handing the same
/// filter to many queues costs one allocation.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    types: Arc<BTreeSet<EventType>>,
}

impl FilterSet {
    /// A filter accepting every event
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether the filter lets `type_id` through
    pub fn accepts(&self, type_id: EventType) -> bool {
        self.types.is_empty() || self.types.contains(&type_id)
    }

    pub fn accepts_all(&self) -> bool {
        self.types.is_empty()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = EventType> + '_ {
        self.types.iter().copied()
    }
}

impl FromIterator<EventType> for FilterSet {
    fn from_iter<I: IntoIterator<Item = EventType>>(iter: I) -> Self {
        Self {
            types: Arc::new(iter.into_iter().collect()),
        }
    }
}

impl<const N: usize> From<[EventType; N]> for FilterSet {
    fn from(types: [EventType; N]) -> Self {
        types.into_iter().collect()
    }
}

/// Rendered as reported in statistics: `all` or a comma separated id list
impl fmt::Display for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.types.is_empty() {
            return f.write_str("all");
        }
        let mut first = true;
        for t in self.types.iter() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{:#x}", t)?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilterSet({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_accepts_everything() {
        let filter = FilterSet::all();
        assert!(filter.accepts(0));
        assert!(filter.accepts(u32::MAX));
        assert_eq!(filter.to_string(), "all");
    }

    #[test]
    fn test_explicit_types() {
        let filter = FilterSet::from([0x10001, 0x10002]);
        assert!(filter.accepts(0x10001));
        assert!(!filter.accepts(0x20001));
        assert_eq!(filter.len(), 2);
        assert_eq!(filter.to_string(), "0x10001,0x10002");
    }
}
