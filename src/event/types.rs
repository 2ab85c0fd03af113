//! Shared event record

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// Numeric event type tag (`category << 16 | element`)
pub type EventType = u32;

/// Build a type tag from its category and element
pub const fn make_type(category: u16, element: u16) -> EventType {
    ((category as u32) << 16) | element as u32
}

/// Category part of a type tag
pub const fn category_of(type_id: EventType) -> u16 {
    (type_id >> 16) as u16
}

/// Element part of a type tag
pub const fn element_of(type_id: EventType) -> u16 {
    (type_id & 0xffff) as u16
}

struct EventInner {
    type_id: EventType,
    payload: Bytes,
}

/// An immutable event shared by every queue holding it
///
/// Cloning is cheap: only the reference count changes. The payload is dropped
/// when the last queue or consumer releases its clone.
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    /// Create an event from a type tag and an opaque payload
    pub fn new(type_id: EventType, payload: impl Into<Bytes>) -> Self {
        Self {
            inner: Arc::new(EventInner {
                type_id,
                payload: payload.into(),
            }),
        }
    }

    /// Create an event from a category/element pair
    pub fn with_category(category: u16, element: u16, payload: impl Into<Bytes>) -> Self {
        Self::new(make_type(category, element), payload)
    }

    pub fn type_id(&self) -> EventType {
        self.inner.type_id
    }

    pub fn category(&self) -> u16 {
        category_of(self.inner.type_id)
    }

    pub fn element(&self) -> u16 {
        element_of(self.inner.type_id)
    }

    /// Opaque payload (reference counted, never copied)
    pub fn payload(&self) -> &Bytes {
        &self.inner.payload
    }

    /// Size of the payload in bytes
    pub fn size(&self) -> usize {
        self.inner.payload.len()
    }

    /// Whether two handles point to the same record
    pub fn ptr_eq(&self, other: &Event) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles on this record
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.type_id() == other.type_id() && self.payload() == other.payload()
    }
}

impl Eq for Event {}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("category", &self.category())
            .field("element", &self.element())
            .field("size", &self.size())
            .finish()
    }
}
