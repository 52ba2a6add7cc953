//! Display-name and unique-ID assignment for batch port creation.

use crate::endpoint::{PortIdentity, UniqueId};

/// Pick `explicit[index]` when present, otherwise ask the fallback.
///
/// The fallback is only invoked for missing entries, so generators that
/// count their calls advance once per generated value.
pub fn resolve<T: Clone>(explicit: &[T], fallback: impl FnOnce() -> T, index: usize) -> T {
    match explicit.get(index) {
        Some(value) => value.clone(),
        None => fallback(),
    }
}

/// Generates `"<client> 1"`, `"<client> 2"`, ... for unnamed ports.
#[derive(Debug, Clone)]
pub struct PortNamer {
    client_name: String,
    next: usize,
}

impl PortNamer {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            next: 1,
        }
    }

    pub fn next_name(&mut self) -> String {
        let name = format!("{} {}", self.client_name, self.next);
        self.next += 1;
        name
    }
}

/// Arithmetic sequence of unique IDs: `base, base + stride, ...`.
///
/// Inputs and outputs use bases of different parity with a stride of two,
/// so their sequences never meet.
#[derive(Debug, Clone)]
pub struct UniqueIdAllocator {
    next: i32,
    stride: i32,
}

impl UniqueIdAllocator {
    pub fn new(base: UniqueId, stride: i32) -> Self {
        Self {
            next: base.get(),
            stride,
        }
    }

    pub fn next_id(&mut self) -> UniqueId {
        let id = UniqueId(self.next);
        self.next = self.next.wrapping_add(self.stride);
        id
    }
}

/// Ordered IDs and names for a batch of virtual ports.
///
/// The batch size is the longer of the two lists; the shorter one is padded
/// with generated values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRequest {
    pub unique_ids: Vec<UniqueId>,
    pub names: Vec<String>,
}

impl BatchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique_ids(mut self, ids: impl IntoIterator<Item = impl Into<UniqueId>>) -> Self {
        self.unique_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn names(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn len(&self) -> usize {
        self.unique_ids.len().max(self.names.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve every port identity of the batch, in order.
    pub fn resolve(&self, namer: &mut PortNamer, ids: &mut UniqueIdAllocator) -> Vec<PortIdentity> {
        (0..self.len())
            .map(|index| {
                let name = resolve(&self.names, || namer.next_name(), index);
                let unique_id = resolve(&self.unique_ids, || ids.next_id(), index);
                PortIdentity { unique_id, name }
            })
            .collect()
    }
}
