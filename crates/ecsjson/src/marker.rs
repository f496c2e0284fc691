//! Named markers with parent markers, serialized as tags.
use std::{mem, sync::Arc};

/// A named marker that may have parent markers.
///
/// Parents are shared through [`Arc`] and a marker cannot be changed after
/// construction, so every marker hierarchy is acyclic. A parent reachable
/// along two paths (a diamond) is visited once per path.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use ecsjson::Marker;
///
/// let audit = Arc::new(Marker::new("AUDIT"));
/// let security = Arc::new(Marker::new("SECURITY"));
/// let login = Marker::with_parents("LOGIN", [audit, security]);
/// let names: Vec<_> = login.iter().map(Marker::name).collect();
/// assert_eq!(names, ["LOGIN", "AUDIT", "SECURITY"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    name: String,
    parents: Vec<Arc<Marker>>,
}

impl Marker {
    /// Creates a marker without parents.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
        }
    }

    /// Creates a marker with the given parents, kept in order.
    pub fn with_parents(name: impl Into<String>, parents: impl IntoIterator<Item = Arc<Marker>>) -> Self {
        Self {
            name: name.into(),
            parents: parents.into_iter().collect(),
        }
    }

    /// The marker's name, written as one tag.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct parents in declaration order.
    #[must_use]
    pub fn parents(&self) -> &[Arc<Marker>] {
        &self.parents
    }

    /// Walks this marker and all of its ancestors depth-first, each marker
    /// before its parents, parents in declaration order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            next: Some(self),
            pending: Vec::new(),
        }
    }
}

impl Drop for Marker {
    fn drop(&mut self) {
        // Unwind parent chains on the heap; the default drop recurses per level.
        let mut pending = mem::take(&mut self.parents);
        while let Some(parent) = pending.pop() {
            if let Ok(mut parent) = Arc::try_unwrap(parent) {
                pending.append(&mut parent.parents);
            }
        }
    }
}

impl<'a> IntoIterator for &'a Marker {
    type Item = &'a Marker;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// Depth-first iterator over a marker hierarchy, see [`Marker::iter`].
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    next: Option<&'a Marker>,
    // Only allocates once a marker with parents is visited.
    pending: Vec<&'a Marker>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Marker;

    fn next(&mut self) -> Option<&'a Marker> {
        let marker = self.next.take().or_else(|| self.pending.pop())?;
        if let Some((first, rest)) = marker.parents.split_first() {
            self.pending.extend(rest.iter().rev().map(|parent| &**parent));
            self.next = Some(&**first);
        }
        Some(marker)
    }
}
