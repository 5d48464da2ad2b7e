use core::fmt::Debug;

/// Provenance value attached to a write and echoed on every notification it causes.
///
/// Any cloneable, debuggable, thread-safe type qualifies; equality is whatever the
/// caller's type defines.
pub trait Marker: Clone + Debug + Send + Sync + 'static {}

impl<T> Marker for T where T: Clone + Debug + Send + Sync + 'static {}
