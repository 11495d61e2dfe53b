// THEORY:
// The presentation layer is an external collaborator: it owns the stylesheet
// rules that read the hero's custom properties. All this crate does is write
// those properties. `StyleSink` is that single write seam, and `Presenter`
// knows which properties exist and in which combinations they are written.
//
// Invariant: overlay, blur and saturate are always written together, either as
// computed values or as the conservative defaults.

use crate::core_modules::tuning::{PresentationParams, StyleValues};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

pub const VAR_POSITION: &str = "--bg-position";
pub const VAR_IMAGE: &str = "--bg-image";
pub const VAR_OVERLAY: &str = "--overlay";
pub const VAR_BLUR: &str = "--blur";
pub const VAR_SATURATE: &str = "--saturate";

/// Something that accepts styling-variable writes for one hero.
pub trait StyleSink {
    fn set_property(&mut self, name: &str, value: &str);
}

/// In-memory property map, the host-independent stand-in for an element's
/// inline style.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleMap {
    properties: BTreeMap<String, String>,
    writes: usize,
}

impl StyleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Total number of writes received, including overwrites.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl StyleSink for StyleMap {
    fn set_property(&mut self, name: &str, value: &str) {
        self.writes += 1;
        self.properties.insert(name.to_string(), value.to_string());
    }
}

/// Renders as an inline style declaration list.
impl fmt::Display for StyleMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{name}: {value};")?;
            first = false;
        }
        Ok(())
    }
}

/// A style map shared between a sampling task and whoever renders the hero.
pub type SharedStyle = Arc<Mutex<StyleMap>>;

impl StyleSink for SharedStyle {
    fn set_property(&mut self, name: &str, value: &str) {
        let mut style = self.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        style.set_property(name, value);
    }
}

impl<S: StyleSink + ?Sized> StyleSink for &mut S {
    fn set_property(&mut self, name: &str, value: &str) {
        (**self).set_property(name, value);
    }
}

/// Writes the hero's styling variables in their fixed groupings.
pub struct Presenter;

impl Presenter {
    pub fn apply_focal_position<K: StyleSink + ?Sized>(sink: &mut K, position: &str) {
        sink.set_property(VAR_POSITION, position);
    }

    pub fn apply_background_image<K: StyleSink + ?Sized>(sink: &mut K, src: &str) {
        sink.set_property(VAR_IMAGE, &format!("url(\"{src}\")"));
    }

    pub fn apply_computed<K: StyleSink + ?Sized>(sink: &mut K, params: &PresentationParams) {
        Self::apply_values(sink, &params.to_style());
    }

    pub fn apply_conservative_defaults<K: StyleSink + ?Sized>(sink: &mut K) {
        Self::apply_values(sink, &StyleValues::conservative());
    }

    fn apply_values<K: StyleSink + ?Sized>(sink: &mut K, values: &StyleValues) {
        sink.set_property(VAR_OVERLAY, &values.overlay);
        sink.set_property(VAR_BLUR, &values.blur);
        sink.set_property(VAR_SATURATE, &values.saturate);
    }
}
