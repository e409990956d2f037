//! Prop bags and the differ.
//!
//! The adapter hands the core discriminated prop values: a `Static` value is
//! applied once, immediately; a `Reactive` accessor is bound to its own
//! fine-grained effect and re-applied whenever only its upstream changes.
//! The core never sniffs "is this a getter" — the adapter decides.
//!
//! # Example
//! ```ignore
//! use spark_signals::signal;
//!
//! let x = signal(0.0f64);
//! let props = Props::new()
//!     .set("visible", true)
//!     .reactive("position-x", move || Value::Number(x.get()))
//!     .on(EventName::Click, |event| event.stop_propagation());
//! apply_props(&root, &instance, &props);
//! ```

pub mod apply;

pub use apply::apply_props;

use std::rc::Rc;

use crate::engine::attach::split_path;
use crate::engine::registry::Handler;
use crate::events::SyntheticEvent;
use crate::host::Value;
use crate::types::EventName;

// =============================================================================
// Prop Keys
// =============================================================================

/// Parsed prop key: handler name or slot path, nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropKey {
    Handler(EventName),
    Path(Vec<String>),
}

impl PropKey {
    pub fn parse(key: &str) -> Self {
        match EventName::parse(key) {
            Some(name) => PropKey::Handler(name),
            None => PropKey::Path(split_path(key)),
        }
    }
}

// =============================================================================
// Prop Values
// =============================================================================

/// A prop's value source.
#[derive(Clone)]
pub enum PropValue {
    /// Applied once at mount/update time.
    Static(Value),
    /// Accessor bound to an effect; re-applied per upstream change.
    Reactive(Rc<dyn Fn() -> Value>),
}

impl PropValue {
    pub fn read(&self) -> Value {
        match self {
            PropValue::Static(value) => value.clone(),
            PropValue::Reactive(read) => read(),
        }
    }
}

impl std::fmt::Debug for PropValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropValue::Static(value) => write!(f, "Static({value:?})"),
            PropValue::Reactive(_) => write!(f, "Reactive(..)"),
        }
    }
}

/// One entry in a prop bag.
#[derive(Clone)]
pub enum Prop {
    Value(PropValue),
    Handler(Handler),
    /// Produced by the differ for keys present before and gone now.
    Removed,
}

// =============================================================================
// Prop Bag
// =============================================================================

/// Ordered prop bag. Keys apply in insertion order; later entries for the
/// same key win.
#[derive(Clone, Default)]
pub struct Props {
    entries: Vec<(String, Prop)>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, key: &str, prop: Prop) -> Self {
        self.entries.retain(|(k, _)| k != key);
        self.entries.push((key.to_string(), prop));
        self
    }

    /// Static value, applied once.
    pub fn set(self, key: &str, value: impl Into<Value>) -> Self {
        self.push(key, Prop::Value(PropValue::Static(value.into())))
    }

    /// Reactive accessor; the applier binds it to its own effect.
    pub fn reactive(self, key: &str, read: impl Fn() -> Value + 'static) -> Self {
        self.push(key, Prop::Value(PropValue::Reactive(Rc::new(read))))
    }

    /// Pointer event handler, keyed by its `on*` prop name.
    pub fn on(self, name: EventName, handler: impl Fn(&mut SyntheticEvent) + 'static) -> Self {
        self.push(name.key(), Prop::Handler(Rc::new(handler)))
    }

    pub fn get(&self, key: &str) -> Option<&Prop> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, prop)| prop)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Prop)> {
        self.entries.iter().map(|(k, p)| (k.as_str(), p))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// =============================================================================
// Differ
// =============================================================================

/// Changed subset between two prop bags.
///
/// Static values compare structurally; handlers and reactive accessors are
/// opaque closures and always count as changed. Keys present in `old` but
/// absent in `new` come back as [`Prop::Removed`].
pub fn diff_props(old: &Props, new: &Props) -> Props {
    let mut out = Props::new();
    for (key, prop) in new.iter() {
        let unchanged = matches!(
            (old.get(key), prop),
            (
                Some(Prop::Value(PropValue::Static(a))),
                Prop::Value(PropValue::Static(b)),
            ) if a == b
        );
        if !unchanged {
            out = out.push(key, prop.clone());
        }
    }
    for (key, _) in old.iter() {
        if new.get(key).is_none() {
            out = out.push(key, Prop::Removed);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prop_key_parse() {
        assert_eq!(PropKey::parse("onClick"), PropKey::Handler(EventName::Click));
        assert_eq!(
            PropKey::parse("material-map-needsUpdate"),
            PropKey::Path(vec![
                "material".to_string(),
                "map".to_string(),
                "needsUpdate".to_string()
            ])
        );
    }

    #[test]
    fn test_diff_skips_equal_statics() {
        let old = Props::new().set("visible", true).set("name", "box");
        let new = Props::new().set("visible", true).set("name", "crate");

        let diff = diff_props(&old, &new);
        assert_eq!(diff.len(), 1);
        assert!(diff.get("name").is_some());
        assert!(diff.get("visible").is_none());
    }

    #[test]
    fn test_diff_marks_removed_keys() {
        let old = Props::new().set("visible", true).on(EventName::Click, |_| {});
        let new = Props::new();

        let diff = diff_props(&old, &new);
        assert!(matches!(diff.get("visible"), Some(Prop::Removed)));
        assert!(matches!(diff.get("onClick"), Some(Prop::Removed)));
    }

    #[test]
    fn test_diff_always_includes_reactive_and_handlers() {
        let old = Props::new()
            .reactive("position-x", || Value::Number(1.0))
            .on(EventName::Click, |_| {});
        let new = Props::new()
            .reactive("position-x", || Value::Number(1.0))
            .on(EventName::Click, |_| {});

        let diff = diff_props(&old, &new);
        assert_eq!(diff.len(), 2);
    }

    #[test]
    fn test_later_entry_for_same_key_wins() {
        let props = Props::new().set("visible", true).set("visible", false);
        assert_eq!(props.len(), 1);
        assert!(matches!(
            props.get("visible"),
            Some(Prop::Value(PropValue::Static(Value::Bool(false))))
        ));
    }
}
