use std::any::{Any, TypeId};
use std::hash::{BuildHasherDefault, Hasher};

use indexmap::IndexMap;

/// Application state shared by every request.
///
/// State is injected once with [`App::state`](crate::App::state)
/// and read through [`Context::state`](crate::Context::state).
#[derive(Default)]
pub struct State(http::Extensions);

impl State {
    pub(crate) fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.0.insert(value);
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.0.get::<T>()
    }
}

type AnyValue = Box<dyn Any + Send + Sync>;

/// A per-request store of typed values.
///
/// Values are keyed by their type and an optional string id, so
/// interceptors can hand data to later interceptors and the handler.
///
/// Lookups without an id return *some* value of the requested type.
/// When several ids hold values of one type, use an id for a
/// deterministic result.
#[derive(Default)]
pub struct Variables {
    map: IndexMap<TypeId, Vec<(Option<String>, AnyValue)>, BuildHasherDefault<Identity>>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under its type with no id.
    ///
    /// Returns the value previously stored in that slot.
    pub fn add<T>(&mut self, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.insert(None, value)
    }

    /// Store a value under its type and the given id.
    pub fn add_with_id<T>(&mut self, id: impl Into<String>, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.insert(Some(id.into()), value)
    }

    fn insert<T>(&mut self, id: Option<String>, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        let slots = self.map.entry(TypeId::of::<T>()).or_default();

        match slots.iter_mut().find(|(slot, _)| *slot == id) {
            Some((_, existing)) => std::mem::replace(existing, Box::new(value))
                .downcast::<T>()
                .ok()
                .map(|boxed| *boxed),
            None => {
                slots.push((id, Box::new(value)));
                None
            }
        }
    }

    /// Returns a value of type `T` stored under any id.
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())?
            .iter()
            .find_map(|(_, value)| value.downcast_ref())
    }

    /// Returns the value of type `T` stored under exactly `id`.
    pub fn get_with_id<T>(&self, id: &str) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.slot::<T>(Some(id))
            .and_then(|value| value.downcast_ref())
    }

    pub fn get_mut<T>(&mut self, id: Option<&str>) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())?
            .iter_mut()
            .find(|(slot, _)| slot.as_deref() == id)
            .and_then(|(_, value)| value.downcast_mut())
    }

    pub fn remove<T>(&mut self, id: Option<&str>) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        let slots = self.map.get_mut(&TypeId::of::<T>())?;
        let index = slots.iter().position(|(slot, _)| slot.as_deref() == id)?;

        slots
            .remove(index)
            .1
            .downcast::<T>()
            .ok()
            .map(|boxed| *boxed)
    }

    pub fn contains<T>(&self, id: Option<&str>) -> bool
    where
        T: Send + Sync + 'static,
    {
        match id {
            Some(id) => self.get_with_id::<T>(id).is_some(),
            None => self.get::<T>().is_some(),
        }
    }

    /// The total number of stored values.
    pub fn len(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot<T: 'static>(&self, id: Option<&str>) -> Option<&AnyValue> {
        self.map
            .get(&TypeId::of::<T>())?
            .iter()
            .find(|(slot, _)| slot.as_deref() == id)
            .map(|(_, value)| value)
    }
}

// `TypeId`s are already hashes.
#[derive(Default)]
struct Identity(u64);

impl Hasher for Identity {
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 = self.0.rotate_left(8) ^ u64::from(byte);
        }
    }

    fn write_u64(&mut self, id: u64) {
        self.0 = id;
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_id() {
        let mut vars = Variables::new();
        vars.add_with_id("x", 42_i32);
        vars.add_with_id("y", 7_i32);

        assert_eq!(vars.get_with_id::<i32>("x"), Some(&42));
        assert_eq!(vars.get_with_id::<i32>("y"), Some(&7));
        assert_eq!(vars.get_with_id::<i32>("z"), None);
        assert_eq!(vars.get_with_id::<i64>("x"), None);
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn without_id() {
        let mut vars = Variables::new();
        assert_eq!(vars.get::<i32>(), None);

        vars.add_with_id("x", 42_i32);
        assert!(vars.get::<i32>().is_some());
        assert!(vars.contains::<i32>(None));
        assert!(!vars.contains::<String>(None));

        vars.add(String::from("user"));
        assert_eq!(vars.get::<String>().map(String::as_str), Some("user"));
    }

    #[test]
    fn replace_and_remove() {
        let mut vars = Variables::new();
        assert_eq!(vars.add_with_id("n", 1_u8), None);
        assert_eq!(vars.add_with_id("n", 2_u8), Some(1));

        *vars.get_mut::<u8>(Some("n")).unwrap() += 1;
        assert_eq!(vars.remove::<u8>(Some("n")), Some(3));
        assert!(vars.is_empty());
    }
}
