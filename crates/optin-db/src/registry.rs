use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Identity map for loaded rows, keyed by (table, primary key).
///
/// Lives inside a single unit of work, so it is `!Send` on purpose and never
/// shared between threads.
pub struct Registry<T> {
    rows: HashMap<(&'static str, i64), Rc<RefCell<T>>>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }

    pub fn fetch(&self, table: &'static str, pk: i64) -> Option<Rc<RefCell<T>>> {
        self.rows.get(&(table, pk)).cloned()
    }

    /// Register `value` unless the row is already known.
    /// Returns whichever instance is registered afterwards.
    pub fn register(&mut self, table: &'static str, pk: i64, value: T) -> Rc<RefCell<T>> {
        self.rows
            .entry((table, pk))
            .or_insert_with(|| Rc::new(RefCell::new(value)))
            .clone()
    }

    pub fn unregister(&mut self, table: &'static str, pk: i64) -> Option<Rc<RefCell<T>>> {
        self.rows.remove(&(table, pk))
    }

    pub fn is_registered(&self, table: &'static str, pk: i64) -> bool {
        self.rows.contains_key(&(table, pk))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
