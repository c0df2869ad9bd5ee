//! Ordered, observable sequences of fields.

use std::{
    cmp::Ordering,
    fmt,
    ops::{Bound, RangeBounds},
    sync::Arc,
};

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::{
    Result,
    doc::Doc,
    field::{Field, FieldError, FieldResult},
    instance::Instance,
    object::{ObjectBase, ObjectField, ObjectFieldKind, Owner},
    serialization::Registry,
};

pub(crate) struct ListInner {
    pub(crate) base: ObjectBase,
    items: RwLock<Vec<Field>>,
}

/// An ordered sequence of fields.
///
/// Document references are stored behind proxies, so reading an element whose
/// document has not loaded yet gives [`FieldResult::Pending`]. Every mutating call
/// reports exactly one change to the list's owner.
///
/// ```
/// use dashfields::{Field, List};
///
/// let list = List::new();
/// list.push("a")?;
/// list.extend(["b", "c"])?;
/// assert_eq!(list.len(), 3);
/// assert_eq!(list.join(", "), "a, b, c");
/// assert_eq!(list.index_of(&Field::from("b")), Some(1));
/// # Ok::<(), dashfields::Error>(())
/// ```
#[derive(Clone)]
pub struct List(Arc<ListInner>);

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl List {
    pub fn new() -> Self {
        Self(Arc::new(ListInner {
            base: ObjectBase::new(),
            items: RwLock::new(Vec::new()),
        }))
    }

    /// Builds a list from initial values.
    pub fn from_fields<I, V>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Field>,
    {
        let list = Self::new();
        list.extend(values)?;
        Ok(list)
    }

    pub(crate) fn from_inner(inner: Arc<ListInner>) -> Self {
        Self(inner)
    }

    fn owner(&self) -> Owner {
        Owner::List(Arc::downgrade(&self.0))
    }

    pub fn len(&self) -> usize {
        self.0.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.items.read().is_empty()
    }

    /// Element at `index`, resolving document references.
    pub fn get(&self, index: usize) -> FieldResult {
        match self.get_raw(index) {
            Some(field) => resolve(field),
            None => FieldResult::Missing,
        }
    }

    /// Element at `index` in storage form; references are still proxies.
    pub fn get_raw(&self, index: usize) -> Option<Field> {
        self.0.items.read().get(index).cloned()
    }

    /// Snapshot of the elements in storage form.
    pub fn raw_items(&self) -> Vec<Field> {
        self.0.items.read().clone()
    }

    /// Snapshot of the resolved elements.
    pub fn to_vec(&self) -> Vec<FieldResult> {
        self.raw_items().into_iter().map(resolve).collect()
    }

    /// Iterates a snapshot of the resolved elements. Later mutations are not seen.
    pub fn iter(&self) -> std::vec::IntoIter<FieldResult> {
        self.to_vec().into_iter()
    }

    /// Loaded documents, in order. Pending and non-document elements are skipped.
    pub fn docs(&self) -> Vec<Doc> {
        self.iter()
            .filter_map(|item| item.ready().and_then(|field| field.as_doc().cloned()))
            .collect()
    }

    /// Text elements, in order.
    pub fn strings(&self) -> Vec<String> {
        self.0
            .items
            .read()
            .iter()
            .filter_map(|field| field.as_text().map(str::to_string))
            .collect()
    }

    /// Numeric elements, in order.
    pub fn numbers(&self) -> Vec<f64> {
        self.0
            .items
            .read()
            .iter()
            .filter_map(Field::as_number)
            .collect()
    }

    /// Position of the first element equal to `value`. A document matches a stored
    /// reference to it even if the reference has not loaded.
    pub fn index_of(&self, value: &Field) -> Option<usize> {
        self.0
            .items
            .read()
            .iter()
            .position(|stored| matches_stored(stored, value))
    }

    pub fn last_index_of(&self, value: &Field) -> Option<usize> {
        self.0
            .items
            .read()
            .iter()
            .rposition(|stored| matches_stored(stored, value))
    }

    pub fn includes(&self, value: &Field) -> bool {
        self.index_of(value).is_some()
    }

    /// Resolved elements in `range`, clamped to the list.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Vec<FieldResult> {
        let items = self.raw_items();
        let (start, end) = clamp_range(&range, items.len());
        items[start..end].iter().cloned().map(resolve).collect()
    }

    /// Joins the display form of every element. Pending and missing elements render
    /// as empty.
    pub fn join(&self, separator: &str) -> String {
        self.iter()
            .map(|item| item.ready().map(|field| field.to_string()).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// The resolved elements followed by `other`.
    pub fn concat(&self, other: impl IntoIterator<Item = FieldResult>) -> Vec<FieldResult> {
        let mut items = self.to_vec();
        items.extend(other);
        items
    }

    /// Appends one value. Returns the new length.
    pub fn push(&self, value: impl Into<Field>) -> Result<usize> {
        self.extend([value])
    }

    /// Appends values in order. Returns the new length.
    pub fn extend<I, V>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = V>,
        V: Into<Field>,
    {
        let values = self.prepare(values)?;
        let len = self.mutate(|items| {
            items.extend(values);
            (items.len(), Vec::new())
        });
        Ok(len)
    }

    /// Inserts values at the front. Returns the new length.
    pub fn unshift<I, V>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = V>,
        V: Into<Field>,
    {
        let values = self.prepare(values)?;
        let len = self.mutate(|items| {
            items.splice(0..0, values);
            (items.len(), Vec::new())
        });
        Ok(len)
    }

    /// Removes and returns the last element.
    pub fn pop(&self) -> Option<FieldResult> {
        if self.is_empty() {
            return None;
        }
        let removed = self.mutate(|items| {
            let removed = items.pop();
            (removed.clone(), removed.into_iter().collect())
        });
        removed.map(resolve)
    }

    /// Removes and returns the first element.
    pub fn shift(&self) -> Option<FieldResult> {
        if self.is_empty() {
            return None;
        }
        self.remove(0)
    }

    /// Removes the element at `index`, shifting later elements down.
    pub fn remove(&self, index: usize) -> Option<FieldResult> {
        if index >= self.len() {
            return None;
        }
        self.splice(index, 1, Vec::<Field>::new())
            .ok()
            .and_then(|mut removed| removed.pop())
    }

    /// Inserts `value` at `index`, which may equal the length.
    pub fn insert(&self, index: usize, value: impl Into<Field>) -> Result<()> {
        let len = self.len();
        if index > len {
            return Err(FieldError::IndexOutOfBounds { index, len }.into());
        }
        self.splice(index, 0, [value])?;
        Ok(())
    }

    /// Removes `delete_count` elements starting at `start` and inserts `values` in
    /// their place. `start` and `delete_count` are clamped to the list. Returns the
    /// removed elements.
    pub fn splice<I, V>(&self, start: usize, delete_count: usize, values: I) -> Result<Vec<FieldResult>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Field>,
    {
        let values = self.prepare(values)?;
        let removed = self.mutate(|items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            let removed: Vec<Field> = items.splice(start..end, values).collect();
            (removed.clone(), removed)
        });
        Ok(removed.into_iter().map(resolve).collect())
    }

    /// Replaces the element at `index`.
    pub fn set(&self, index: usize, value: impl Into<Field>) -> Result<()> {
        let len = self.len();
        if index >= len {
            return Err(FieldError::IndexOutOfBounds { index, len }.into());
        }
        self.splice(index, 1, [value])?;
        Ok(())
    }

    /// Sorts by a comparator over resolved elements. The sort is stable.
    pub fn sort_by(&self, mut compare: impl FnMut(&FieldResult, &FieldResult) -> Ordering) {
        let mut keyed: Vec<(FieldResult, Field)> = self
            .raw_items()
            .into_iter()
            .map(|field| (resolve(field.clone()), field))
            .collect();
        keyed.sort_by(|a, b| compare(&a.0, &b.0));
        let sorted: Vec<Field> = keyed.into_iter().map(|(_, field)| field).collect();
        self.mutate(|items| {
            *items = sorted;
            ((), Vec::new())
        });
    }

    pub fn reverse(&self) {
        self.mutate(|items| {
            items.reverse();
            ((), Vec::new())
        });
    }

    /// Overwrites every position in `range` with `value`. Document references get a
    /// separate proxy per position; embedded objects are copied per position.
    pub fn fill(&self, value: impl Into<Field>, range: impl RangeBounds<usize>) -> Result<()> {
        let value = value.into();
        let len = self.len();
        let (start, end) = clamp_range(&range, len);
        let values: Vec<Field> = (start..end)
            .map(|i| match (&value, i == start) {
                (Field::Object(obj), false) => Field::Object(obj.copy()),
                _ => value.clone(),
            })
            .collect();
        let values = self.prepare(values)?;
        self.mutate(|items| {
            let removed: Vec<Field> = items.splice(start..end, values).collect();
            ((), removed)
        });
        Ok(())
    }

    /// Removes every element.
    pub fn clear(&self) {
        self.mutate(|items| ((), std::mem::take(items)));
    }

    /// Converts values to storage form and checks that each object is unowned,
    /// appears once, and is not this list or a list containing it. Nothing is
    /// mutated if any value is rejected.
    fn prepare<I, V>(&self, values: I) -> Result<Vec<Field>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Field>,
    {
        let values: Vec<Field> = values
            .into_iter()
            .map(|value| value.into().into_stored())
            .collect();
        let ancestors = self.ancestors();
        let len = self.len();
        for (i, value) in values.iter().enumerate() {
            let Field::Object(obj) = value else {
                continue;
            };
            let key = (len + i).to_string();
            let exempt = matches!(obj, ObjectField::Proxy(proxy) if proxy.is_prefetch());
            let cyclic = matches!(obj, ObjectField::List(list)
                if ancestors.iter().any(|ancestor| Arc::ptr_eq(ancestor, &list.0)));
            let repeated = !exempt
                && values[..i]
                    .iter()
                    .any(|other| matches!(other, Field::Object(other) if other.ptr_eq(obj)));
            if cyclic || repeated {
                tracing::warn!(key = %key, "Rejected list insertion that would share or nest an object in itself");
                return Err(FieldError::OwnershipViolation { key }.into());
            }
            obj.base().check_unowned(&key, exempt)?;
        }
        Ok(values)
    }

    /// This list followed by every list it is nested in, innermost first.
    fn ancestors(&self) -> Vec<Arc<ListInner>> {
        let mut chain = vec![self.0.clone()];
        let mut binding = self.0.base.binding();
        while let Some((Owner::List(parent), _)) = binding {
            let Some(parent) = parent.upgrade() else {
                break;
            };
            binding = parent.base.binding();
            chain.push(parent);
        }
        chain
    }

    /// Applies `f` to the storage, rebinds elements to their positions and reports
    /// one change. `f` returns its result and the elements it removed.
    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Field>) -> (R, Vec<Field>)) -> R {
        let owner = self.owner();
        let result = {
            let mut items = self.0.items.write();
            let (result, removed) = f(&mut items);
            for field in &removed {
                if let Field::Object(obj) = field {
                    obj.base().unbind();
                }
            }
            for (i, field) in items.iter().enumerate() {
                if let Field::Object(obj) = field {
                    match obj.base().binding() {
                        Some((current, _)) if current.same(&owner) => obj.base().rekey(i.to_string()),
                        _ => {
                            let _ = obj.base().bind(owner.clone(), &i.to_string(), None, true);
                        }
                    }
                }
            }
            result
        };
        self.notify();
        result
    }

    /// Reconstructs a list from its serialized properties.
    pub(crate) fn from_json(map: &Map<String, Value>, instance: &Instance) -> Result<Self> {
        let fields = map
            .get("fields")
            .and_then(Value::as_array)
            .ok_or_else(|| FieldError::DeserializationFailed {
                type_tag: "list".to_string(),
                reason: "missing 'fields' array".to_string(),
            })?;
        let list = Self::new();
        let owner = list.owner();
        {
            let mut items = list.0.items.write();
            for value in fields {
                if let Some(field) = instance.registry().deserialize(value, instance)? {
                    let field = field.into_stored();
                    if let Field::Object(obj) = &field {
                        obj.base().bind(owner.clone(), &items.len().to_string(), None, true)?;
                    }
                    items.push(field);
                }
            }
        }
        Ok(list)
    }
}

impl ObjectFieldKind for List {
    fn type_tag(&self) -> &'static str {
        "list"
    }

    fn base(&self) -> &ObjectBase {
        &self.0.base
    }

    fn copy(&self) -> Self {
        let copied: Vec<Field> = self
            .raw_items()
            .into_iter()
            .map(|field| match field {
                Field::Object(obj) => Field::Object(obj.copy()),
                other => other,
            })
            .collect();
        let list = List::new();
        let owner = list.owner();
        for (i, field) in copied.iter().enumerate() {
            if let Field::Object(obj) = field {
                let _ = obj.base().bind(owner.clone(), &i.to_string(), None, true);
            }
        }
        *list.0.items.write() = copied;
        list
    }

    fn to_script_string(&self) -> String {
        let items: Vec<String> = self
            .iter()
            .map(|item| match item {
                FieldResult::Ready(field) => field.to_script_string(),
                _ => "undefined".to_string(),
            })
            .collect();
        format!("new List([{}])", items.join(","))
    }

    fn to_display_string(&self) -> String {
        format!("List({})", self.len())
    }

    fn to_json(&self, registry: &Registry) -> Result<Map<String, Value>> {
        let fields = self
            .raw_items()
            .iter()
            .map(|field| registry.serialize(field))
            .collect::<Result<Vec<_>>>()?;
        let mut map = Map::new();
        map.insert("fields".to_string(), Value::Array(fields));
        Ok(map)
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.items.read().iter()).finish()
    }
}

fn resolve(field: Field) -> FieldResult {
    match field {
        Field::Object(ObjectField::Proxy(proxy)) => proxy.value().map(|doc| Some(Field::Ref(doc))),
        other => FieldResult::Ready(other),
    }
}

fn matches_stored(stored: &Field, value: &Field) -> bool {
    match (stored, value) {
        (Field::Object(ObjectField::Proxy(proxy)), Field::Ref(doc)) => proxy.id() == doc.id(),
        _ => stored == value,
    }
}

fn clamp_range(range: &impl RangeBounds<usize>, len: usize) -> (usize, usize) {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    let end = end.min(len);
    (start.min(end), end)
}
