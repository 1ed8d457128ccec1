//! In-memory [`DocumentStore`].
//!
//! Documents live in one ordered collection per type. Every operation runs
//! under a single lock acquisition, so batches are atomic: a failing save or
//! delete leaves the store untouched.

use crate::document::{identity_of, is_tagged_scalar, sub_document_ref, Document, DocumentRef};
use crate::error::{StoreError, StoreResult};
use crate::options::{DeleteOptions, FindOptions, LoadOptions, Query, SaveOptions, SortDirection};
use crate::store::DocumentStore;
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tessera_types::record;
use tracing::debug;

type Collections = HashMap<String, BTreeMap<String, Document>>;

/// Document store backed by process memory.
///
/// Unsorted `find` results come back in `_id` order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        self.collections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.collections.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored documents of one type.
    pub fn count(&self, entity_type: &str) -> usize {
        self.read().get(entity_type).map_or(0, BTreeMap::len)
    }

    /// Total number of stored documents.
    pub fn len(&self) -> usize {
        self.read().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, refs: &[DocumentRef], options: &LoadOptions) -> StoreResult<Vec<Document>> {
        let collections = self.read();
        let mut missed = 0;
        let mut loaded = Vec::with_capacity(refs.len());
        for doc_ref in refs {
            match lookup(&collections, doc_ref) {
                Some(document) => loaded.push(match &options.fields {
                    Some(projection) => projection.apply(document),
                    None => document.clone(),
                }),
                None if options.throw_if_not_found => return Err(doc_ref.not_found()),
                None => {
                    let mut acknowledgment = doc_ref.to_document();
                    acknowledgment.insert(record::MISSED.to_string(), JsonValue::Bool(true));
                    loaded.push(acknowledgment);
                    missed += 1;
                }
            }
        }
        debug!("Loaded {} document(s) ({} missed)", loaded.len() - missed, missed);
        Ok(loaded)
    }

    fn save(&self, documents: &[Document], options: &SaveOptions) -> StoreResult<Vec<Document>> {
        let mut collections = self.write();
        let mut staged: HashMap<DocumentRef, Document> = HashMap::new();
        let mut acknowledgments = Vec::with_capacity(documents.len());

        for document in documents {
            let doc_ref = DocumentRef::of(document)?;
            let existing = staged
                .get(&doc_ref)
                .or_else(|| lookup(&collections, &doc_ref))
                .cloned();
            let (base, marker) = resolve_base(&doc_ref, document, existing, options)?;

            let mut acknowledgment = without_new(document);
            if let Some(marker) = marker {
                acknowledgment.insert(marker.to_string(), JsonValue::Bool(true));
            }
            let updated = merge_document(base, document, options)?;
            staged.insert(doc_ref, updated);
            acknowledgments.push(acknowledgment);
        }

        let written = staged.len();
        for (doc_ref, document) in staged {
            collections
                .entry(doc_ref.entity_type)
                .or_default()
                .insert(doc_ref.id, document);
        }
        debug!("Saved {} document(s)", written);
        Ok(acknowledgments)
    }

    fn delete(&self, refs: &[DocumentRef], options: &DeleteOptions) -> StoreResult<Vec<Document>> {
        let mut collections = self.write();
        let mut acknowledgments = Vec::with_capacity(refs.len());
        for doc_ref in refs {
            let mut acknowledgment = doc_ref.to_document();
            if lookup(&collections, doc_ref).is_none() {
                if options.throw_if_not_found {
                    return Err(doc_ref.not_found());
                }
                acknowledgment.insert(record::MISSED.to_string(), JsonValue::Bool(true));
            }
            acknowledgments.push(acknowledgment);
        }

        let mut removed = 0;
        for doc_ref in refs {
            if let Some(collection) = collections.get_mut(&doc_ref.entity_type) {
                removed += usize::from(collection.remove(&doc_ref.id).is_some());
            }
        }
        debug!("Deleted {} document(s)", removed);
        Ok(acknowledgments)
    }

    fn find(&self, query: &Query, options: &FindOptions) -> StoreResult<Vec<Document>> {
        if query.entity_type.is_empty() {
            return Err(StoreError::InvalidQuery("the query type is empty".to_string()));
        }
        for path in query.filter.keys() {
            check_path(path)?;
        }
        for key in &options.sort {
            check_path(&key.path)?;
        }

        let collections = self.read();
        let Some(collection) = collections.get(&query.entity_type) else {
            debug!("Found 0 '{}' document(s)", query.entity_type);
            return Ok(Vec::new());
        };

        let mut matched: Vec<&Document> = collection
            .values()
            .filter(|document| {
                query
                    .filter
                    .iter()
                    .all(|(path, expected)| matches_filter(document, path, expected))
            })
            .collect();

        if !options.sort.is_empty() {
            matched.sort_by(|a, b| {
                options.sort.iter().fold(Ordering::Equal, |ordering, key| {
                    ordering.then_with(|| {
                        let ordering = compare_json(
                            resolve(a, &key.path).first().copied(),
                            resolve(b, &key.path).first().copied(),
                        );
                        match key.direction {
                            SortDirection::Ascending => ordering,
                            SortDirection::Descending => ordering.reverse(),
                        }
                    })
                })
            });
        }

        let limit = match options.limit {
            None | Some(0) => usize::MAX,
            Some(limit) => limit,
        };
        let found: Vec<Document> = matched
            .into_iter()
            .skip(options.skip.unwrap_or(0))
            .take(limit)
            .map(|document| match &options.fields {
                Some(projection) => projection.apply(document),
                None => document.clone(),
            })
            .collect();
        debug!("Found {} '{}' document(s)", found.len(), query.entity_type);
        Ok(found)
    }
}

fn lookup<'a>(collections: &'a Collections, doc_ref: &DocumentRef) -> Option<&'a Document> {
    collections.get(&doc_ref.entity_type)?.get(&doc_ref.id)
}

// ── Save ─────────────────────────────────────────────────────────

fn new_flag(document: &Document) -> StoreResult<bool> {
    match document.get(record::NEW) {
        None | Some(JsonValue::Null) => Ok(false),
        Some(JsonValue::Bool(flag)) => Ok(*flag),
        Some(other) => Err(StoreError::InvalidDocument(format!(
            "'{}' must be a boolean, found {other}",
            record::NEW
        ))),
    }
}

/// Picks the document an incoming one is merged into, enforcing the
/// `_new` rules. Returns the acknowledgment marker of a tolerated mismatch.
fn resolve_base(
    doc_ref: &DocumentRef,
    incoming: &Document,
    existing: Option<Document>,
    options: &SaveOptions,
) -> StoreResult<(Document, Option<&'static str>)> {
    let is_new = new_flag(incoming)?;
    match existing {
        Some(existing) if is_new => {
            if options.throw_if_already_exists {
                return Err(doc_ref.already_exists());
            }
            Ok((existing, Some(record::EXISTED)))
        }
        Some(existing) => Ok((existing, None)),
        None if is_new => Ok((doc_ref.to_document(), None)),
        None => {
            if options.throw_if_not_found {
                return Err(doc_ref.not_found());
            }
            Ok((doc_ref.to_document(), Some(record::MISSED)))
        }
    }
}

fn without_new(document: &Document) -> Document {
    document
        .iter()
        .filter(|(name, _)| name.as_str() != record::NEW)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn merge_document(
    mut base: Document,
    incoming: &Document,
    options: &SaveOptions,
) -> StoreResult<Document> {
    for (name, value) in incoming {
        if matches!(name.as_str(), record::NEW | record::MISSED | record::EXISTED) {
            continue;
        }
        let existing = base.remove(name);
        if let Some(merged) = merge_value(existing, value, options)? {
            base.insert(name.clone(), merged);
        }
    }
    Ok(base)
}

/// `None` deletes the field.
fn merge_value(
    existing: Option<JsonValue>,
    incoming: &JsonValue,
    options: &SaveOptions,
) -> StoreResult<Option<JsonValue>> {
    let merged = match incoming {
        JsonValue::Null => return Ok(None),
        JsonValue::Array(items) if items.iter().all(|item| sub_document_ref(item).is_some()) => {
            let existing = match existing {
                Some(JsonValue::Array(existing)) => existing,
                _ => Vec::new(),
            };
            JsonValue::Array(merge_sub_documents(existing, items, options)?)
        }
        JsonValue::Object(object) if !is_tagged_scalar(object) => {
            let base = match existing {
                Some(JsonValue::Object(existing))
                    if !is_tagged_scalar(&existing) && same_identity(&existing, object) =>
                {
                    existing
                }
                _ => Map::new(),
            };
            JsonValue::Object(merge_document(base, object, options)?)
        }
        other => other.clone(),
    };
    Ok(Some(merged))
}

/// Embedded objects are merged unless both carry identities that differ.
fn same_identity(existing: &Document, incoming: &Document) -> bool {
    match (identity_of(existing), identity_of(incoming)) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Element-wise merge by `(_type, _id)`. The result holds exactly the
/// incoming elements, in incoming order.
fn merge_sub_documents(
    existing: Vec<JsonValue>,
    items: &[JsonValue],
    options: &SaveOptions,
) -> StoreResult<Vec<JsonValue>> {
    let mut existing: Vec<Document> = existing
        .into_iter()
        .filter_map(|value| match value {
            JsonValue::Object(object) => Some(object),
            _ => None,
        })
        .collect();

    let mut merged = Vec::with_capacity(items.len());
    for item in items {
        let Some(object) = item.as_object() else {
            continue;
        };
        let doc_ref = DocumentRef::of(object)?;
        let wanted = Some((doc_ref.entity_type.as_str(), doc_ref.id.as_str()));
        let position = existing
            .iter()
            .position(|candidate| identity_of(candidate) == wanted);
        let found = position.map(|index| existing.swap_remove(index));
        let (base, _) = resolve_base(&doc_ref, object, found, options)?;
        merged.push(JsonValue::Object(merge_document(base, object, options)?));
    }
    Ok(merged)
}

// ── Find ─────────────────────────────────────────────────────────

fn check_path(path: &str) -> StoreResult<()> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(StoreError::InvalidQuery(format!("invalid field path '{path}'")));
    }
    if path.starts_with('$') {
        return Err(StoreError::InvalidQuery(format!(
            "query operators are not supported ('{path}')"
        )));
    }
    Ok(())
}

/// Values reached by a dotted path. Arrays along the path fan out over
/// their elements.
fn resolve<'a>(document: &'a Document, path: &str) -> Vec<&'a JsonValue> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = document.get(*head) {
            resolve_value(value, rest, &mut out);
        }
    }
    out
}

fn resolve_value<'a>(value: &'a JsonValue, segments: &[&str], out: &mut Vec<&'a JsonValue>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        JsonValue::Object(object) => {
            if let Some(child) = object.get(*head) {
                resolve_value(child, rest, out);
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                resolve_value(item, segments, out);
            }
        }
        _ => {}
    }
}

/// Equality filter. A missing field matches `null`; an array field matches
/// when it equals the expected value or contains it.
fn matches_filter(document: &Document, path: &str, expected: &JsonValue) -> bool {
    let candidates = resolve(document, path);
    if candidates.is_empty() {
        return expected.is_null();
    }
    candidates.into_iter().any(|candidate| {
        candidate == expected
            || matches!(candidate, JsonValue::Array(items) if items.contains(expected))
    })
}

fn rank(value: Option<&JsonValue>) -> u8 {
    match value {
        None | Some(JsonValue::Null) => 0,
        Some(JsonValue::Number(_)) => 1,
        Some(JsonValue::String(_)) => 2,
        Some(JsonValue::Object(object)) if is_tagged_scalar(object) => 6,
        Some(JsonValue::Object(_)) => 3,
        Some(JsonValue::Array(_)) => 4,
        Some(JsonValue::Bool(_)) => 5,
    }
}

/// Total order over JSON values: missing/null, numbers, strings, objects,
/// arrays, booleans, dates.
fn compare_json(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    let by_rank = rank(a).cmp(&rank(b));
    if by_rank != Ordering::Equal {
        return by_rank;
    }
    match (a, b) {
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (Some(JsonValue::Bool(x)), Some(JsonValue::Bool(y))) => x.cmp(y),
        (Some(JsonValue::Array(x)), Some(JsonValue::Array(y))) => x
            .iter()
            .zip(y)
            .map(|(x, y)| compare_json(Some(x), Some(y)))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Some(JsonValue::Object(x)), Some(JsonValue::Object(y))) if rank(a) == 6 => {
            x.get(record::VALUE)
                .and_then(JsonValue::as_str)
                .cmp(&y.get(record::VALUE).and_then(JsonValue::as_str))
        }
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
        _ => Ordering::Equal,
    }
}
