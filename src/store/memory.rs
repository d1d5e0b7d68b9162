//! In-memory document store
//!
//! Used by tests and as the fallback store when no database is reachable at
//! startup.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{split_path, Direction, Document, DocumentStore, FieldOp, FieldUpdate, Filter, Query, StoreError, StoreResult, WriteBatch, WriteOp};

type Collection = BTreeMap<String, Value>;

#[derive(Debug, Default)]
pub struct MemoryStore { collections: RwLock<HashMap<String, Collection>> }

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Inserts documents that are not present yet, holding the write lock for
    /// the whole seed.
    pub async fn seed(&self, collection: &str, docs: Vec<(String, Value)>) -> usize {
        let mut guard = self.collections.write().await;
        let coll = guard.entry(collection.to_string()).or_default();
        let mut inserted = 0;
        for (id, data) in docs {
            if !coll.contains_key(&id) {
                coll.insert(id, data);
                inserted += 1;
            }
        }
        inserted
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let guard = self.collections.read().await;
        Ok(guard.get(collection).and_then(|c| c.get(id)).map(|data| Document { id: id.to_string(), data: data.clone() }))
    }

    async fn create(&self, collection: &str, id: &str, data: Value) -> StoreResult<()> {
        let mut guard = self.collections.write().await;
        insert_new(&mut guard, collection, id, data)
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> StoreResult<()> {
        let mut guard = self.collections.write().await;
        guard.entry(collection.to_string()).or_default().insert(id.to_string(), data);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: &[FieldUpdate]) -> StoreResult<Document> {
        let mut guard = self.collections.write().await;
        let data = update_existing(&mut guard, collection, id, fields)?;
        Ok(Document { id: id.to_string(), data })
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let mut guard = self.collections.write().await;
        Ok(guard.get_mut(collection).and_then(|c| c.remove(id)).is_some())
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        let guard = self.collections.read().await;
        let Some(coll) = guard.get(collection) else { return Ok(vec![]) };

        let mut docs: Vec<Document> = coll
            .iter()
            .filter(|(_, data)| query.filters.iter().all(|f| passes(data, f)))
            .map(|(id, data)| Document { id: id.clone(), data: data.clone() })
            .collect();

        if let Some((path, direction)) = &query.order_by {
            let path = split_path(path);
            docs.sort_by(|a, b| {
                let ord = compare(lookup(&a.data, &path), lookup(&b.data, &path));
                match direction { Direction::Asc => ord, Direction::Desc => ord.reverse() }
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(docs.into_iter().skip(query.offset).take(limit).collect())
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut guard = self.collections.write().await;
        // A failing op drops the staged copy.
        let mut staged = guard.clone();
        for op in batch.into_ops() {
            match op {
                WriteOp::Create { collection, id, data } => insert_new(&mut staged, &collection, &id, data)?,
                WriteOp::Set { collection, id, data } => {
                    staged.entry(collection).or_default().insert(id, data);
                }
                WriteOp::Update { collection, id, fields } => {
                    update_existing(&mut staged, &collection, &id, &fields)?;
                }
                WriteOp::Delete { collection, id } => {
                    if let Some(coll) = staged.get_mut(&collection) {
                        coll.remove(&id);
                    }
                }
            }
        }
        *guard = staged;
        Ok(())
    }
}

fn insert_new(collections: &mut HashMap<String, Collection>, collection: &str, id: &str, data: Value) -> StoreResult<()> {
    let coll = collections.entry(collection.to_string()).or_default();
    if coll.contains_key(id) {
        return Err(StoreError::AlreadyExists { collection: collection.into(), id: id.into() });
    }
    coll.insert(id.to_string(), data);
    Ok(())
}

fn update_existing(collections: &mut HashMap<String, Collection>, collection: &str, id: &str, fields: &[FieldUpdate]) -> StoreResult<Value> {
    let doc = collections
        .get_mut(collection)
        .and_then(|c| c.get_mut(id))
        .ok_or_else(|| StoreError::NotFound { collection: collection.into(), id: id.into() })?;
    let mut updated = doc.clone();
    for field in fields {
        apply(&mut updated, field)?;
    }
    *doc = updated.clone();
    Ok(updated)
}

fn apply(doc: &mut Value, update: &FieldUpdate) -> StoreResult<()> {
    let path = split_path(&update.path);
    let Some((leaf, parents)) = path.split_last() else { return Err(StoreError::InvalidPath(update.path.clone())) };

    let mut target = doc;
    for key in parents {
        let obj = target.as_object_mut().ok_or_else(|| StoreError::InvalidPath(update.path.clone()))?;
        target = obj.entry(key.clone()).or_insert_with(|| Value::Object(Map::new()));
    }
    let obj = target.as_object_mut().ok_or_else(|| StoreError::InvalidPath(update.path.clone()))?;

    match &update.op {
        FieldOp::Set(value) => { obj.insert(leaf.clone(), value.clone()); }
        FieldOp::Delete => { obj.remove(leaf); }
        FieldOp::Increment(by) => {
            let next = match obj.get(leaf) {
                Some(Value::Number(n)) if n.is_i64() => Value::from(n.as_i64().unwrap_or(0) + by),
                Some(Value::Number(n)) => Value::from(n.as_f64().unwrap_or(0.0) + *by as f64),
                _ => Value::from(*by),
            };
            obj.insert(leaf.clone(), next);
        }
    }
    Ok(())
}

fn lookup<'a>(doc: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(doc, |v, key| v.get(key))
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            x.as_f64().unwrap_or(0.0).partial_cmp(&y.as_f64().unwrap_or(0.0)).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn passes(doc: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(path, want) => lookup(doc, &split_path(path)) == Some(want),
        Filter::In(path, wants) => lookup(doc, &split_path(path)).is_some_and(|v| wants.contains(v)),
        Filter::Gte(path, bound) => {
            let v = lookup(doc, &split_path(path));
            same_kind(v, bound) && compare(v, Some(bound)) != Ordering::Less
        }
        Filter::Lt(path, bound) => {
            let v = lookup(doc, &split_path(path));
            same_kind(v, bound) && compare(v, Some(bound)) == Ordering::Less
        }
    }
}

fn same_kind(v: Option<&Value>, bound: &Value) -> bool {
    matches!((v, bound), (Some(Value::Number(_)), Value::Number(_)) | (Some(Value::String(_)), Value::String(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_rejects_existing_id() {
        let store = MemoryStore::new();
        store.create("c", "a", json!({"n": 1})).await.unwrap();
        let err = store.create("c", "a", json!({"n": 2})).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert_eq!(store.get("c", "a").await.unwrap().unwrap().data["n"], 1);
    }

    #[tokio::test]
    async fn update_applies_nested_set_delete_and_increment() {
        let store = MemoryStore::new();
        store.set("c", "a", json!({"policy": {"attempts": 4, "locked_until": "x"}})).await.unwrap();
        let doc = store.update("c", "a", &[
            FieldUpdate::increment("policy.attempts", 1),
            FieldUpdate::delete("policy.locked_until"),
            FieldUpdate::set("name", json!("Asha")),
        ]).await.unwrap();
        assert_eq!(doc.data, json!({"policy": {"attempts": 5}, "name": "Asha"}));
    }

    #[tokio::test]
    async fn update_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store.update("c", "nope", &[FieldUpdate::increment("n", 1)]).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        for (id, n) in [("a", "P-0001"), ("b", "P-0003"), ("c", "Q-0009"), ("d", "P-0002")] {
            store.set("inv", id, json!({"number": n})).await.unwrap();
        }
        let q = Query::new()
            .gte("number", json!("P-"))
            .lt("number", json!("P-Z"))
            .order_by("number", Direction::Desc)
            .limit(1);
        let docs = store.query("inv", &q).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "b");
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_partial_writes() {
        let store = MemoryStore::new();
        store.set("usage", "p_o", json!({})).await.unwrap();
        store.set("promo", "p", json!({"used_count": 0})).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.update("promo", "p", vec![FieldUpdate::increment("used_count", 1)]);
        batch.create("usage", "p_o", json!({}));
        assert!(store.commit(batch).await.is_err());
        assert_eq!(store.get("promo", "p").await.unwrap().unwrap().data["used_count"], 0);
    }

    #[tokio::test]
    async fn batch_deletes_with_other_writes() {
        let store = MemoryStore::new();
        store.set("promotions", "p1", json!({"code": "DIWALI"})).await.unwrap();
        store.set("promotion_codes", "DIWALI", json!({"promotion_id": "p1"})).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.delete("promotions", "p1").delete("promotion_codes", "DIWALI").delete("promotion_codes", "absent");
        store.commit(batch).await.unwrap();
        assert!(store.get("promotions", "p1").await.unwrap().is_none());
        assert!(store.get("promotion_codes", "DIWALI").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn seed_skips_existing_documents() {
        let store = MemoryStore::new();
        store.set("categories", "a", json!({"name": "kept"})).await.unwrap();
        let n = store.seed("categories", vec![("a".into(), json!({})), ("b".into(), json!({}))]).await;
        assert_eq!(n, 1);
        assert_eq!(store.get("categories", "a").await.unwrap().unwrap().data["name"], "kept");
    }
}
