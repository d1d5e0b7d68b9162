//! Postgres-backed document store
//!
//! Every collection lives in the single `documents` table as JSONB. Field
//! updates compile to `jsonb_set` / `#-` expressions so they run as one
//! statement.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgRow, PgPool, Postgres, QueryBuilder, Row};

use super::{split_path, Direction, Document, DocumentStore, FieldOp, FieldUpdate, Filter, Query, StoreError, StoreResult, WriteBatch, WriteOp};

#[derive(Clone)]
pub struct PgStore { pool: PgPool, project: String }

impl PgStore {
    pub fn new(pool: PgPool, project: impl Into<String>) -> Self { Self { pool, project: project.into() } }

    fn insert(&self, collection: &str, id: &str, data: Value, upsert: bool) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("INSERT INTO documents (project, collection, id, data) VALUES (");
        qb.push_bind(self.project.clone())
            .push(", ")
            .push_bind(collection.to_string())
            .push(", ")
            .push_bind(id.to_string())
            .push(", ")
            .push_bind(data)
            .push(")");
        if upsert {
            qb.push(" ON CONFLICT (project, collection, id) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()");
        } else {
            qb.push(" ON CONFLICT DO NOTHING");
        }
        qb
    }

    fn update_stmt(&self, collection: &str, id: &str, fields: &[FieldUpdate]) -> QueryBuilder<'static, Postgres> {
        // `jsonb_set` only creates the last key of a path, so missing parent
        // objects are materialized first, shallowest to deepest.
        let mut parents: Vec<Vec<String>> = Vec::new();
        for field in fields.iter().filter(|f| f.op != FieldOp::Delete) {
            let path = split_path(&field.path);
            for depth in 1..path.len() {
                let prefix = path[..depth].to_vec();
                if !parents.contains(&prefix) {
                    parents.push(prefix);
                }
            }
        }
        parents.sort_by_key(Vec::len);

        let mut qb = QueryBuilder::new("UPDATE documents SET updated_at = NOW(), data = ");
        for field in fields.iter().rev() {
            qb.push(match field.op { FieldOp::Delete => "(", _ => "jsonb_set(" });
        }
        for _ in &parents {
            qb.push("jsonb_set(");
        }
        qb.push("data");
        for parent in parents {
            qb.push(", ").push_bind(parent.clone())
                .push("::text[], COALESCE(documents.data #> ").push_bind(parent)
                .push("::text[], '{}'::jsonb), true)");
        }
        for field in fields {
            let path = split_path(&field.path);
            match &field.op {
                FieldOp::Set(value) => {
                    qb.push(", ").push_bind(path).push("::text[], ").push_bind(value.clone()).push("::jsonb, true)");
                }
                FieldOp::Delete => {
                    qb.push(" #- ").push_bind(path).push("::text[])");
                }
                FieldOp::Increment(by) => {
                    qb.push(", ").push_bind(path.clone())
                        .push("::text[], to_jsonb(COALESCE((documents.data #>> ").push_bind(path)
                        .push("::text[])::numeric, 0) + ").push_bind(*by).push("), true)");
                }
            }
        }
        self.push_key(&mut qb, collection, id);
        qb.push(" RETURNING id, data");
        qb
    }

    fn push_key(&self, qb: &mut QueryBuilder<'static, Postgres>, collection: &str, id: &str) {
        qb.push(" WHERE project = ")
            .push_bind(self.project.clone())
            .push(" AND collection = ")
            .push_bind(collection.to_string())
            .push(" AND id = ")
            .push_bind(id.to_string());
    }
}

fn to_document(row: PgRow) -> StoreResult<Document> {
    Ok(Document { id: row.try_get("id")?, data: row.try_get("data")? })
}

fn push_filter(qb: &mut QueryBuilder<'static, Postgres>, filter: &Filter) {
    match filter {
        Filter::Eq(path, value) => {
            qb.push("data #> ").push_bind(split_path(path)).push("::text[] = ").push_bind(value.clone()).push("::jsonb");
        }
        Filter::In(_, values) if values.is_empty() => {
            qb.push("FALSE");
        }
        Filter::In(path, values) => {
            qb.push("(");
            for (i, value) in values.iter().enumerate() {
                if i > 0 { qb.push(" OR "); }
                push_filter(qb, &Filter::Eq(path.clone(), value.clone()));
            }
            qb.push(")");
        }
        Filter::Gte(path, bound) => push_range(qb, path, ">=", bound),
        Filter::Lt(path, bound) => push_range(qb, path, "<", bound),
    }
}

fn push_range(qb: &mut QueryBuilder<'static, Postgres>, path: &str, op: &str, bound: &Value) {
    let path = split_path(path);
    match bound {
        Value::String(s) => {
            qb.push("(data #>> ").push_bind(path).push("::text[]) COLLATE \"C\" ").push(op).push(" ").push_bind(s.clone());
        }
        Value::Number(n) => {
            qb.push("jsonb_typeof(data #> ").push_bind(path.clone()).push("::text[]) = 'number' AND (data #>> ")
                .push_bind(path).push("::text[])::numeric ").push(op).push(" ").push_bind(n.to_string()).push("::numeric");
        }
        other => {
            qb.push("data #> ").push_bind(path).push("::text[] ").push(op).push(" ").push_bind(other.clone()).push("::jsonb");
        }
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let row = sqlx::query("SELECT id, data FROM documents WHERE project = $1 AND collection = $2 AND id = $3")
            .bind(&self.project)
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(to_document).transpose()
    }

    async fn create(&self, collection: &str, id: &str, data: Value) -> StoreResult<()> {
        let mut qb = self.insert(collection, id, data, false);
        let res = qb.build().execute(&self.pool).await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists { collection: collection.into(), id: id.into() });
        }
        Ok(())
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> StoreResult<()> {
        let mut qb = self.insert(collection, id, data, true);
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: &[FieldUpdate]) -> StoreResult<Document> {
        let mut qb = self.update_stmt(collection, id, fields);
        let row = qb.build().fetch_optional(&self.pool).await?;
        row.map(to_document).transpose()?.ok_or_else(|| StoreError::NotFound { collection: collection.into(), id: id.into() })
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM documents WHERE project = $1 AND collection = $2 AND id = $3")
            .bind(&self.project)
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        let mut qb = QueryBuilder::new("SELECT id, data FROM documents WHERE project = ");
        qb.push_bind(self.project.clone()).push(" AND collection = ").push_bind(collection.to_string());
        for filter in &query.filters {
            qb.push(" AND ");
            push_filter(&mut qb, filter);
        }
        match &query.order_by {
            Some((path, direction)) => {
                qb.push(" ORDER BY data #> ").push_bind(split_path(path)).push("::text[] ");
                qb.push(match direction { Direction::Asc => "ASC", Direction::Desc => "DESC" });
            }
            None => { qb.push(" ORDER BY id"); }
        }
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        if query.offset > 0 {
            qb.push(" OFFSET ").push_bind(query.offset as i64);
        }
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(to_document).collect()
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for op in batch.into_ops() {
            match op {
                WriteOp::Create { collection, id, data } => {
                    let mut qb = self.insert(&collection, &id, data, false);
                    if qb.build().execute(&mut *tx).await?.rows_affected() == 0 {
                        return Err(StoreError::AlreadyExists { collection, id });
                    }
                }
                WriteOp::Set { collection, id, data } => {
                    let mut qb = self.insert(&collection, &id, data, true);
                    qb.build().execute(&mut *tx).await?;
                }
                WriteOp::Update { collection, id, fields } => {
                    let mut qb = self.update_stmt(&collection, &id, &fields);
                    if qb.build().fetch_optional(&mut *tx).await?.is_none() {
                        return Err(StoreError::NotFound { collection, id });
                    }
                }
                WriteOp::Delete { collection, id } => {
                    let mut qb = QueryBuilder::new("DELETE FROM documents");
                    self.push_key(&mut qb, &collection, &id);
                    qb.build().execute(&mut *tx).await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;

    fn store() -> PgStore {
        let pool = PgPoolOptions::new().connect_lazy("postgres://tripund@localhost/tripund").unwrap();
        PgStore::new(pool, "test")
    }

    #[tokio::test]
    async fn nested_sets_materialize_each_parent_once() {
        let store = store();
        let qb = store.update_stmt("admin_users", "a1", &[
            FieldUpdate::set("password_policy.locked_until", json!(null)),
            FieldUpdate::increment("password_policy.failed_login_attempts", 1),
            FieldUpdate::set("updated_at", json!("2026-03-14T09:30:00Z")),
        ]);
        let sql = qb.sql();
        assert_eq!(sql.matches("'{}'::jsonb").count(), 1);
        assert_eq!(sql.matches("jsonb_set(").count(), 4);
        assert!(sql.find("COALESCE(documents.data #>").unwrap() < sql.find("to_jsonb").unwrap());
    }

    #[tokio::test]
    async fn deletes_and_flat_sets_need_no_parents() {
        let store = store();
        let qb = store.update_stmt("orders", "o1", &[
            FieldUpdate::delete("shipping.tracking.number"),
            FieldUpdate::set("invoice_id", json!("inv-1")),
        ]);
        assert!(!qb.sql().contains("'{}'::jsonb"));
    }
}
