//! Builds parameterized statements over JSONB collection tables.
//!
//! Each collection is a table `(seq BIGSERIAL, id TEXT PRIMARY KEY, doc JSONB)`. Filters are
//! translated to JSONB containment and comparison predicates; every bound value is JSONB.

use serde_json::{json, Value};

use crate::error::StoreError;
use crate::store::Document;

/// Quote identifier for PostgreSQL (safe: only from registration).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }
}

/// `doc #> '{a,b}'` for a dotted path.
fn path_expr(key: &str) -> String {
    let parts: Vec<String> = key
        .split('.')
        .map(|p| format!("\"{}\"", p.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("(doc #> '{{{}}}')", parts.join(",").replace('\'', "''"))
}

/// Containment object for a dotted path: `a.b = v` -> `{"a": {"b": v}}`.
fn nested(key: &str, value: Value) -> Value {
    key.rsplit('.').fold(value, |acc, part| json!({ part: acc }))
}

fn operator_predicate(
    q: &mut QueryBuf,
    key: &str,
    op: &str,
    arg: &Value,
) -> Result<String, StoreError> {
    let path = path_expr(key);
    let cmp = |sym: &str, q: &mut QueryBuf| {
        let n = q.push_param(arg.clone());
        // jsonb ordering only means something between values of the same kind
        format!(
            "(jsonb_typeof({p}) = jsonb_typeof(${n}) AND {p} {sym} ${n})",
            p = path,
            n = n,
            sym = sym
        )
    };
    Ok(match op {
        "$eq" => equality(q, key, arg),
        "$ne" => format!("NOT {}", equality(q, key, arg)),
        "$gt" => cmp(">", q),
        "$gte" => cmp(">=", q),
        "$lt" => cmp("<", q),
        "$lte" => cmp("<=", q),
        "$in" | "$nin" => {
            if !arg.is_array() {
                return Err(StoreError::InvalidPipeline(format!("{} expects an array", op)));
            }
            let n = q.push_param(arg.clone());
            let p = format!(
                "(COALESCE({}, 'null'::jsonb) IN (SELECT jsonb_array_elements(${})))",
                path, n
            );
            if op == "$in" {
                p
            } else {
                format!("NOT {}", p)
            }
        }
        "$exists" => {
            if arg.as_bool().unwrap_or(true) {
                format!("({} IS NOT NULL)", path)
            } else {
                format!("({} IS NULL)", path)
            }
        }
        other => return Err(StoreError::UnsupportedStage(other.to_string())),
    })
}

fn equality(q: &mut QueryBuf, key: &str, value: &Value) -> String {
    if value.is_null() {
        let path = path_expr(key);
        return format!("({p} IS NULL OR {p} = 'null'::jsonb)", p = path);
    }
    let n = q.push_param(nested(key, value.clone()));
    format!("(doc @> ${})", n)
}

fn predicates(q: &mut QueryBuf, filter: &Document) -> Result<Vec<String>, StoreError> {
    let mut parts = Vec::new();
    for (key, cond) in filter {
        match key.as_str() {
            "$and" | "$or" => {
                let Value::Array(clauses) = cond else {
                    return Err(StoreError::InvalidPipeline(format!("{} expects an array", key)));
                };
                let mut inner = Vec::new();
                for clause in clauses {
                    let Value::Object(clause) = clause else {
                        return Err(StoreError::InvalidPipeline(format!("{} expects objects", key)));
                    };
                    let ps = predicates(q, clause)?;
                    inner.push(if ps.is_empty() {
                        "TRUE".to_string()
                    } else {
                        format!("({})", ps.join(" AND "))
                    });
                }
                if !inner.is_empty() {
                    let sep = if key == "$and" { " AND " } else { " OR " };
                    parts.push(format!("({})", inner.join(sep)));
                }
            }
            _ => match cond {
                Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
                    for (op, arg) in ops {
                        parts.push(operator_predicate(q, key, op, arg)?);
                    }
                }
                _ => parts.push(equality(q, key, cond)),
            },
        }
    }
    Ok(parts)
}

fn where_clause(q: &mut QueryBuf, filter: &Document) -> Result<String, StoreError> {
    let parts = predicates(q, filter)?;
    Ok(if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    })
}

/// CREATE TABLE for one collection.
pub fn create_collection(schema: &str, collection: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
            seq BIGSERIAL NOT NULL, \
            id TEXT PRIMARY KEY, \
            doc JSONB NOT NULL, \
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()\
        )",
        qualified_table(schema, collection)
    )
}

/// SELECT documents in insertion order with optional LIMIT/OFFSET.
pub fn select_docs(
    schema: &str,
    collection: &str,
    filter: &Document,
    limit: Option<u64>,
    offset: Option<u64>,
) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, collection);
    let where_clause = where_clause(&mut q, filter)?;
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT doc FROM {}{} ORDER BY seq{}{}",
        table, where_clause, limit_clause, offset_clause
    );
    Ok(q)
}

pub fn count_docs(schema: &str, collection: &str, filter: &Document) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, collection);
    let where_clause = where_clause(&mut q, filter)?;
    q.sql = format!("SELECT COUNT(*) FROM {}{}", table, where_clause);
    Ok(q)
}

/// INSERT; `$1` is the identity as a JSON string, `$2` the document.
pub fn insert_doc(schema: &str, collection: &str, id: &str, doc: &Document) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, collection);
    q.push_param(Value::String(id.to_string()));
    q.push_param(Value::Object(doc.clone()));
    q.sql = format!("INSERT INTO {} (id, doc) VALUES ($1 #>> '{{}}', $2)", table);
    q
}

/// Merge `set` into the first matching document.
pub fn update_one(
    schema: &str,
    collection: &str,
    filter: &Document,
    set: &Document,
) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, collection);
    let n = q.push_param(Value::Object(set.clone()));
    let where_clause = where_clause(&mut q, filter)?;
    q.sql = format!(
        "UPDATE {t} SET doc = doc || ${n} WHERE seq = (SELECT seq FROM {t}{w} ORDER BY seq LIMIT 1)",
        t = table,
        n = n,
        w = where_clause
    );
    Ok(q)
}

pub fn delete_one(schema: &str, collection: &str, filter: &Document) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, collection);
    let where_clause = where_clause(&mut q, filter)?;
    q.sql = format!(
        "DELETE FROM {t} WHERE seq = (SELECT seq FROM {t}{w} ORDER BY seq LIMIT 1)",
        t = table,
        w = where_clause
    );
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn equality_uses_containment() {
        let q = select_docs(
            "public",
            "widget",
            &doc(json!({"is_deleted": false})),
            Some(5),
            Some(0),
        )
        .unwrap();
        assert_eq!(
            q.sql,
            "SELECT doc FROM \"public\".\"widget\" WHERE (doc @> $1) ORDER BY seq LIMIT 5 OFFSET 0"
        );
        assert_eq!(q.params, vec![json!({"is_deleted": false})]);

        let q = select_docs("public", "widget", &doc(json!({"$and": [{"owner": "u1"}, {}]})), None, None)
            .unwrap();
        assert!(q.sql.ends_with("WHERE (((doc @> $1)) AND TRUE) ORDER BY seq"));
        assert_eq!(q.params, vec![json!({"owner": "u1"})]);
    }

    #[test]
    fn dotted_keys_nest_and_operators_compare() {
        let q = count_docs(
            "s",
            "t",
            &doc(json!({"company.name": "Acme", "price": {"$gte": 10}})),
        )
        .unwrap();
        assert!(q.sql.starts_with("SELECT COUNT(*) FROM \"s\".\"t\" WHERE (doc @> $1) AND "));
        assert!(q.sql.contains("(doc #> '{\"price\"}') >= $2"));
        assert_eq!(q.params[0], json!({"company": {"name": "Acme"}}));
    }

    #[test]
    fn update_binds_set_first() {
        let q = update_one("s", "t", &doc(json!({"_id": "a"})), &doc(json!({"is_deleted": true}))).unwrap();
        assert_eq!(q.params[0], json!({"is_deleted": true}));
        assert_eq!(q.params[1], json!({"_id": "a"}));
        assert!(q.sql.contains("SET doc = doc || $1"));
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quoted("a\"b"), "\"a\"\"b\"");
        assert!(create_collection("public", "price_times").contains("\"public\".\"price_times\""));
    }
}
