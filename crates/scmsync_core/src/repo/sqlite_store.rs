//! SQLite implementation of the loader `Store` contract.
//!
//! # Responsibility
//! - Translate schema-described rows into SQL over the migrated tables.
//! - Resolve dotted reference paths by joining along foreign-key hops.
//!
//! # Invariants
//! - Every identifier placed into SQL comes from the `Schema` or from
//!   `FieldKey`s built by this crate; values are always bound parameters.
//! - Writes accept only `Column` and single-hop `ForeignKey` fields.

use crate::db::migrations::latest_version;
use crate::loader::{
    EntityKind, FieldKey, FieldValue, Row, Schema, SchemaError, Store, StoreError, StoreResult,
    StoredRow,
};
use log::debug;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ToSql};
use std::collections::HashMap;

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Integer(value) => ToSqlOutput::Owned(Value::Integer(*value)),
            FieldValue::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
        })
    }
}

/// `Store` backed by a migrated SQLite connection (or open transaction).
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
    schema: &'conn Schema,
}

impl<'conn> SqliteStore<'conn> {
    /// Wraps a connection without checking its schema.
    pub fn new(conn: &'conn Connection, schema: &'conn Schema) -> Self {
        Self { conn, schema }
    }

    /// Wraps a connection after verifying migrations and schema tables.
    pub fn try_new(conn: &'conn Connection, schema: &'conn Schema) -> StoreResult<Self> {
        ensure_store_connection_ready(conn, schema)?;
        Ok(Self { conn, schema })
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Maps a shrunk row onto `(column, value)` pairs of `entity`'s table.
    fn write_columns<'r>(
        &self,
        entity: EntityKind,
        row: &'r Row,
    ) -> StoreResult<Vec<(String, &'r FieldValue)>> {
        row.iter()
            .map(|(key, value)| match key {
                FieldKey::Column(column) => Ok((column.clone(), value)),
                FieldKey::ForeignKey { path } if path.len() == 1 => {
                    Ok((self.schema.foreign_key_column(entity, &path[0])?, value))
                }
                other => Err(StoreError::UnshrunkField {
                    entity,
                    field: other.clone(),
                }),
            })
            .collect()
    }
}

impl Store for SqliteStore<'_> {
    fn fetch_rows(&self, entity: EntityKind, fields: &[FieldKey]) -> StoreResult<Vec<StoredRow>> {
        let spec = self.schema.entity(entity)?;
        let mut select = SelectBuilder::new(self.schema);
        let exprs = fields
            .iter()
            .map(|field| select.expr("t0", entity, field))
            .collect::<StoreResult<Vec<_>>>()?;

        let projection: String = exprs.iter().map(|expr| format!(", {expr}")).collect();
        let sql = format!(
            "SELECT t0.\"{}\"{projection} FROM \"{}\" t0 {};",
            spec.primary_key,
            spec.table,
            select.joins.join(" ")
        );
        debug!("event=store_fetch module=repo status=start entity={entity} fields={}", fields.len());

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(record) = rows.next()? {
            let pk: i64 = record.get(0)?;
            let mut row = Row::new(entity);
            for (index, field) in fields.iter().enumerate() {
                row.insert(field.clone(), read_value(record, index + 1)?);
            }
            out.push(StoredRow { pk, row });
        }
        Ok(out)
    }

    fn insert_row(&self, entity: EntityKind, row: &Row) -> StoreResult<i64> {
        let spec = self.schema.entity(entity)?;
        let columns = self.write_columns(entity, row)?;
        let names: Vec<String> = columns.iter().map(|(name, _)| format!("\"{name}\"")).collect();
        let slots: Vec<String> = (1..=columns.len()).map(|index| format!("?{index}")).collect();
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({});",
            spec.table,
            names.join(", "),
            slots.join(", ")
        );
        self.conn
            .execute(&sql, params_from_iter(columns.iter().map(|(_, value)| *value)))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_row(&self, entity: EntityKind, pk: i64, row: &Row) -> StoreResult<()> {
        let spec = self.schema.entity(entity)?;
        let columns = self.write_columns(entity, row)?;
        if columns.is_empty() {
            return Ok(());
        }
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(index, (name, _))| format!("\"{name}\" = ?{}", index + 1))
            .collect();
        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE \"{}\" = ?{};",
            spec.table,
            assignments.join(", "),
            spec.primary_key,
            columns.len() + 1
        );

        let mut bound: Vec<&dyn ToSql> = columns
            .iter()
            .map(|(_, value)| *value as &dyn ToSql)
            .collect();
        bound.push(&pk);
        let changed = self.conn.execute(&sql, bound.as_slice())?;
        if changed == 0 {
            return Err(StoreError::NotFound { entity, pk });
        }
        Ok(())
    }

    fn delete_rows(&self, entity: EntityKind, pks: &[i64]) -> StoreResult<usize> {
        let spec = self.schema.entity(entity)?;
        let mut stmt = self.conn.prepare(&format!(
            "DELETE FROM \"{}\" WHERE \"{}\" = ?1;",
            spec.table, spec.primary_key
        ))?;
        let mut deleted = 0;
        for pk in pks {
            deleted += stmt.execute([pk])?;
        }
        Ok(deleted)
    }

    fn fetch_links(
        &self,
        left: EntityKind,
        right: EntityKind,
        left_fields: &[FieldKey],
        right_fields: &[FieldKey],
    ) -> StoreResult<Vec<(Row, Row)>> {
        let relation = self.schema.relation(left, right)?;
        let left_spec = self.schema.entity(left)?;
        let right_spec = self.schema.entity(right)?;

        let mut select = SelectBuilder::new(self.schema);
        select.joins.push(format!(
            "JOIN \"{}\" lt ON lt.\"{}\" = r.\"{}\"",
            left_spec.table, left_spec.primary_key, relation.left_column
        ));
        select.joins.push(format!(
            "JOIN \"{}\" rt ON rt.\"{}\" = r.\"{}\"",
            right_spec.table, right_spec.primary_key, relation.right_column
        ));
        let mut exprs = Vec::with_capacity(left_fields.len() + right_fields.len());
        for field in left_fields {
            exprs.push(select.expr("lt", left, field)?);
        }
        for field in right_fields {
            exprs.push(select.expr("rt", right, field)?);
        }
        if exprs.is_empty() {
            return Err(StoreError::InvalidData(format!(
                "relation {left}-{right} fetched without fields"
            )));
        }

        let sql = format!(
            "SELECT {} FROM \"{}\" r {};",
            exprs.join(", "),
            relation.table,
            select.joins.join(" ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(record) = rows.next()? {
            let mut left_row = Row::new(left);
            for (index, field) in left_fields.iter().enumerate() {
                left_row.insert(field.clone(), read_value(record, index)?);
            }
            let mut right_row = Row::new(right);
            for (index, field) in right_fields.iter().enumerate() {
                right_row.insert(field.clone(), read_value(record, left_fields.len() + index)?);
            }
            out.push((left_row, right_row));
        }
        Ok(out)
    }

    fn add_links(
        &self,
        left: EntityKind,
        right: EntityKind,
        left_pk: i64,
        right_pks: &[i64],
    ) -> StoreResult<()> {
        let relation = self.schema.relation(left, right)?;
        let mut stmt = self.conn.prepare(&format!(
            "INSERT OR IGNORE INTO \"{}\" (\"{}\", \"{}\") VALUES (?1, ?2);",
            relation.table, relation.left_column, relation.right_column
        ))?;
        for right_pk in right_pks {
            stmt.execute(params![left_pk, right_pk])?;
        }
        Ok(())
    }

    fn remove_links(
        &self,
        left: EntityKind,
        right: EntityKind,
        left_pk: i64,
        right_pks: &[i64],
    ) -> StoreResult<usize> {
        let relation = self.schema.relation(left, right)?;
        let mut stmt = self.conn.prepare(&format!(
            "DELETE FROM \"{}\" WHERE \"{}\" = ?1 AND \"{}\" = ?2;",
            relation.table, relation.left_column, relation.right_column
        ))?;
        let mut removed = 0;
        for right_pk in right_pks {
            removed += stmt.execute(params![left_pk, right_pk])?;
        }
        Ok(removed)
    }
}

/// Accumulates join clauses for reference paths, one alias per distinct path.
struct SelectBuilder<'s> {
    schema: &'s Schema,
    joins: Vec<String>,
    aliases: HashMap<(String, Vec<String>), (String, EntityKind)>,
}

impl<'s> SelectBuilder<'s> {
    fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            joins: Vec::new(),
            aliases: HashMap::new(),
        }
    }

    /// SQL expression reading `field` of the entity aliased as `base`.
    fn expr(&mut self, base: &str, kind: EntityKind, field: &FieldKey) -> StoreResult<String> {
        match field {
            FieldKey::Column(column) => Ok(format!("{base}.\"{column}\"")),
            FieldKey::Ref { path, column } => {
                let (alias, _) = self.join_path(base, kind, path)?;
                Ok(format!("{alias}.\"{column}\""))
            }
            FieldKey::ForeignKey { path } => {
                let Some((last, parents)) = path.split_last() else {
                    return Err(StoreError::InvalidData(
                        "foreign key without a path".to_string(),
                    ));
                };
                let (alias, owner) = self.join_path(base, kind, parents)?;
                let column = self.schema.foreign_key_column(owner, last)?;
                Ok(format!("{alias}.\"{column}\""))
            }
        }
    }

    fn join_path(
        &mut self,
        base: &str,
        kind: EntityKind,
        path: &[String],
    ) -> StoreResult<(String, EntityKind)> {
        let mut alias = base.to_string();
        let mut current = kind;
        for (depth, hop) in path.iter().enumerate() {
            let key = (base.to_string(), path[..=depth].to_vec());
            if let Some((known, target)) = self.aliases.get(&key) {
                alias = known.clone();
                current = *target;
                continue;
            }

            let target = self
                .schema
                .entity(current)?
                .target_of(hop)
                .ok_or_else(|| SchemaError::UnknownHop {
                    entity: current,
                    hop: hop.clone(),
                })?;
            let target_spec = self.schema.entity(target)?;
            let fk_column = self.schema.foreign_key_column(current, hop)?;
            let joined = format!("j{}", self.aliases.len() + 1);
            self.joins.push(format!(
                "JOIN \"{}\" {joined} ON {joined}.\"{}\" = {alias}.\"{fk_column}\"",
                target_spec.table, target_spec.primary_key
            ));
            self.aliases.insert(key, (joined.clone(), target));
            alias = joined;
            current = target;
        }
        Ok((alias, current))
    }
}

fn read_value(record: &rusqlite::Row<'_>, index: usize) -> StoreResult<FieldValue> {
    match record.get::<_, Value>(index)? {
        Value::Null => Ok(FieldValue::Null),
        Value::Integer(value) => Ok(FieldValue::Integer(value)),
        Value::Text(value) => Ok(FieldValue::Text(value)),
        Value::Real(value) => Err(StoreError::InvalidData(format!(
            "unexpected real value {value} in column {index}"
        ))),
        Value::Blob(_) => Err(StoreError::InvalidData(format!(
            "unexpected blob in column {index}"
        ))),
    }
}

fn ensure_store_connection_ready(conn: &Connection, schema: &Schema) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let tables = schema
        .entities()
        .map(|spec| spec.table)
        .chain(schema.relations().map(|relation| relation.table));
    for table in tables {
        if !table_exists(conn, table)? {
            return Err(StoreError::MissingTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
