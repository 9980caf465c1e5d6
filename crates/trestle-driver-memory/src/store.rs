use crate::ConstraintViolation;

use std::{collections::HashMap, sync::Arc};
use trestle_core::{
    driver::{operation, Operation, Response},
    schema::db::{ColumnId, Schema, Table, TableId},
    stmt::{JoinKind, ProjectionExpr, Select, Type, Value, ValueRecord},
};

type Row = Vec<Value>;
type Result<T> = std::result::Result<T, ConstraintViolation>;

static NULL: Value = Value::Null;

#[derive(Debug, Default)]
pub(crate) struct Store {
    /// Schema of the last operation, used to look tables up by name.
    schema: Option<Arc<Schema>>,

    tables: HashMap<TableId, TableData>,
}

#[derive(Debug, Default)]
struct TableData {
    rows: Vec<Row>,

    /// Last value handed out by an auto-increment column.
    last_id: i64,
}

impl Store {
    pub(crate) fn attach(&mut self, schema: &Arc<Schema>) {
        self.schema = Some(schema.clone());
    }

    pub(crate) fn rows(&self, name: &str) -> Vec<Row> {
        self.table_by_name(name)
            .and_then(|table| self.tables.get(&table.id))
            .map(|data| data.rows.clone())
            .unwrap_or_default()
    }

    pub(crate) fn column(&self, name: &str, column: &str) -> Vec<Value> {
        let Some(table) = self.table_by_name(name) else {
            return vec![];
        };
        let Some(column) = table.column_by_name(column) else {
            return vec![];
        };
        self.rows(name)
            .into_iter()
            .map(|row| value(&row, column.id).clone())
            .collect()
    }

    fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.schema.as_ref()?.table_by_name(name)
    }

    pub(crate) fn exec(
        &mut self,
        schema: &Schema,
        op: Operation,
        enforce_foreign_keys: bool,
    ) -> Result<Response> {
        match op {
            Operation::Insert(op) => self.insert(schema, op, enforce_foreign_keys),
            Operation::Update(op) => self.update(schema, op, enforce_foreign_keys),
            Operation::Delete(op) => self.delete(schema, op, enforce_foreign_keys),
            Operation::Select(select) => Ok(Response::values(self.select(&select))),
            Operation::Union(selects) => Ok(Response::values(
                selects
                    .iter()
                    .flat_map(|select| self.select(select))
                    .collect(),
            )),
        }
    }

    fn insert(
        &mut self,
        schema: &Schema,
        op: operation::Insert,
        enforce_foreign_keys: bool,
    ) -> Result<Response> {
        let table = schema.table(op.table);
        let mut last_id = self.tables.get(&op.table).map_or(0, |data| data.last_id);
        let mut staged: Vec<Row> = vec![];

        for record in op.rows {
            let mut row = vec![Value::Null; table.columns.len()];

            for (column, value) in op.columns.iter().zip(record.into_vec()) {
                let slot = row.get_mut(column.index).ok_or_else(|| unknown(table, *column))?;
                *slot = value;
            }

            for column in &table.columns {
                if !column.auto_increment {
                    continue;
                }
                let slot = &mut row[column.id.index];
                match slot.to_position() {
                    Some(id) => last_id = last_id.max(id),
                    None if slot.is_null() => {
                        last_id += 1;
                        *slot = match column.ty {
                            Type::I32 => Value::I32(last_id as i32),
                            _ => Value::I64(last_id),
                        };
                    }
                    None => {}
                }
            }

            normalize(table, &mut row)?;

            let key = primary_key(table, &row);
            let duplicate = self.rows_of(op.table).iter().chain(&staged).any(|existing| {
                primary_key(table, existing) == key
            });
            if duplicate {
                return Err(ConstraintViolation::DuplicateKey {
                    table: table.name.clone(),
                    key,
                });
            }

            staged.push(row);
        }

        if enforce_foreign_keys {
            for row in &staged {
                self.check_references(schema, table, row, &staged)?;
            }
        }

        let response = match op.returning {
            Some(column) => Response::values(
                staged
                    .iter()
                    .map(|row| ValueRecord::from_vec(vec![value(row, column).clone()]))
                    .collect(),
            ),
            None => Response::count(staged.len() as u64),
        };

        let data = self.tables.entry(op.table).or_default();
        data.last_id = last_id;
        data.rows.extend(staged);

        Ok(response)
    }

    fn update(
        &mut self,
        schema: &Schema,
        op: operation::Update,
        enforce_foreign_keys: bool,
    ) -> Result<Response> {
        let table = schema.table(op.table);
        let mut updated = vec![];

        for (index, row) in self.rows_of(op.table).iter().enumerate() {
            if !op.filter.matches(|column| value(row, column)) {
                continue;
            }

            let mut row = row.clone();
            for (column, assigned) in &op.assignments {
                let slot = row.get_mut(column.index).ok_or_else(|| unknown(table, *column))?;
                *slot = assigned.clone();
            }
            normalize(table, &mut row)?;

            if enforce_foreign_keys {
                self.check_references(schema, table, &row, &[])?;
            }

            updated.push((index, row));
        }

        let count = updated.len() as u64;
        if let Some(data) = self.tables.get_mut(&op.table) {
            for (index, row) in updated {
                data.rows[index] = row;
            }
        }

        Ok(Response::count(count))
    }

    fn delete(
        &mut self,
        schema: &Schema,
        op: operation::Delete,
        enforce_foreign_keys: bool,
    ) -> Result<Response> {
        let table = schema.table(op.table);
        let rows = self.rows_of(op.table);

        let deleted = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| op.filter.matches(|column| value(row, column)))
            .map(|(index, _)| index)
            .collect::<Vec<_>>();

        if enforce_foreign_keys {
            for index in &deleted {
                let row = &rows[*index];

                for (referencing, foreign_key) in schema.foreign_keys_referencing(table.id) {
                    let key = foreign_key
                        .referenced_columns
                        .iter()
                        .map(|column| value(row, *column))
                        .collect::<Vec<_>>();

                    let still_referenced =
                        self.rows_of(referencing.id)
                            .iter()
                            .enumerate()
                            .any(|(other, candidate)| {
                                let same_row = referencing.id == table.id && deleted.contains(&other);
                                !same_row
                                    && foreign_key
                                        .columns
                                        .iter()
                                        .zip(&key)
                                        .all(|(column, expected)| {
                                            let actual = value(candidate, *column);
                                            !actual.is_null() && actual == *expected
                                        })
                            });

                    if still_referenced {
                        return Err(ConstraintViolation::StillReferenced {
                            table: table.name.clone(),
                            foreign_key: foreign_key.name.clone(),
                        });
                    }
                }
            }
        }

        let count = deleted.len() as u64;
        if let Some(data) = self.tables.get_mut(&op.table) {
            let mut index = 0;
            data.rows.retain(|_| {
                let keep = !deleted.contains(&index);
                index += 1;
                keep
            });
        }

        Ok(Response::count(count))
    }

    /// Evaluates the join tree of `select`, one output row per combination
    /// of matching rows.
    fn select(&self, select: &Select) -> Vec<ValueRecord> {
        let mut combinations: Vec<Vec<Option<&Row>>> = self
            .rows_of(select.from)
            .iter()
            .filter(|row| select.filter.matches(|column| value(row, column)))
            .map(|row| vec![Some(row)])
            .collect();

        for join in &select.joins {
            let joined = self.rows_of(join.table);
            let mut next = vec![];

            for combination in combinations {
                let matches = match combination[join.parent] {
                    Some(parent) => joined
                        .iter()
                        .filter(|row| {
                            join.on.iter().all(|(parent_column, column)| {
                                let expected = value(parent, *parent_column);
                                !expected.is_null() && value(row, *column) == expected
                            })
                        })
                        .collect::<Vec<_>>(),
                    None => vec![],
                };

                if matches.is_empty() {
                    if join.kind == JoinKind::LeftOuter {
                        let mut combination = combination;
                        combination.push(None);
                        next.push(combination);
                    }
                    continue;
                }

                for row in matches {
                    let mut combination = combination.clone();
                    combination.push(Some(row));
                    next.push(combination);
                }
            }

            combinations = next;
        }

        combinations
            .iter()
            .map(|combination| {
                select
                    .projection
                    .iter()
                    .map(|projected| match &projected.expr {
                        ProjectionExpr::Column { node, column } => combination[*node]
                            .map(|row| value(row, *column).clone())
                            .unwrap_or_default(),
                        ProjectionExpr::Literal(value) => value.clone(),
                        ProjectionExpr::Null => Value::Null,
                    })
                    .collect::<Vec<_>>()
                    .into()
            })
            .collect()
    }

    fn rows_of(&self, table: TableId) -> &[Row] {
        self.tables
            .get(&table)
            .map(|data| &data.rows[..])
            .unwrap_or(&[])
    }

    fn check_references(
        &self,
        schema: &Schema,
        table: &Table,
        row: &Row,
        staged: &[Row],
    ) -> Result<()> {
        for foreign_key in &table.foreign_keys {
            let key = foreign_key
                .columns
                .iter()
                .map(|column| value(row, *column))
                .collect::<Vec<_>>();

            if key.iter().any(|value| value.is_null()) {
                continue;
            }

            let referenced = schema.table(foreign_key.references);
            let mut candidates = self.rows_of(referenced.id).iter().collect::<Vec<_>>();
            if referenced.id == table.id {
                candidates.extend(staged);
            }

            let found = candidates.iter().any(|candidate| {
                foreign_key
                    .referenced_columns
                    .iter()
                    .zip(&key)
                    .all(|(column, expected)| value(candidate, *column) == *expected)
            });

            if !found {
                return Err(ConstraintViolation::MissingReference {
                    table: table.name.clone(),
                    foreign_key: foreign_key.name.clone(),
                });
            }
        }

        Ok(())
    }
}

fn value(row: &Row, column: ColumnId) -> &Value {
    row.get(column.index).unwrap_or(&NULL)
}

fn primary_key(table: &Table, row: &Row) -> Vec<Value> {
    table
        .primary_key
        .columns
        .iter()
        .map(|column| value(row, *column).clone())
        .collect()
}

/// Checks nullability and types, widening 32-bit integers stored in 64-bit
/// columns.
fn normalize(table: &Table, row: &mut Row) -> Result<()> {
    for column in &table.columns {
        let slot = &mut row[column.id.index];

        if slot.is_null() {
            if !column.nullable {
                return Err(ConstraintViolation::NotNull {
                    table: table.name.clone(),
                    column: column.name.clone(),
                });
            }
            continue;
        }

        if !column.ty.accepts(slot) {
            return Err(ConstraintViolation::TypeMismatch {
                table: table.name.clone(),
                column: column.name.clone(),
                value: slot.clone(),
            });
        }

        if let (Type::I64, &Value::I32(v)) = (column.ty, &*slot) {
            *slot = Value::I64(v as i64);
        }
    }
    Ok(())
}

fn unknown(table: &Table, column: ColumnId) -> ConstraintViolation {
    ConstraintViolation::UnknownColumn {
        table: table.name.clone(),
        index: column.index,
    }
}
