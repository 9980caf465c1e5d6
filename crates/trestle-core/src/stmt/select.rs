use super::{Filter, Value};
use crate::schema::db::{ColumnId, TableId};

/// A select over a root table and a tree of joined tables.
///
/// Nodes are numbered in declaration order: node `0` is the root table and
/// node `i` is `joins[i - 1]`. A join may only refer to a node declared
/// before it. The filter applies to the root table's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub from: TableId,
    pub joins: Vec<Join>,
    pub projection: Vec<Projected>,
    pub filter: Filter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Node this join hangs off.
    pub parent: usize,

    pub table: TableId,

    pub kind: JoinKind,

    /// Pairs of `(parent column, joined column)` compared for equality.
    pub on: Vec<(ColumnId, ColumnId)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

/// One projected field, addressed positionally in the returned rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Projected {
    pub alias: String,
    pub expr: ProjectionExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionExpr {
    /// A column of the table bound to `node`.
    Column { node: usize, column: ColumnId },

    /// A constant, used for discriminators in unions.
    Literal(Value),

    /// A null placeholder keeping union branches aligned.
    Null,
}

impl Select {
    pub fn new(from: TableId) -> Select {
        Select {
            from,
            joins: vec![],
            projection: vec![],
            filter: Filter::all(),
        }
    }

    /// Appends a join and returns the node number it is bound to.
    pub fn join(
        &mut self,
        parent: usize,
        table: TableId,
        kind: JoinKind,
        on: Vec<(ColumnId, ColumnId)>,
    ) -> usize {
        debug_assert!(parent <= self.joins.len());
        self.joins.push(Join {
            parent,
            table,
            kind,
            on,
        });
        self.joins.len()
    }

    /// Appends a projected field and returns its position in the row.
    pub fn project(&mut self, alias: impl Into<String>, expr: ProjectionExpr) -> usize {
        self.projection.push(Projected {
            alias: alias.into(),
            expr,
        });
        self.projection.len() - 1
    }

    /// Returns the table bound to `node`.
    pub fn node_table(&self, node: usize) -> TableId {
        match node {
            0 => self.from,
            _ => self.joins[node - 1].table,
        }
    }
}
