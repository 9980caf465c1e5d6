use crate::{stmt::ValueRecord, Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub rows: Rows,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rows {
    /// Number of rows impacted by the operation
    Count(u64),

    /// Operation result, one record per row
    Values(Vec<ValueRecord>),
}

impl Response {
    pub fn count(count: u64) -> Self {
        Self {
            rows: Rows::Count(count),
        }
    }

    pub fn values(values: Vec<ValueRecord>) -> Self {
        Self {
            rows: Rows::Values(values),
        }
    }

    pub fn empty_values() -> Self {
        Self::values(vec![])
    }
}

impl Rows {
    pub fn is_count(&self) -> bool {
        matches!(self, Self::Count(_))
    }

    pub fn is_values(&self) -> bool {
        matches!(self, Self::Values(_))
    }

    pub fn into_count(self) -> Result<u64> {
        match self {
            Rows::Count(count) => Ok(count),
            Rows::Values(values) => Ok(values.len() as u64),
        }
    }

    pub fn into_values(self) -> Result<Vec<ValueRecord>> {
        match self {
            Self::Values(values) => Ok(values),
            Self::Count(_) => Err(Error::invalid_result("expected Values, got Count")),
        }
    }
}
