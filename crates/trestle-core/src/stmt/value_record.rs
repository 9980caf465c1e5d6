use super::*;

use std::ops;

/// One row returned by a driver, positionally aligned with the projection
/// of the statement that produced it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValueRecord {
    pub fields: Vec<Value>,
}

impl ValueRecord {
    pub fn from_vec(fields: Vec<Value>) -> Self {
        Self { fields }
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.fields
    }
}

impl ops::Deref for ValueRecord {
    type Target = [Value];

    fn deref(&self) -> &Self::Target {
        &self.fields[..]
    }
}

impl ops::DerefMut for ValueRecord {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.fields[..]
    }
}

impl<'a> IntoIterator for &'a ValueRecord {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl From<Vec<Value>> for ValueRecord {
    fn from(fields: Vec<Value>) -> Self {
        Self { fields }
    }
}
