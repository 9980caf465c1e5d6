#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    /// When true, one insert operation may carry many rows.
    pub batch_writes: bool,

    /// When true, the store rejects rows whose foreign keys do not resolve
    /// and deletes of rows still referenced.
    pub enforces_foreign_keys: bool,
}

impl Capability {
    /// A store with relational integrity and multi-row inserts.
    pub const RELATIONAL: Self = Self {
        batch_writes: true,
        enforces_foreign_keys: true,
    };

    /// A store writing one row per operation without integrity checks.
    pub const MINIMAL: Self = Self {
        batch_writes: false,
        enforces_foreign_keys: false,
    };
}

impl Default for Capability {
    fn default() -> Self {
        Self::RELATIONAL
    }
}
