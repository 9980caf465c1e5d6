/// How writes on an owner propagate through a relation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CascadeMode {
    /// Insert and update targets with the owner. Deleting the owner only
    /// cuts the link.
    #[default]
    All,

    /// Like [`CascadeMode::All`], and targets that stop being reachable
    /// from the owner are deleted.
    AllOrphanRemoval,

    /// Targets are never written. A source-owned link column is still
    /// kept consistent.
    ReadOnly,

    /// Only association-table rows are written. Requires an association
    /// table.
    AssociationOnly,
}

impl CascadeMode {
    pub fn writes_targets(self) -> bool {
        matches!(self, CascadeMode::All | CascadeMode::AllOrphanRemoval)
    }

    pub fn removes_orphans(self) -> bool {
        matches!(self, CascadeMode::AllOrphanRemoval)
    }
}
