use ulid::Ulid;

/// Read-only lookup over the unit inventory, owned by an external property
/// catalog. The engine consumes ids from it for scoping and aggregate
/// universes; it never checks membership on writes, so the relationship is
/// advisory, not a referential-integrity constraint.
pub trait UnitCatalog: Send + Sync {
    /// Unit ids, optionally scoped to one property.
    fn list_units(&self, property_id: Option<Ulid>) -> Vec<Ulid>;
}

/// In-memory catalog for tests and for embedders that already hold the
/// unit list.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    units: Vec<(Ulid, Option<Ulid>)>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(mut self, unit_id: Ulid, property_id: Option<Ulid>) -> Self {
        self.units.push((unit_id, property_id));
        self
    }
}

impl UnitCatalog for StaticCatalog {
    fn list_units(&self, property_id: Option<Ulid>) -> Vec<Ulid> {
        self.units
            .iter()
            .filter(|(_, prop)| property_id.is_none() || *prop == property_id)
            .map(|(unit, _)| *unit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_all_units_unscoped() {
        let a = Ulid::new();
        let b = Ulid::new();
        let catalog = StaticCatalog::new()
            .with_unit(a, None)
            .with_unit(b, Some(Ulid::new()));

        let units = catalog.list_units(None);
        assert_eq!(units, vec![a, b]);
    }

    #[test]
    fn filters_by_property() {
        let prop = Ulid::new();
        let a = Ulid::new();
        let b = Ulid::new();
        let catalog = StaticCatalog::new()
            .with_unit(a, Some(prop))
            .with_unit(b, Some(Ulid::new()));

        assert_eq!(catalog.list_units(Some(prop)), vec![a]);
        assert!(catalog.list_units(Some(Ulid::new())).is_empty());
    }
}
