//! Known collections.
//!
//! The catalog fixes, per collection name, its shape, the seed written the
//! first time the collection is touched, and whether it should live in
//! SQLite when the engine is available.

use serde_json::{json, Value};

use crate::record::{CollectionData, Shape};

/// Static description of one collection.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub name: String,
    pub shape: Shape,
    seed: Value,
    pub prefers_sqlite: bool,
}

impl CollectionSpec {
    /// Empty list collection.
    pub fn list(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: Shape::List,
            seed: Value::Array(Vec::new()),
            prefers_sqlite: false,
        }
    }

    /// Empty map collection.
    pub fn map(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: Shape::Map,
            seed: Value::Object(serde_json::Map::new()),
            prefers_sqlite: false,
        }
    }

    /// Replace the seed. A seed of the wrong shape is ignored at load time.
    #[must_use]
    pub fn seeded(mut self, seed: Value) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn in_sqlite(mut self) -> Self {
        self.prefers_sqlite = true;
        self
    }

    /// File name under the data directory.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.name)
    }

    /// Seed contents; falls back to empty when the seed has the wrong shape.
    pub fn seed(&self) -> CollectionData {
        CollectionData::from_value(self.shape, self.seed.clone())
            .unwrap_or_else(|_| CollectionData::empty(self.shape))
    }
}

/// The set of collections a registry serves.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    specs: Vec<CollectionSpec>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collection; a later spec with the same name replaces the earlier.
    #[must_use]
    pub fn with(mut self, spec: CollectionSpec) -> Self {
        self.specs.retain(|s| s.name != spec.name);
        self.specs.push(spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&CollectionSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectionSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// The storefront's collections.
    pub fn storefront() -> Self {
        Self::new()
            .with(CollectionSpec::list("users").in_sqlite())
            .with(CollectionSpec::list("sessions").in_sqlite())
            .with(CollectionSpec::list("contacts").in_sqlite())
            .with(CollectionSpec::list("orders").in_sqlite())
            .with(CollectionSpec::list("products").seeded(demo_products()))
            .with(CollectionSpec::list("slides"))
            .with(CollectionSpec::list("reviews"))
            .with(CollectionSpec::list("coupons"))
            .with(CollectionSpec::list("traffic"))
            .with(CollectionSpec::list("deletedUsers"))
            .with(CollectionSpec::map("carts"))
            .with(CollectionSpec::map("wishlists"))
            .with(
                CollectionSpec::map("adminSettings")
                    .seeded(json!({ "siteName": "BLACKONN", "maintenance": false })),
            )
    }
}

fn demo_products() -> Value {
    json!([
        {
            "id": "prod-001",
            "name": "Classic Black Tee",
            "category": "t-shirts",
            "price": 799,
            "stock": 120,
            "sizes": ["S", "M", "L", "XL"],
            "active": true
        },
        {
            "id": "prod-002",
            "name": "Oversized Drop Shoulder Tee",
            "category": "t-shirts",
            "price": 999,
            "stock": 80,
            "sizes": ["M", "L", "XL"],
            "active": true
        },
        {
            "id": "prod-003",
            "name": "Heavyweight Hoodie",
            "category": "hoodies",
            "price": 1899,
            "stock": 45,
            "sizes": ["S", "M", "L", "XL"],
            "active": true
        },
        {
            "id": "prod-004",
            "name": "Cargo Joggers",
            "category": "bottoms",
            "price": 1499,
            "stock": 60,
            "sizes": ["28", "30", "32", "34"],
            "active": true
        },
        {
            "id": "prod-005",
            "name": "Logo Cap",
            "category": "accessories",
            "price": 499,
            "stock": 200,
            "sizes": ["FREE"],
            "active": true
        },
        {
            "id": "prod-006",
            "name": "Zip-Up Bomber Jacket",
            "category": "jackets",
            "price": 2999,
            "stock": 25,
            "sizes": ["M", "L", "XL"],
            "active": true
        }
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storefront_catalog() {
        let catalog = Catalog::storefront();
        assert_eq!(catalog.len(), 13);

        let sqlite: Vec<_> = catalog
            .iter()
            .filter(|s| s.prefers_sqlite)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(sqlite, ["users", "sessions", "contacts", "orders"]);

        assert_eq!(catalog.get("carts").unwrap().shape, Shape::Map);
        assert_eq!(catalog.get("products").unwrap().seed().len(), 6);
    }

    #[test]
    fn test_admin_settings_seed() {
        let seed = Catalog::storefront().get("adminSettings").unwrap().seed();
        assert_eq!(
            seed.to_value(),
            json!({ "siteName": "BLACKONN", "maintenance": false })
        );
    }

    #[test]
    fn test_wrong_shape_seed_falls_back_to_empty() {
        let spec = CollectionSpec::list("odd").seeded(json!({ "not": "a list" }));
        assert!(spec.seed().is_empty());
        assert_eq!(spec.file_name(), "odd.json");
    }

    #[test]
    fn test_later_spec_replaces_earlier() {
        let catalog = Catalog::new()
            .with(CollectionSpec::list("x"))
            .with(CollectionSpec::map("x"));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("x").unwrap().shape, Shape::Map);
    }
}
