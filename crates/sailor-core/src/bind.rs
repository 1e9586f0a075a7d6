// ── Scope binding ──
//
// Consumers expose collections to their own state objects (view models,
// template contexts) through the `Scope` trait.

use std::collections::{BTreeMap, HashMap};

use crate::collection::Collection;
use crate::error::CoreError;
use crate::filter::Filter;

/// Something a collection can be assigned into under a property name.
pub trait Scope {
    fn assign(&mut self, property: &str, collection: Collection);
}

impl Scope for HashMap<String, Collection> {
    fn assign(&mut self, property: &str, collection: Collection) {
        self.insert(property.to_owned(), collection);
    }
}

impl Scope for BTreeMap<String, Collection> {
    fn assign(&mut self, property: &str, collection: Collection) {
        self.insert(property.to_owned(), collection);
    }
}

/// Property name used when none is given: the resource name plus "s".
pub fn default_property(name: &str) -> String {
    format!("{name}s")
}

impl Collection {
    /// Assign this collection, narrowed by `filter` when that adds
    /// anything, into `scope`. Returns the collection that was assigned.
    pub fn bind<S: Scope + ?Sized>(
        &self,
        scope: &mut S,
        property: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<Collection, CoreError> {
        let property = property.map_or_else(|| default_property(self.name()), str::to_owned);
        let target = match filter {
            Some(filter) if self.filter().merge(filter) != *self.filter() => self.find(filter)?,
            _ => self.clone(),
        };
        scope.assign(&property, target.clone());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_property_pluralizes_full_name() {
        assert_eq!(default_property("task"), "tasks");
        assert_eq!(default_property("admin/user"), "admin/users");
    }
}
