use std::collections::BTreeMap;

/// Whether every field set on a desired object is already present, with the
/// same value, on the live object. Fields populated by the API server only
/// appear on the superset and are ignored.
pub trait Subset {
    fn is_subset(&self, superset: &Self) -> bool;
}

impl<V: PartialEq> Subset for BTreeMap<String, V> {
    fn is_subset(&self, superset: &Self) -> bool {
        self.iter()
            .all(|(key, value)| Some(value) == superset.get(key))
    }
}

impl<V: PartialEq> Subset for Option<BTreeMap<String, V>> {
    fn is_subset(&self, superset: &Self) -> bool {
        match (self, superset) {
            (None, _) => true,
            (Some(data), None) => data.is_empty(),
            (Some(subset), Some(superset)) => subset.is_subset(superset),
        }
    }
}

impl Subset for kube::core::ObjectMeta {
    fn is_subset(&self, superset: &Self) -> bool {
        self.annotations.is_subset(&superset.annotations)
            && self.labels.is_subset(&superset.labels)
            && self.name == superset.name
            && self.owner_references == superset.owner_references
    }
}
