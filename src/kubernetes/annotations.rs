use std::{collections::BTreeMap, ops::Deref};

use super::Annotation;

#[derive(Debug, Default)]
pub struct Annotations(BTreeMap<String, String>);

impl Annotations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn add<A: Annotation>(mut self, annotation: &A) -> Self {
        let (key, value) = annotation.to_tuple();
        self.0.insert(key, value);
        self
    }
}

impl Deref for Annotations {
    type Target = BTreeMap<String, String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Annotations> for BTreeMap<String, String> {
    fn from(value: Annotations) -> Self {
        value.0
    }
}

impl From<&Annotations> for BTreeMap<String, String> {
    fn from(value: &Annotations) -> Self {
        value.0.clone()
    }
}
