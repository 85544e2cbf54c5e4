use std::{
    fmt::{Display, Formatter, Result},
    ops::Deref,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNamespace(String);

impl Deref for ResourceNamespace {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ResourceNamespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ResourceNamespace {
    fn from(value: String) -> Self {
        Self(value)
    }
}
