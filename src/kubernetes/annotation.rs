use sha2::{Digest, Sha256};

use super::constants::BOX_COM;

/// A value whose hash is recorded as an annotation on generated resources,
/// so a change in the value is visible as a change in the resource.
pub trait Annotation {
    const NAME: &'static str;

    fn contents(&self) -> String;

    #[must_use]
    fn sha_256(&self) -> String {
        let mut sha = Sha256::new();
        sha.update(self.contents());
        format!("sha256:{:x}", sha.finalize())
    }

    #[must_use]
    fn to_tuple(&self) -> (String, String) {
        (format!("{BOX_COM}/{}-hash", Self::NAME), self.sha_256())
    }
}
