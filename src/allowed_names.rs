use std::path::Path;

use crate::{Error, Result, kubernetes::Annotation};

/// Default location of the allowed names file inside the controller's
/// container.
pub const DEFAULT_ALLOWED_NAMES_FILE_PATH: &str = "/AllowedNames";

/// # Allowed Names
///
/// The values a `Pki` may use for `.spec.serviceName`.
///
/// The file format is one name per line, ending in `\n` or `\r\n`. Empty lines
/// are skipped, everything else is kept verbatim so names are compared
/// byte-for-byte. A line that is not valid UTF-8 can never equal a
/// `.spec.serviceName` and is skipped with a warning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedNames(Vec<String>);

impl AllowedNames {
    #[must_use]
    pub fn parse(contents: impl AsRef<[u8]>) -> Self {
        Self(
            contents
                .as_ref()
                .split(|byte| *byte == b'\n')
                .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
                .filter(|line| !line.is_empty())
                .filter_map(|line| match std::str::from_utf8(line) {
                    Ok(name) => Some(name.to_string()),
                    Err(error) => {
                        tracing::warn!(
                            error =% error,
                            line =% String::from_utf8_lossy(line),
                            "skipping allowed name that is not valid utf-8"
                        );
                        None
                    }
                })
                .collect(),
        )
    }

    /// # Errors
    ///
    /// Will return `Err` if the file at `path` could not be read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        std::fs::read(path)
            .map(Self::parse)
            .map_err(Error::AllowedNames)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|allowed| allowed == name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl std::fmt::Display for AllowedNames {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.join(" "))
    }
}

impl Annotation for AllowedNames {
    const NAME: &'static str = "allowed-names";

    fn contents(&self) -> String {
        self.0.join("\n")
    }
}
