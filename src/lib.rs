#![warn(clippy::pedantic)]

pub mod allowed_names;
pub mod cli;
pub mod http_server;
pub mod kubernetes;
pub mod metrics;
pub mod otel;
pub mod pki;

/*
 * ============================================================================
 * Error
 * ============================================================================
 */
#[derive(Debug)]
pub enum Error {
    AllowedNames(std::io::Error),
    Kube(kube::Error),
    MissingObjectKey(&'static str),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::AllowedNames(e) => Some(e),
            Error::Kube(e) => Some(e),
            Error::MissingObjectKey(_) => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::AllowedNames(e) => write!(f, "could not read allowed names: {e}"),
            Error::Kube(e) => write!(f, "kubernetes: {e}"),
            Error::MissingObjectKey(key) => write!(f, "missing object key: {key}"),
        }
    }
}

/*
 * ============================================================================
 * Result
 * ============================================================================
 */
pub type Result<T, E = Error> = std::result::Result<T, E>;
