use thiserror::Error;

/// Errors surfaced by table operations and typed accessors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// An extensible key's concrete type has no hash dispatcher in the registry.
    #[error("no hash function registered for type `{type_name}`")]
    UnregisteredHashType { type_name: &'static str },

    /// A stored value or key payload was unpacked as the wrong static type.
    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, TableError>;
