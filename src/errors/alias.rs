#[derive(thiserror::Error, Debug)]
pub enum AliasErrorKind {
    #[error(
        "Cannot register alias `{alias}` for name `{name}`: \
         circular reference - `{name}` is a direct or indirect alias for `{alias}` already"
    )]
    CircularReference { name: String, alias: String },
    #[error("Cannot define alias `{alias}` for name `{name}`: it is already registered for name `{existing}`")]
    AlreadyBound {
        name: String,
        alias: String,
        existing: String,
    },
    #[error("No alias `{alias}` registered")]
    NotRegistered { alias: String },
    #[error(
        "Cannot register resolved alias `{alias}` (original `{original}`) for name `{name}`: \
         it is already registered for name `{existing}`"
    )]
    ResolutionConflict {
        original: String,
        alias: String,
        name: String,
        existing: String,
    },
    #[error("Alias must not be empty")]
    EmptyAlias,
}
