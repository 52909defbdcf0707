#[derive(thiserror::Error, Debug)]
pub enum DefinitionErrorKind {
    #[error("A bean definition named `{name}` is already registered and overriding is disallowed")]
    Duplicate { name: String },
    #[error("The definition registry is frozen, cannot register or remove `{name}`")]
    Frozen { name: String },
    #[error("No bean definition named `{name}`")]
    Missing { name: String },
    #[error("Bean name must not be empty")]
    EmptyName,
}
