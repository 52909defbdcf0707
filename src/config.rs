/// Config for a bean factory
/// ## Fields
/// - `allow_circular_references`:
///   If `true`, singletons in creation are exposed early so that reference
///   cycles between them can be resolved.
///
///   Cycles between prototypes are never resolvable and fail regardless of
///   this flag.
/// - `allow_definition_overriding`:
///   If `true`, registering a definition under an occupied name replaces the
///   previous definition instead of failing.
/// - `allow_alias_overriding`:
///   If `true`, registering an alias that is already bound rebinds it to the
///   new target instead of failing.
#[derive(Clone, Copy)]
pub struct FactoryConfig {
    pub allow_circular_references: bool,
    pub allow_definition_overriding: bool,
    pub allow_alias_overriding: bool,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            allow_circular_references: true,
            allow_definition_overriding: false,
            allow_alias_overriding: true,
        }
    }
}
