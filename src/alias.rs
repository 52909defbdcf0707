use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::errors::AliasErrorKind;

/// Bidirectional mapping between alternate bean names and canonical names.
///
/// Alias chains form a DAG: following `alias -> name` links always terminates
/// at a non-alias, which makes [`Self::canonical_name`] deterministic.
///
/// Mutations serialize on the write lock; reads observe a consistent snapshot.
pub struct AliasRegistry {
    allow_overriding: bool,
    /// Map from alias to canonical-ward name.
    aliases: RwLock<BTreeMap<String, String>>,
}

impl Default for AliasRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AliasRegistry {
    #[must_use]
    pub fn new(allow_overriding: bool) -> Self {
        Self {
            allow_overriding,
            aliases: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers `alias` for `name`.
    ///
    /// Registering a name as an alias for itself removes the existing binding
    /// and succeeds as a no-op.
    ///
    /// # Errors
    /// - [`AliasErrorKind::AlreadyBound`] if the alias points to another name
    ///   and overriding is disallowed
    /// - [`AliasErrorKind::CircularReference`] if the registration would close
    ///   an alias cycle
    pub fn register_alias(&self, name: &str, alias: &str) -> Result<(), AliasErrorKind> {
        if name.is_empty() || alias.is_empty() {
            return Err(AliasErrorKind::EmptyAlias);
        }

        let mut aliases = self.aliases.write();
        if alias == name {
            if aliases.remove(alias).is_some() {
                debug!(alias, "Alias removed: identical to bean name");
            }
            return Ok(());
        }
        if let Some(existing) = aliases.get(alias) {
            if existing == name {
                return Ok(());
            }
            if !self.allow_overriding {
                return Err(AliasErrorKind::AlreadyBound {
                    name: name.into(),
                    alias: alias.into(),
                    existing: existing.clone(),
                });
            }
            debug!(alias, old = %existing, new = %name, "Overriding alias registration");
        }
        Self::check_for_alias_circle(&aliases, name, alias)?;
        aliases.insert(alias.into(), name.into());
        debug!(alias, name, "Alias registered");
        Ok(())
    }

    /// # Errors
    /// Returns [`AliasErrorKind::NotRegistered`] if the alias is unknown.
    pub fn remove_alias(&self, alias: &str) -> Result<(), AliasErrorKind> {
        if self.aliases.write().remove(alias).is_none() {
            return Err(AliasErrorKind::NotRegistered { alias: alias.into() });
        }
        Ok(())
    }

    #[must_use]
    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.read().contains_key(name)
    }

    /// Returns every name whose transitive resolution ends at `name`.
    #[must_use]
    pub fn aliases_of(&self, name: &str) -> Vec<String> {
        let aliases = self.aliases.read();
        let mut result = Vec::new();
        Self::retrieve_aliases(&aliases, name, &mut result);
        result
    }

    /// Determines whether `alias` transitively resolves to `name`.
    #[must_use]
    pub fn has_alias(&self, name: &str, alias: &str) -> bool {
        Self::has_alias_in(&self.aliases.read(), name, alias)
    }

    /// Follows the alias chain until a non-alias is reached.
    #[must_use]
    pub fn canonical_name(&self, name: &str) -> String {
        let aliases = self.aliases.read();
        let mut canonical = name;
        while let Some(resolved) = aliases.get(canonical) {
            canonical = resolved;
        }
        canonical.into()
    }

    /// Applies `resolver` to every alias and target in the registry.
    ///
    /// An entry whose transformed alias equals its transformed target is
    /// dropped, as is a duplicate of an existing equivalent entry. A
    /// transformed alias that collides with an entry bound to a different
    /// target is a hard failure, to avoid silent shadowing.
    ///
    /// # Errors
    /// - [`AliasErrorKind::ResolutionConflict`] on a colliding transformation
    /// - [`AliasErrorKind::CircularReference`] if a transformation would close
    ///   an alias cycle
    pub fn resolve_aliases(&self, resolver: &dyn Fn(&str) -> String) -> Result<(), AliasErrorKind> {
        let mut aliases = self.aliases.write();
        let snapshot = aliases.clone();
        for (alias, registered_name) in snapshot {
            let resolved_alias = resolver(&alias);
            let resolved_name = resolver(&registered_name);
            if resolved_alias.is_empty() || resolved_name.is_empty() || resolved_alias == resolved_name {
                aliases.remove(&alias);
                debug!(alias = %alias, "Alias dropped during resolution");
                continue;
            }
            if resolved_alias != alias {
                if let Some(existing) = aliases.get(&resolved_alias) {
                    if *existing == resolved_name {
                        // The resolved entry already exists, the original is redundant.
                        aliases.remove(&alias);
                        continue;
                    }
                    return Err(AliasErrorKind::ResolutionConflict {
                        original: alias,
                        alias: resolved_alias,
                        name: resolved_name,
                        existing: existing.clone(),
                    });
                }
                Self::check_for_alias_circle(&aliases, &resolved_name, &resolved_alias)?;
                aliases.remove(&alias);
                aliases.insert(resolved_alias, resolved_name);
            } else if resolved_name != registered_name {
                aliases.insert(alias, resolved_name);
            }
        }
        Ok(())
    }

    fn retrieve_aliases(aliases: &BTreeMap<String, String>, name: &str, result: &mut Vec<String>) {
        for (alias, registered) in aliases {
            if registered == name {
                result.push(alias.clone());
                Self::retrieve_aliases(aliases, alias, result);
            }
        }
    }

    fn has_alias_in(aliases: &BTreeMap<String, String>, name: &str, alias: &str) -> bool {
        match aliases.get(alias) {
            Some(registered) => registered == name || Self::has_alias_in(aliases, name, registered),
            None => false,
        }
    }

    fn check_for_alias_circle(
        aliases: &BTreeMap<String, String>,
        name: &str,
        alias: &str,
    ) -> Result<(), AliasErrorKind> {
        if Self::has_alias_in(aliases, alias, name) {
            return Err(AliasErrorKind::CircularReference {
                name: name.into(),
                alias: alias.into(),
            });
        }
        Ok(())
    }
}
