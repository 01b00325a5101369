//! Assertion target resolution.

use crate::core::env::Environment;

/// Resolve the literal an output line must equal.
///
/// A target naming a bound variable resolves to that variable's value;
/// anything else is compared as written.
pub fn resolve_expected<'a>(target: &'a str, env: &'a Environment) -> &'a str {
    env.lookup(target).unwrap_or(target)
}
