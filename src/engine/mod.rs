//! Execution engines: how each language family is wrapped and run.

use crate::domain::{CodeBlock, GobbleMode, Settings};
use crate::error::{EngineError, EngineResult};
use crate::utils::json_hash;
use std::collections::BTreeMap;

pub mod script;
pub mod template;

pub use script::{assemble, CustomCode, LineIndex, Script};
pub use template::{builtin_templates, EngineTemplate};

/// Capability the build needs from the language layer.
pub trait EngineProvider: Send + Sync {
    fn template(&self, family: &str) -> EngineResult<&EngineTemplate>;

    /// Fingerprint of everything about the engine that affects execution.
    fn engine_hash(&self, family: &str) -> EngineResult<String> {
        Ok(json_hash(self.template(family)?))
    }

    fn assemble(
        &self,
        family: &str,
        blocks: &[CodeBlock],
        custom: &CustomCode,
        gobble: GobbleMode,
    ) -> EngineResult<Script> {
        Ok(script::assemble(self.template(family)?, blocks, custom, gobble))
    }
}

/// Family name -> template, seeded with the built-in engines.
#[derive(Debug, Clone, Default)]
pub struct EngineRegistry {
    templates: BTreeMap<String, EngineTemplate>,
}

impl EngineRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for (family, template) in builtin_templates() {
            registry.insert(family, template);
        }
        registry
    }

    /// Built-ins overlaid with the engines declared in settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut registry = Self::with_builtins();
        for (family, template) in &settings.engines {
            tracing::debug!("Registering configured engine for family '{}'", family);
            registry.insert(family.clone(), template.clone());
        }
        registry
    }

    pub fn insert(&mut self, family: impl Into<String>, template: EngineTemplate) {
        self.templates.insert(family.into(), template);
    }

    pub fn families(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

impl EngineProvider for EngineRegistry {
    fn template(&self, family: &str) -> EngineResult<&EngineTemplate> {
        self.templates.get(family).ok_or_else(|| EngineError::UnknownFamily(family.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_family_is_an_error() {
        let registry = EngineRegistry::with_builtins();
        let err = registry.engine_hash("cobol").expect_err("no cobol engine");
        assert!(matches!(err, EngineError::UnknownFamily(ref f) if f == "cobol"));
    }

    #[test]
    fn configured_engine_overrides_builtin_hash() {
        let builtin = EngineRegistry::with_builtins().engine_hash("sh").expect("sh");
        let mut settings = Settings::default();
        let mut custom = EngineRegistry::with_builtins().template("sh").expect("sh").clone();
        custom.header.push_str("set -e\n");
        settings.engines.insert("sh".to_string(), custom);
        let overridden = EngineRegistry::from_settings(&settings).engine_hash("sh").expect("sh");
        assert_ne!(builtin, overridden);
    }

    #[test]
    fn engine_hash_is_stable() {
        let registry = EngineRegistry::with_builtins();
        assert_eq!(registry.engine_hash("python").unwrap(), registry.engine_hash("python").unwrap());
        assert!(registry.families().any(|f| f == "pycon"));
    }
}
