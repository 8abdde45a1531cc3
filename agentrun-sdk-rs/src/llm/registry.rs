use crate::error::{AgentError, Result};
use crate::llm::BaseLlm;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a model client for a concrete model name.
pub type LlmFactory = Arc<dyn Fn(&str) -> Arc<dyn BaseLlm> + Send + Sync>;

struct Registration {
    pattern: String,
    regex: Regex,
    factory: LlmFactory,
}

/// Maps model names to client factories by regular expression.
///
/// Resolutions are cached by model name and the cache is never invalidated by
/// later registrations: once `"gemini-1.5-pro"` has resolved, registering a
/// more specific pattern for it has no effect until [`LlmRegistry::clear_cache`].
#[derive(Default)]
pub struct LlmRegistry {
    registrations: RwLock<Vec<Registration>>,
    cache: RwLock<HashMap<String, LlmFactory>>,
}

impl LlmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates every pattern with `factory`.
    ///
    /// Patterns are matched against the whole model name. An already known
    /// pattern keeps its position and gets the new factory. If any pattern
    /// fails to compile nothing is registered.
    pub fn register<I, S>(&self, factory: LlmFactory, patterns: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let compiled = patterns
            .into_iter()
            .map(|p| {
                let pattern = p.into();
                Regex::new(&format!("^(?:{})$", pattern))
                    .map(|regex| (pattern.clone(), regex))
                    .map_err(|source| AgentError::InvalidModelPattern { pattern, source })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut registrations = self.registrations.write();
        for (pattern, regex) in compiled {
            if let Some(existing) = registrations.iter_mut().find(|r| r.pattern == pattern) {
                tracing::info!("Updating LLM class for {}", pattern);
                existing.factory = Arc::clone(&factory);
                continue;
            }
            registrations.push(Registration {
                pattern,
                regex,
                factory: Arc::clone(&factory),
            });
        }
        Ok(())
    }

    /// Finds the factory for `model`: the cache first, then the first pattern
    /// in registration order that matches.
    pub fn resolve(&self, model: &str) -> Result<LlmFactory> {
        if let Some(factory) = self.cache.read().get(model) {
            return Ok(Arc::clone(factory));
        }

        let factory = self
            .registrations
            .read()
            .iter()
            .find(|r| r.regex.is_match(model))
            .map(|r| Arc::clone(&r.factory))
            .ok_or_else(|| AgentError::ModelNotFound(model.to_string()))?;

        tracing::debug!("Resolved model {}", model);
        self.cache
            .write()
            .insert(model.to_string(), Arc::clone(&factory));
        Ok(factory)
    }

    pub fn new_llm(&self, model: &str) -> Result<Arc<dyn BaseLlm>> {
        let factory = self.resolve(model)?;
        Ok(factory(model))
    }

    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    pub fn patterns(&self) -> Vec<String> {
        self.registrations
            .read()
            .iter()
            .map(|r| r.pattern.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmRequest, LlmResponseStream};

    struct NamedLlm {
        model: String,
    }

    impl BaseLlm for NamedLlm {
        fn model(&self) -> &str {
            &self.model
        }

        fn generate_content(&self, _request: LlmRequest, _stream: bool) -> LlmResponseStream {
            Box::pin(futures::stream::empty())
        }
    }

    fn factory() -> LlmFactory {
        Arc::new(|model: &str| {
            Arc::new(NamedLlm {
                model: model.to_string(),
            }) as Arc<dyn BaseLlm>
        })
    }

    #[test]
    fn test_resolve_matches_whole_name() {
        let registry = LlmRegistry::new();
        let gemini = factory();
        registry.register(Arc::clone(&gemini), ["gemini-.*"]).unwrap();

        let resolved = registry.resolve("gemini-1.5-pro").unwrap();
        assert!(Arc::ptr_eq(&resolved, &gemini));

        let err = registry.resolve("my-gemini-1.5-pro").err().unwrap();
        assert!(matches!(err, AgentError::ModelNotFound(m) if m == "my-gemini-1.5-pro"));
    }

    #[test]
    fn test_first_registered_pattern_wins() {
        let registry = LlmRegistry::new();
        let broad = factory();
        let narrow = factory();
        registry.register(Arc::clone(&broad), ["claude-.*"]).unwrap();
        registry.register(Arc::clone(&narrow), ["claude-3-opus"]).unwrap();

        assert!(Arc::ptr_eq(&registry.resolve("claude-3-opus").unwrap(), &broad));
    }

    #[test]
    fn test_cached_resolution_survives_new_registration() {
        let registry = LlmRegistry::new();
        let factory_a = factory();
        let factory_b = factory();

        registry.register(Arc::clone(&factory_a), ["gemini-.*"]).unwrap();
        let before = registry.resolve("gemini-1.5-pro").unwrap();
        assert!(Arc::ptr_eq(&before, &factory_a));

        registry.register(Arc::clone(&factory_b), ["gemini-1.5-pro"]).unwrap();
        let after = registry.resolve("gemini-1.5-pro").unwrap();
        assert!(Arc::ptr_eq(&after, &factory_a));

        registry.clear_cache();
        let fresh = registry.resolve("gemini-1.5-pro").unwrap();
        assert!(Arc::ptr_eq(&fresh, &factory_a));
    }

    #[test]
    fn test_reregistering_pattern_replaces_factory_in_place() {
        let registry = LlmRegistry::new();
        let old = factory();
        let new = factory();
        registry.register(Arc::clone(&old), ["gpt-.*", "o1"]).unwrap();
        registry.register(Arc::clone(&new), ["gpt-.*"]).unwrap();

        assert_eq!(registry.patterns(), vec!["gpt-.*".to_string(), "o1".to_string()]);
        assert!(Arc::ptr_eq(&registry.resolve("gpt-4o").unwrap(), &new));
        assert!(Arc::ptr_eq(&registry.resolve("o1").unwrap(), &old));
    }

    #[test]
    fn test_invalid_pattern_registers_nothing() {
        let registry = LlmRegistry::new();
        let err = registry.register(factory(), ["ok-.*", "bad-("]).unwrap_err();
        assert!(matches!(err, AgentError::InvalidModelPattern { ref pattern, .. } if pattern == "bad-("));
        assert!(registry.patterns().is_empty());
    }

    #[test]
    fn test_new_llm_passes_model_name() {
        let registry = LlmRegistry::new();
        registry.register(factory(), ["gemini-.*"]).unwrap();
        let llm = registry.new_llm("gemini-2.0-flash").unwrap();
        assert_eq!(llm.model(), "gemini-2.0-flash");
    }
}
