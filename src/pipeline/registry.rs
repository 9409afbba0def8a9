//! Name to stage factory table

use std::sync::Arc;

use once_cell::sync::Lazy;

use super::filters;
use super::stage::Filter;

type FilterFactory = Arc<dyn Fn() -> Box<dyn Filter> + Send + Sync>;

static BUILTIN: Lazy<FilterRegistry> = Lazy::new(|| {
    let mut registry = FilterRegistry::new();
    filters::register_builtins(&mut registry);
    registry
});

/// Named, stateless description of a stage
#[derive(Clone)]
pub struct FilterDescriptor {
    name: String,
    factory: FilterFactory,
}

impl FilterDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fresh private state for one chain position
    pub fn instantiate(&self) -> Box<dyn Filter> {
        (self.factory)()
    }
}

impl std::fmt::Debug for FilterDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registry of the stages a chain spec may name.
///
/// Filled once, then only read. Duplicate names are not checked; the first
/// registration wins on lookup.
#[derive(Default, Clone)]
pub struct FilterRegistry {
    filters: Vec<FilterDescriptor>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in stages
    pub fn builtin() -> &'static FilterRegistry {
        &BUILTIN
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Filter> + Send + Sync + 'static,
    {
        self.filters.push(FilterDescriptor {
            name: name.into(),
            factory: Arc::new(factory),
        });
    }

    pub fn lookup(&self, name: &str) -> Option<&FilterDescriptor> {
        self.filters.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(|f| f.name())
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;

    #[test]
    fn test_builtin_names() {
        let names: Vec<&str> = FilterRegistry::builtin().names().collect();
        for expected in ["cap", "repeat", "av", "stat", "file", "pipe", "tcp"] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn test_first_registration_wins() {
        let mut registry = FilterRegistry::new();
        let recorder = Recorder::default();

        let first = recorder.clone();
        registry.register("x", move || first.source("first"));
        let second = recorder.clone();
        registry.register("x", move || second.source("second"));

        assert_eq!(registry.len(), 2);
        assert!(registry.lookup("y").is_none());

        let stage = registry.lookup("x").unwrap().instantiate();
        assert_eq!(stage.name(), "first");
    }
}
