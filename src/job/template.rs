//! Template registry for reusable step fragments
//!
//! Fragments are named, immutable sequences of shell lines. A fragment may
//! include other fragments by name; inclusions are flattened on resolve
//! with a depth-first walk that tracks the in-progress chain, so a
//! self-referencing fragment fails with [`ConfigError::CyclicReference`]
//! instead of recursing forever.

use super::errors::ConfigError;
use std::collections::HashMap;

/// One line of a fragment body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentLine {
    /// A literal shell line
    Literal(String),
    /// Inclusion of another fragment by name
    Include(String),
}

impl FragmentLine {
    /// Creates a literal line
    pub fn literal(line: impl Into<String>) -> Self {
        Self::Literal(line.into())
    }

    /// Creates an inclusion
    pub fn include(name: impl Into<String>) -> Self {
        Self::Include(name.into())
    }
}

/// A named, reusable block of commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFragment {
    /// Fragment name
    pub name: String,
    /// Lines in declaration order
    pub lines: Vec<FragmentLine>,
}

/// Registry of step fragments
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    fragments: HashMap<String, StepFragment>,
    order: Vec<String>,
}

impl TemplateRegistry {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fragment.
    ///
    /// Inclusions may name fragments that are defined later; they are
    /// checked by [`resolve`](Self::resolve) and [`validate`](Self::validate).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateFragment`] if the name is taken.
    pub fn define(
        &mut self,
        name: impl Into<String>,
        lines: Vec<FragmentLine>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        if self.fragments.contains_key(&name) {
            return Err(ConfigError::DuplicateFragment { name });
        }

        tracing::debug!(fragment = %name, lines = lines.len(), "Defining fragment");
        self.order.push(name.clone());
        self.fragments
            .insert(name.clone(), StepFragment { name, lines });
        Ok(())
    }

    /// Resolves a fragment into its flattened shell lines.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownFragment`] if the fragment or any
    /// fragment it includes is missing, and [`ConfigError::CyclicReference`]
    /// if inclusion loops back on itself.
    pub fn resolve(&self, name: &str) -> Result<Vec<String>, ConfigError> {
        let mut out = Vec::new();
        let mut chain = Vec::new();
        self.resolve_into(name, &mut chain, &mut out)?;
        Ok(out)
    }

    fn resolve_into(
        &self,
        name: &str,
        chain: &mut Vec<String>,
        out: &mut Vec<String>,
    ) -> Result<(), ConfigError> {
        if let Some(pos) = chain.iter().position(|n| n == name) {
            let mut cycle = chain[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(ConfigError::CyclicReference { chain: cycle });
        }

        let fragment = self
            .fragments
            .get(name)
            .ok_or_else(|| ConfigError::UnknownFragment {
                name: name.to_string(),
            })?;

        chain.push(name.to_string());
        for line in &fragment.lines {
            match line {
                FragmentLine::Literal(text) => out.push(text.clone()),
                FragmentLine::Include(inner) => self.resolve_into(inner, chain, out)?,
            }
        }
        chain.pop();

        Ok(())
    }

    /// Resolves every fragment once so broken or cyclic inclusions surface
    /// at load time.
    ///
    /// # Errors
    ///
    /// Returns the first resolution error in definition order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in &self.order {
            self.resolve(name)?;
        }
        Ok(())
    }

    /// Returns the raw fragment
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StepFragment> {
        self.fragments.get(name)
    }

    /// Returns true if a fragment with this name exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fragments.contains_key(name)
    }

    /// Fragment names in definition order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Number of fragments
    #[must_use]
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Returns true if no fragments are defined
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}
