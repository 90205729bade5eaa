use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;

use crate::domain::{Entity, Value, XrefLayout};
use crate::error::XrefError;
use crate::mapping::Mapping;
use crate::resolver::{DynamicResolver, Resolution};

#[derive(Debug, Clone, Copy)]
pub struct SourceContext<'a> {
    pub entity: &'a Entity,
    pub own_id: &'a str,
    pub species_name: Option<&'a str>,
    pub database_name: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CategoryKey {
    #[default]
    Species,
    Database,
}

impl CategoryKey {
    pub fn pick<'a>(self, source: &SourceContext<'a>) -> Option<&'a str> {
        match self {
            CategoryKey::Species => source.species_name,
            CategoryKey::Database => source.database_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Database(String),
    Resolved(Resolution),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub raw: String,
    pub identifier: String,
    pub target: Target,
    pub extra: Vec<(String, Value)>,
}

impl Candidate {
    pub fn to_database(raw: &str, database: &str) -> Self {
        Self {
            raw: raw.to_string(),
            identifier: raw.to_string(),
            target: Target::Database(database.to_string()),
            extra: Vec::new(),
        }
    }
}

pub trait SpeciesFilterable: Send + Sync {
    fn accepts_species(&self, species_name: Option<&str>) -> bool;
}

pub trait ReferenceStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn layout(&self) -> &XrefLayout;

    fn is_mapped(&self, source: &SourceContext<'_>, mapping: &Mapping) -> bool;

    fn candidates(&self, source: &SourceContext<'_>, mapping: &Mapping) -> Vec<Candidate>;

    fn species_filter(&self) -> Option<&dyn SpeciesFilterable> {
        None
    }

    fn dependents(&self) -> &[String] {
        &[]
    }

    fn resolver(&self) -> Option<&DynamicResolver> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct DirectStrategy {
    name: String,
    database: String,
    layout: XrefLayout,
    category: CategoryKey,
    dependents: Vec<String>,
}

impl DirectStrategy {
    pub fn new(name: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database: database.into(),
            layout: XrefLayout::default(),
            category: CategoryKey::default(),
            dependents: Vec::new(),
        }
    }

    pub fn layout_as(mut self, layout: XrefLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn keyed_by(mut self, category: CategoryKey) -> Self {
        self.category = category;
        self
    }

    pub fn with_dependents<I, S>(mut self, databases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependents = databases.into_iter().map(Into::into).collect();
        self
    }
}

impl ReferenceStrategy for DirectStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn layout(&self) -> &XrefLayout {
        &self.layout
    }

    fn is_mapped(&self, source: &SourceContext<'_>, mapping: &Mapping) -> bool {
        mapping.contains(source.own_id, self.category.pick(source))
    }

    fn candidates(&self, source: &SourceContext<'_>, mapping: &Mapping) -> Vec<Candidate> {
        mapping
            .candidates(source.own_id, self.category.pick(source))
            .iter()
            .map(|value| Candidate::to_database(value, &self.database))
            .collect()
    }

    fn dependents(&self) -> &[String] {
        &self.dependents
    }
}

pub struct SpeciesRestricted<S> {
    inner: S,
    species: Vec<String>,
}

impl<S: ReferenceStrategy> SpeciesRestricted<S> {
    pub fn new<I, N>(inner: S, species: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            inner,
            species: species.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: ReferenceStrategy> SpeciesFilterable for SpeciesRestricted<S> {
    fn accepts_species(&self, species_name: Option<&str>) -> bool {
        species_name.is_some_and(|name| self.species.iter().any(|allowed| allowed == name))
    }
}

impl<S: ReferenceStrategy> ReferenceStrategy for SpeciesRestricted<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn layout(&self) -> &XrefLayout {
        self.inner.layout()
    }

    fn is_mapped(&self, source: &SourceContext<'_>, mapping: &Mapping) -> bool {
        self.inner.is_mapped(source, mapping)
    }

    fn candidates(&self, source: &SourceContext<'_>, mapping: &Mapping) -> Vec<Candidate> {
        self.inner.candidates(source, mapping)
    }

    fn species_filter(&self) -> Option<&dyn SpeciesFilterable> {
        Some(self)
    }

    fn dependents(&self) -> &[String] {
        self.inner.dependents()
    }

    fn resolver(&self) -> Option<&DynamicResolver> {
        self.inner.resolver()
    }
}

#[derive(Debug, Clone)]
pub struct PatternBranchStrategy {
    name: String,
    pattern: Regex,
    matched: String,
    unmatched: String,
    layout: XrefLayout,
}

impl PatternBranchStrategy {
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        matched: impl Into<String>,
        unmatched: impl Into<String>,
    ) -> Result<Self, XrefError> {
        let pattern = Regex::new(pattern)
            .map_err(|err| XrefError::InvalidPattern(format!("{pattern}: {err}")))?;
        Ok(Self {
            name: name.into(),
            pattern,
            matched: matched.into(),
            unmatched: unmatched.into(),
            layout: XrefLayout::default(),
        })
    }

    pub fn layout_as(mut self, layout: XrefLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn database_for(&self, identifier: &str) -> &str {
        if self.pattern.is_match(identifier) {
            &self.matched
        } else {
            &self.unmatched
        }
    }
}

impl ReferenceStrategy for PatternBranchStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn layout(&self) -> &XrefLayout {
        &self.layout
    }

    fn is_mapped(&self, source: &SourceContext<'_>, mapping: &Mapping) -> bool {
        mapping.contains(source.own_id, source.species_name)
    }

    fn candidates(&self, source: &SourceContext<'_>, mapping: &Mapping) -> Vec<Candidate> {
        mapping
            .candidates(source.own_id, source.species_name)
            .iter()
            .map(|value| Candidate::to_database(value, self.database_for(value)))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ChainedStrategy {
    name: String,
    database: String,
    layout: XrefLayout,
    second_hop: Mapping,
}

impl ChainedStrategy {
    pub fn new(name: impl Into<String>, database: impl Into<String>, second_hop: Mapping) -> Self {
        Self {
            name: name.into(),
            database: database.into(),
            layout: XrefLayout::default(),
            second_hop,
        }
    }

    pub fn layout_as(mut self, layout: XrefLayout) -> Self {
        self.layout = layout;
        self
    }
}

impl ReferenceStrategy for ChainedStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn layout(&self) -> &XrefLayout {
        &self.layout
    }

    fn is_mapped(&self, source: &SourceContext<'_>, mapping: &Mapping) -> bool {
        !self.candidates(source, mapping).is_empty()
    }

    fn candidates(&self, source: &SourceContext<'_>, mapping: &Mapping) -> Vec<Candidate> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for intermediate in mapping.candidates(source.own_id, source.species_name) {
            for target in self
                .second_hop
                .candidates(&intermediate, source.species_name)
            {
                if seen.insert(target.clone()) {
                    found.push(Candidate::to_database(&target, &self.database));
                }
            }
        }
        found
    }
}

pub struct PrefixedStrategy {
    name: String,
    layout: XrefLayout,
    resolver: Arc<DynamicResolver>,
}

impl PrefixedStrategy {
    pub fn new(name: impl Into<String>, resolver: Arc<DynamicResolver>) -> Self {
        Self {
            name: name.into(),
            layout: XrefLayout::default(),
            resolver,
        }
    }

    pub fn layout_as(mut self, layout: XrefLayout) -> Self {
        self.layout = layout;
        self
    }
}

impl ReferenceStrategy for PrefixedStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn layout(&self) -> &XrefLayout {
        &self.layout
    }

    fn is_mapped(&self, source: &SourceContext<'_>, mapping: &Mapping) -> bool {
        mapping.contains(source.own_id, source.species_name)
    }

    fn candidates(&self, source: &SourceContext<'_>, mapping: &Mapping) -> Vec<Candidate> {
        mapping
            .candidates(source.own_id, source.species_name)
            .into_iter()
            .map(|raw| {
                let resolution = self.resolver.peek(&raw);
                Candidate {
                    identifier: resolution.identifier().to_string(),
                    raw,
                    target: Target::Resolved(resolution),
                    extra: Vec::new(),
                }
            })
            .collect()
    }

    fn resolver(&self) -> Option<&DynamicResolver> {
        Some(self.resolver.as_ref())
    }
}
