//! Per-resource diagnostics: how much of a chain was resolved at build time.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Category {
    Execution,
    Resource,
    Writer,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Execution, Category::Resource, Category::Writer];
}

/// One observation about a built resource, worth between 0 and 100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Diagnostic {
    ExecutionNonBlocking,
    ExecutionBlocking,
    ExecutionVirtualThread,
    ResourceSingleton,
    ResourcePerRequest,
    WriterNotRequired,
    WriterRunTime,
    /// A writer fixed at build time.
    WriterBuildTime(String),
    /// A writer fixed at build time that accepts every entity.
    WriterBuildTimeDirect(String),
    WriterBuildTimeMultiple(Vec<String>),
}

impl Diagnostic {
    #[must_use]
    pub fn score(&self) -> u32 {
        match self {
            Self::ExecutionNonBlocking
            | Self::ResourceSingleton
            | Self::WriterNotRequired
            | Self::WriterBuildTimeDirect(_) => 100,
            Self::WriterBuildTime(_) => 90,
            Self::ExecutionVirtualThread | Self::WriterBuildTimeMultiple(_) => 50,
            Self::ExecutionBlocking | Self::ResourcePerRequest | Self::WriterRunTime => 0,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionNonBlocking => f.write_str("runs on the calling thread"),
            Self::ExecutionBlocking => f.write_str("dispatched to the worker pool"),
            Self::ExecutionVirtualThread => f.write_str("dispatched to a virtual thread"),
            Self::ResourceSingleton => f.write_str("singleton instance"),
            Self::ResourcePerRequest => f.write_str("instance created per request"),
            Self::WriterNotRequired => f.write_str("no entity to write"),
            Self::WriterRunTime => f.write_str("writer chosen per request"),
            Self::WriterBuildTime(w) => write!(f, "writer fixed at build time: {w}"),
            Self::WriterBuildTimeDirect(w) => write!(f, "direct writer fixed at build time: {w}"),
            Self::WriterBuildTimeMultiple(ws) => write!(f, "writers fixed at build time: {}", ws.join(", ")),
        }
    }
}

/// Diagnostics collected while a resource chain was built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Score {
    entries: BTreeMap<Category, Vec<Diagnostic>>,
}

impl Score {
    pub fn add(&mut self, category: Category, diagnostic: Diagnostic) {
        self.entries.entry(category).or_default().push(diagnostic);
    }

    #[must_use]
    pub fn get(&self, category: Category) -> &[Diagnostic] {
        self.entries.get(&category).map_or(&[], Vec::as_slice)
    }

    /// Average over categories of each category's lowest diagnostic. Categories
    /// without diagnostics are left out.
    #[must_use]
    pub fn total(&self) -> u32 {
        let mins: Vec<u32> = self
            .entries
            .values()
            .filter_map(|ds| ds.iter().map(Diagnostic::score).min())
            .collect();
        if mins.is_empty() {
            return 100;
        }
        mins.iter().sum::<u32>() / mins.len() as u32
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/100", self.total())?;
        for (category, diagnostics) in &self.entries {
            for d in diagnostics {
                write!(f, "\n  {category:?}: {d} ({})", d.score())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_uses_worst_per_category() {
        let mut score = Score::default();
        assert_eq!(score.total(), 100);
        score.add(Category::Execution, Diagnostic::ExecutionNonBlocking);
        score.add(Category::Resource, Diagnostic::ResourcePerRequest);
        score.add(Category::Writer, Diagnostic::WriterBuildTime("json".into()));
        score.add(Category::Writer, Diagnostic::WriterBuildTimeDirect("json".into()));
        assert_eq!(score.total(), (100 + 0 + 90) / 3);
        assert_eq!(score.get(Category::Writer).len(), 2);
    }
}
