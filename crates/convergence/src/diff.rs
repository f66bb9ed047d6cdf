//! Field-level diffs between observed and desired resource state

use serde::{Deserialize, Serialize};

/// A single field whose remote value differs from the local one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    /// Name of the field
    pub field: String,
    /// Value observed remotely (rendered)
    pub remote: String,
    /// Value declared locally (rendered)
    pub local: String,
}

impl FieldDiff {
    /// Render as `remote => local`
    pub fn line(&self) -> String {
        format!("{:?} => {:?}", self.remote, self.local)
    }
}

/// Collection of differing fields for one resource
///
/// Fields whose values match are dropped on insertion, so an empty diff
/// means the resource has converged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDiff {
    diffs: Vec<FieldDiff>,
}

impl AttributeDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare one field, recording it only when the values differ
    pub fn add<T: PartialEq + ToString + ?Sized>(&mut self, field: &str, remote: &T, local: &T) {
        if remote != local {
            self.diffs.push(FieldDiff {
                field: field.to_string(),
                remote: remote.to_string(),
                local: local.to_string(),
            });
        }
    }

    /// True when no field differs
    pub fn matches(&self) -> bool {
        self.diffs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDiff> {
        self.diffs.iter()
    }

    /// Indented description lines, suitable for an action description
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.diffs.len() * 2);
        for diff in &self.diffs {
            lines.push(format!("{}: ", diff.field));
            lines.push(format!("    {}", diff.line()));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_fields_are_dropped() {
        let mut diff = AttributeDiff::new();
        diff.add("cidr_block", "10.0.0.0/16", "10.0.0.0/16");
        diff.add("tenancy", &"default".to_string(), &"default".to_string());
        assert!(diff.matches());
        assert!(diff.lines().is_empty());
    }

    #[test]
    fn test_differing_fields_render_lines() {
        let mut diff = AttributeDiff::new();
        diff.add("cidr_block", "10.0.0.0/16", "10.1.0.0/16");
        diff.add("port", &5432, &5433);

        assert_eq!(diff.len(), 2);
        assert_eq!(
            diff.lines(),
            vec![
                "cidr_block: ".to_string(),
                "    \"10.0.0.0/16\" => \"10.1.0.0/16\"".to_string(),
                "port: ".to_string(),
                "    \"5432\" => \"5433\"".to_string(),
            ]
        );
    }
}
