//! Addresses into nested types.
//!
//! A `Path` is a labelled tree. The label of the outermost node names the
//! position the path starts from and is ignored during resolution; each
//! sub-path is one step further down. A node with several sub-paths
//! branches, e.g. into several members of a union.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Path {
    label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sub_paths: Vec<Path>,
}

impl Path {
    /// The empty path: addresses the value it is resolved against.
    pub fn root() -> Self {
        Self {
            label: String::new(),
            sub_paths: Vec::new(),
        }
    }

    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sub_paths: Vec::new(),
        }
    }

    pub fn with_sub_paths(label: impl Into<String>, sub_paths: Vec<Path>) -> Self {
        Self {
            label: label.into(),
            sub_paths,
        }
    }

    /// Single-branch path below an anonymous root: `from_labels(["other", "key"])`
    /// addresses the field `key` of the field `other`.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        let mut chain: Option<Path> = None;
        for label in labels.into_iter().rev() {
            let sub_paths = chain.take().map(|p| vec![p]).unwrap_or_default();
            chain = Some(Path::with_sub_paths(label, sub_paths));
        }
        Path::with_sub_paths(String::new(), chain.into_iter().collect())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn sub_paths(&self) -> &[Path] {
        &self.sub_paths
    }

    pub fn is_leaf(&self) -> bool {
        self.sub_paths.is_empty()
    }

    /// True when any node along the path has more than one sub-path.
    pub fn is_branching(&self) -> bool {
        self.sub_paths.len() > 1 || self.sub_paths.iter().any(Path::is_branching)
    }

    /// Labels below the root of a single-branch path.
    pub fn labels(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut cur = self;
        loop {
            match cur.sub_paths.as_slice() {
                [] => return Ok(out),
                [next] => {
                    out.push(next.label.clone());
                    cur = next;
                }
                _ => return Err(Error::AmbiguousPath(self.to_string())),
            }
        }
    }

    /// Every root-to-leaf branch, as label lists (root label excluded).
    pub fn branches(&self) -> Vec<Vec<String>> {
        if self.sub_paths.is_empty() {
            return vec![Vec::new()];
        }
        let mut out = Vec::new();
        for sub in &self.sub_paths {
            for mut tail in sub.branches() {
                tail.insert(0, sub.label.clone());
                out.push(tail);
            }
        }
        out
    }

    /// Path with `label` prepended below a fresh anonymous root.
    pub fn prefixed(&self, label: impl Into<String>) -> Self {
        Path::with_sub_paths(
            String::new(),
            vec![Path::with_sub_paths(label, self.sub_paths.clone())],
        )
    }

    /// Drop the first step of a single-step-prefixed path (inverse of `prefixed`).
    pub fn strip_prefix(&self, label: &str) -> Option<Self> {
        match self.sub_paths.as_slice() {
            [first] if first.label == label => Some(Path::with_sub_paths(
                String::new(),
                first.sub_paths.clone(),
            )),
            _ => None,
        }
    }
}

impl Default for Path {
    fn default() -> Self {
        Self::root()
    }
}

fn fmt_node(p: &Path, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&p.label)?;
    match p.sub_paths.as_slice() {
        [] => Ok(()),
        [one] => {
            f.write_str(".")?;
            fmt_node(one, f)
        }
        many => {
            f.write_str(".{")?;
            for (i, sub) in many.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                fmt_node(sub, f)?;
            }
            f.write_str("}")
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.label.is_empty() {
            return fmt_node(self, f);
        }
        match self.sub_paths.as_slice() {
            [] => f.write_str("."),
            [one] => fmt_node(one, f),
            many => {
                f.write_str("{")?;
                for (i, sub) in many.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    fmt_node(sub, f)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl FromStr for Path {
    type Err = Error;

    /// Parses the dotted single-branch form, e.g. `"data.user.id"`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s == "." {
            return Ok(Path::root());
        }
        let labels: Vec<&str> = s.split('.').collect();
        if labels.iter().any(|l| l.trim().is_empty()) {
            return Err(Error::InvalidInput(format!("malformed path '{s}'")));
        }
        Ok(Path::from_labels(labels.into_iter().map(str::trim)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_roundtrip_through_display() {
        let p = Path::from_labels(["other", "key"]);
        assert_eq!(p.to_string(), "other.key");
        assert_eq!(p.labels().unwrap(), vec!["other", "key"]);
        assert_eq!("other.key".parse::<Path>().unwrap(), p);
    }

    #[test]
    fn branching_path_has_no_single_label_list() {
        let p = Path::with_sub_paths(
            "",
            vec![Path::new("a"), Path::new("b")],
        );
        assert!(p.is_branching());
        assert!(matches!(p.labels(), Err(Error::AmbiguousPath(_))));
        assert_eq!(p.branches(), vec![vec!["a".to_string()], vec!["b".to_string()]]);
        assert_eq!(p.to_string(), "{a,b}");
    }

    #[test]
    fn prefix_and_strip() {
        let p = Path::from_labels(["x", "y"]);
        let wrapped = p.prefixed("data");
        assert_eq!(wrapped.to_string(), "data.x.y");
        assert_eq!(wrapped.strip_prefix("data"), Some(p));
    }

    #[test]
    fn empty_segment_is_rejected() {
        assert!("a..b".parse::<Path>().is_err());
        assert_eq!("".parse::<Path>().unwrap(), Path::root());
    }
}
