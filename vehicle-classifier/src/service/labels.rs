//! Ordered class names of the model output.
//!
//! The position of a label is the index of the matching model output. That ordering is
//! fixed when the model is trained and cannot be checked here: a label file or manifest
//! shipped with an artifact must list the classes in the training order.
use std::{fs, path::Path, slice::Iter};

use thiserror::Error;

/// Classes of the bundled vehicle model, in training order.
pub const VEHICLE_LABELS: [&str; 4] = ["TRUCK", "BUS", "CAR", "MOTORCYCLE"];

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("Could not read the label file: {0}")]
    Io(#[from] std::io::Error),
    #[error("The label set is empty")]
    Empty,
    #[error("Line {0} of the label file is blank but more labels follow it")]
    BlankLine(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::vehicles()
    }
}

impl LabelSet {
    pub fn new<I, S>(labels: I) -> Result<Self, LabelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels = labels.into_iter().map(Into::into).collect::<Vec<String>>();
        if labels.is_empty() {
            return Err(LabelError::Empty);
        }
        Ok(Self { labels })
    }

    /// The four vehicle classes of the bundled model.
    pub fn vehicles() -> Self {
        Self {
            labels: VEHICLE_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Reads a label file with one label per line.
    pub fn from_file<P>(path: P) -> Result<Self, LabelError>
    where
        P: AsRef<Path>,
    {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses one label per line.
    ///
    /// Surrounding whitespace and `\r` are stripped and trailing blank lines are ignored.
    /// A blank line followed by other labels is rejected, since skipping it would shift
    /// every following index.
    pub fn parse(content: &str) -> Result<Self, LabelError> {
        let lines = content.lines().map(str::trim).collect::<Vec<_>>();
        let last = lines
            .iter()
            .rposition(|line| !line.is_empty())
            .ok_or(LabelError::Empty)?;

        if let Some(blank) = lines[..last].iter().position(|line| line.is_empty()) {
            return Err(LabelError::BlankLine(blank + 1));
        }

        Self::new(lines[..=last].iter().copied())
    }

    /// Bounds-checked lookup of the label of a model output index.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, String> {
        self.labels.iter()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.labels.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_labels_are_vehicles() {
        let labels = LabelSet::default();
        assert_eq!(labels.len(), 4);
        assert_eq!(labels.get(0), Some("TRUCK"));
        assert_eq!(labels.get(3), Some("MOTORCYCLE"));
        assert_eq!(labels.get(4), None);
    }

    #[test]
    fn parse_strips_line_endings() {
        let labels = LabelSet::parse("TRUCK\r\nBUS\r\n CAR \nMOTORCYCLE\n").unwrap();
        assert_eq!(labels, LabelSet::vehicles());
    }

    #[test]
    fn parse_without_trailing_newline() {
        let labels = LabelSet::parse("TRUCK\nBUS").unwrap();
        assert_eq!(labels.to_vec(), vec!["TRUCK", "BUS"]);
    }

    #[test]
    fn parse_ignores_trailing_blank_lines() {
        let labels = LabelSet::parse("TRUCK\nBUS\n\n\n").unwrap();
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn parse_rejects_interior_blank_line() {
        let err = LabelSet::parse("TRUCK\n\nBUS\n").unwrap_err();
        assert!(matches!(err, LabelError::BlankLine(2)));
    }

    #[test]
    fn parse_rejects_empty_content() {
        assert!(matches!(LabelSet::parse(""), Err(LabelError::Empty)));
        assert!(matches!(LabelSet::parse("\n \n"), Err(LabelError::Empty)));
        assert!(matches!(
            LabelSet::new(Vec::<String>::new()),
            Err(LabelError::Empty)
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = LabelSet::from_file("does/not/exist.txt").unwrap_err();
        assert!(matches!(err, LabelError::Io(_)));
    }
}
