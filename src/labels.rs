use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{Result, TrainError};

/// Maps the class folder names of a dataset to the contiguous class ids used by the model.
///
/// Names are kept sorted so the id of a class only depends on the set of folder names, not on
/// the order the filesystem returns them in. Cross-entropy loss uses these ids directly as
/// integer targets.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    /// Creates a new mapping from a list of class names.
    ///
    /// The names are sorted and de-duplicated.
    pub fn new(mut names: Vec<String>) -> Self {
        names.sort();
        names.dedup();
        ClassLabels { names }
    }

    /// Returns the number of classes the model has to predict.
    pub fn count(&self) -> usize {
        self.names.len()
    }

    /// Returns the class names ordered by class id.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Maps a class name to its model class id.
    ///
    /// # Returns
    ///
    /// `Some(id)` if the class exists, otherwise `None`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.binary_search_by(|n| n.as_str().cmp(name)).ok()
    }

    /// Maps a model class id back to its folder name.
    pub fn name_of(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(|n| n.as_str())
    }

    /// Writes the label list as a JSON array, index `i` holding the name of class `i`.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| TrainError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush().map_err(|e| TrainError::io(path, e))
    }
}
