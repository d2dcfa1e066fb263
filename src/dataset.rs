use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;

use crate::error::{Result, TrainError};
use crate::labels::ClassLabels;

/// File extensions the image loader accepts.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
}

fn read_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| TrainError::io(dir, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect::<Vec<_>>();
    entries.sort();
    Ok(entries)
}

/// Counts the samples of a class-per-folder tree.
///
/// Every directory below `root` (at any depth, `root` itself excluded) contributes the number of
/// its non-hidden direct entries. A symlinked directory is counted but never descended into. A
/// missing `root` holds no samples.
pub fn count_samples(root: &Path) -> Result<usize> {
    if !root.exists() {
        return Ok(0);
    }

    let mut count = 0;
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for sub in read_entries(&dir)?.into_iter().filter(|p| p.is_dir()) {
            count += read_entries(&sub)?.iter().filter(|p| !is_hidden(p)).count();
            if !sub.is_symlink() {
                pending.push(sub);
            }
        }
    }

    Ok(count)
}

/// Each non-hidden direct entry of `root` is treated as one class.
pub fn count_classes(root: &Path) -> Result<usize> {
    Ok(read_entries(root)?.iter().filter(|p| !is_hidden(p)).count())
}

/// Groups every file below `root` by the first path component under `root`.
pub fn collect_labels(root: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let mut by_label: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in read_entries(&dir)? {
            if entry.is_dir() {
                if !entry.is_symlink() {
                    pending.push(entry);
                }
                continue;
            }

            let Ok(relative) = entry.strip_prefix(root) else {
                continue;
            };
            let Some(label) = relative.components().next() else {
                continue;
            };
            let label = label.as_os_str().to_string_lossy().into_owned();
            by_label.entry(label).or_default().push(entry);
        }
    }

    for files in by_label.values_mut() {
        files.sort();
    }

    Ok(by_label)
}

/// Fails unless both trees carry exactly the same labels. Returns the sorted label list.
pub fn check_label_sets(train_dir: &Path, val_dir: &Path) -> Result<Vec<String>> {
    let training: Vec<String> = collect_labels(train_dir)?.into_keys().collect();
    let validation: Vec<String> = collect_labels(val_dir)?.into_keys().collect();

    let train_set: BTreeSet<&String> = training.iter().collect();
    let val_set: BTreeSet<&String> = validation.iter().collect();

    if train_set != val_set {
        return Err(TrainError::LabelMismatch {
            training,
            validation,
        });
    }

    Ok(training)
}

pub fn check_class_counts(training: usize, validation: usize) -> Result<()> {
    if training != validation {
        return Err(TrainError::ClassCountMismatch {
            training,
            validation,
        });
    }
    Ok(())
}

/// One labelled image on disk. Decoding happens in the batcher.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageSample {
    pub path: PathBuf,
    pub label: usize,
}

/// Image classification dataset read from a class-per-folder tree.
///
/// Only files with an image extension are kept, searched recursively inside every label folder.
/// The sample label is the index of its folder in the sorted label list so that training and
/// validation agree on class ids.
pub struct ClassFolderDataset {
    samples: Vec<ImageSample>,
}

impl ClassFolderDataset {
    pub fn new(root: &Path, labels: &ClassLabels) -> Result<Self> {
        let by_label = collect_labels(root)?;
        let mut samples = vec![];

        for (name, files) in by_label.iter() {
            let Some(label) = labels.index_of(name) else {
                continue;
            };
            samples.extend(
                files
                    .iter()
                    .filter(|f| is_image(f))
                    .map(|path| ImageSample {
                        path: path.clone(),
                        label,
                    }),
            );
        }

        if samples.is_empty() {
            return Err(TrainError::EmptyDataset(root.to_path_buf()));
        }

        Ok(Self { samples })
    }

    /// Number of samples per class id.
    pub fn class_histogram(&self, num_classes: usize) -> Vec<usize> {
        let mut histogram = vec![0; num_classes];
        for sample in self.samples.iter() {
            if let Some(slot) = histogram.get_mut(sample.label) {
                *slot += 1;
            }
        }
        histogram
    }
}

impl Dataset<ImageSample> for ClassFolderDataset {
    fn get(&self, index: usize) -> Option<ImageSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
