use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;

use crate::error::{Result, TrainError};

/// Mean loss and accuracy of one finished phase.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PhaseMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

/// Train and validation metrics of one epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EpochMetrics {
    pub train: PhaseMetrics,
    pub valid: PhaseMetrics,
}

/// Per-epoch metrics of a whole run, in epoch order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct History {
    epochs: Vec<EpochMetrics>,
}

impl History {
    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn epochs(&self) -> &[EpochMetrics] {
        &self.epochs
    }

    pub fn accuracy(&self) -> (Vec<f64>, Vec<f64>) {
        self.epochs
            .iter()
            .map(|e| (e.train.accuracy, e.valid.accuracy))
            .unzip()
    }

    pub fn loss(&self) -> (Vec<f64>, Vec<f64>) {
        self.epochs
            .iter()
            .map(|e| (e.train.loss, e.valid.loss))
            .unzip()
    }
}

/// Running loss and accuracy of the current phase.
///
/// Progress is printed on one carriage-return line, every finished phase is appended to the
/// run log.
pub struct Stats {
    stopwatch: Instant,
    loss_sum: f64,
    correct: usize,
    seen: usize,
    iterations: usize,
    log_output: String,
    log_path: PathBuf,
    f_handle: File,
}

impl Stats {
    pub fn new(log_path: &Path) -> Result<Self> {
        let f_handle = File::options()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(|err| TrainError::io(log_path, err))?;

        let now = Local::now();
        writeln!(&f_handle, "\n----{}----\n", now.format("%Y-%m-%d %H:%M:%S"))
            .map_err(|err| TrainError::io(log_path, err))?;

        Ok(Stats {
            stopwatch: Instant::now(),
            loss_sum: 0.0,
            correct: 0,
            seen: 0,
            iterations: 0,
            log_output: String::new(),
            log_path: log_path.to_path_buf(),
            f_handle,
        })
    }

    /// Records one batch: its mean loss, the number of correct predictions and the batch size.
    pub fn update(&mut self, loss: f32, correct: usize, items: usize, name: &str, epoch: usize) {
        self.iterations += 1;
        self.loss_sum += loss as f64;
        self.correct += correct;
        self.seen += items;

        let metrics = self.metrics();
        let elapsed = self.stopwatch.elapsed().as_secs();

        self.log_output = format!(
            "{},E:{:<6},I:{:<6},L:{:<8.4},A:{:<6.4},T:{:<}m{:<}s\r",
            name,
            epoch,
            self.seen,
            metrics.loss,
            metrics.accuracy,
            (elapsed / 60),
            elapsed % 60
        );

        print!("{}", &self.log_output);
        std::io::stdout().flush().ok();
    }

    fn metrics(&self) -> PhaseMetrics {
        if self.iterations == 0 {
            return PhaseMetrics::default();
        }

        PhaseMetrics {
            loss: self.loss_sum / self.iterations as f64,
            accuracy: self.correct as f64 / self.seen.max(1) as f64,
        }
    }

    /// Ends the current phase: writes its line to the log, resets the counters and returns the
    /// phase means.
    pub fn flush(&mut self) -> Result<PhaseMetrics> {
        let metrics = self.metrics();

        writeln!(self.f_handle, "{}", self.log_output.trim_end_matches('\r'))
            .map_err(|err| TrainError::io(&self.log_path, err))?;

        self.stopwatch = Instant::now();
        self.loss_sum = 0.0;
        self.correct = 0;
        self.seen = 0;
        self.iterations = 0;
        self.log_output.clear();
        println!();

        Ok(metrics)
    }
}
