//! Upload progress reporting and console output.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};

use crate::submit::SubmitResult;
use crate::upload::{UploadOutcome, UploadTask};

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({msg})";

/// An upload reporter receives events while a batch is uploaded.
#[async_trait]
pub trait UploadReporter: Send + Sync {
    /// Called once before any transfer starts.
    async fn on_batch_start(&self, files: usize);

    /// Called when a file finished transferring.
    async fn on_file_uploaded(&self, task: &UploadTask, bytes: u64);

    /// Called for every warning, in the order it is recorded.
    async fn on_warning(&self, message: &str);

    /// Called after the last transfer finished or the batch was stopped.
    async fn on_batch_complete(&self, outcome: &UploadOutcome);
}

/// A reporter that does nothing (for testing or when output is not needed).
pub struct NullReporter;

#[async_trait]
impl UploadReporter for NullReporter {
    async fn on_batch_start(&self, _files: usize) {}
    async fn on_file_uploaded(&self, _task: &UploadTask, _bytes: u64) {}
    async fn on_warning(&self, _message: &str) {}
    async fn on_batch_complete(&self, _outcome: &UploadOutcome) {}
}

/// Console reporter that shows upload progress in the terminal.
pub struct ConsoleReporter {
    progress: Mutex<Option<ProgressBar>>,
    bytes: AtomicU64,
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            progress: Mutex::new(None),
            bytes: AtomicU64::new(0),
            verbose,
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.progress.lock()
            && let Some(pb) = guard.as_ref()
        {
            f(pb);
        }
    }
}

#[async_trait]
impl UploadReporter for ConsoleReporter {
    async fn on_batch_start(&self, files: usize) {
        if files == 0 {
            return;
        }
        println!("Uploading {} files", files);

        let pb = ProgressBar::new(files as u64);
        match ProgressStyle::with_template(PROGRESS_TEMPLATE) {
            Ok(style) => pb.set_style(style.progress_chars("#>-")),
            Err(e) => tracing::debug!("Falling back to default progress style: {}", e),
        }
        pb.set_message("0 bytes");
        self.bytes.store(0, Ordering::Relaxed);

        if let Ok(mut guard) = self.progress.lock() {
            *guard = Some(pb);
        }
    }

    async fn on_file_uploaded(&self, task: &UploadTask, bytes: u64) {
        let total = self.bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.with_bar(|pb| {
            pb.inc(1);
            pb.set_message(format!("{} bytes", total));
            if self.verbose {
                pb.println(format!(
                    "{} {} ({} bytes)",
                    console::style("DONE").green(),
                    task.local_path.display(),
                    bytes
                ));
            }
        });
    }

    async fn on_warning(&self, message: &str) {
        let line = format!("{} {}", console::style("WARN").yellow(), message);
        let mut shown = false;
        self.with_bar(|pb| {
            pb.println(&line);
            shown = true;
        });
        if !shown {
            eprintln!("{}", line);
        }
    }

    async fn on_batch_complete(&self, outcome: &UploadOutcome) {
        let pb = self.progress.lock().ok().and_then(|mut guard| guard.take());
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        if outcome.abandoned > 0 {
            println!(
                "{}",
                console::style(format!("{} files were not uploaded.", outcome.abandoned))
                    .yellow()
            );
        }
    }
}

/// Prints the final result of a submission.
///
/// Warnings are shown even on success; errors only ever accompany a
/// failed submission.
pub fn print_summary(result: &SubmitResult) {
    println!();
    if result.success {
        println!("{}", console::style(&result.message).green().bold());
    } else {
        println!("{}", console::style(&result.message).red().bold());
    }

    if !result.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &result.warnings {
            println!("  - {}", console::style(warning).yellow());
        }
    }

    if !result.errors.is_empty() {
        println!();
        println!("Errors:");
        for error in &result.errors {
            println!("  - {}", console::style(error).red());
        }
    }
}
