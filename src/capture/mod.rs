//! Capture engine dispatch
//!
//! A batch is captured by writing its seeds to `<scratch>/<archiveName>.txt`
//! and running the external capture engine once, scoped to that file. The
//! engine is expected to leave `<scratch>/collections/<archiveName>/<archiveName>.<ext>`
//! behind on success; [`relocate::ArtifactRelocator`] takes it from there.
//!
//! The dispatcher supplies the time budget and waits for the process to exit.
//! It does not kill the engine itself. Output is streamed line by line into
//! the log under the `newsvault::capture::engine` target.

pub mod relocate;

pub use relocate::{ArtifactRelocator, RelocationReport};

use crate::config::CaptureConfig;
use crate::models::Batch;
use crate::utils::error::CaptureError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const ENGINE_TARGET: &str = "newsvault::capture::engine";

/// Wall-clock budget handed to the capture engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBudget {
    /// Same budget for every batch
    Fixed(u64),
    /// `ceil(per_url_secs * seeds / workers)`, at least one second
    PerUrl { per_url_secs: u64, workers: usize },
}

impl TimeBudget {
    pub fn from_config(config: &CaptureConfig) -> Self {
        match config.time_limit_secs {
            Some(secs) => Self::Fixed(secs),
            None => Self::PerUrl {
                per_url_secs: config.per_url_budget_secs,
                workers: config.workers,
            },
        }
    }

    /// Budget in seconds for a batch of `seed_count` URLs
    pub fn seconds(&self, seed_count: usize) -> u64 {
        match *self {
            Self::Fixed(secs) => secs,
            Self::PerUrl {
                per_url_secs,
                workers,
            } => {
                let workers = workers.max(1) as u64;
                let total = per_url_secs.saturating_mul(seed_count as u64);
                total.div_ceil(workers).max(1)
            }
        }
    }
}

/// Engine program plus argument template
///
/// Placeholders substituted in every argument:
/// `{scratch_dir}` (absolute), `{seed_file}` (absolute), `{seed_file_name}`,
/// `{collection}` (the archive name), `{time_limit}` (seconds), `{workers}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

/// Values substituted into a [`CommandTemplate`]
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub scratch_dir: &'a Path,
    pub seed_file: &'a Path,
    pub collection: &'a str,
    pub time_limit: u64,
    pub workers: usize,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn render(&self, invocation: &Invocation<'_>) -> Vec<String> {
        let seed_file_name = invocation
            .seed_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let scratch = invocation.scratch_dir.display().to_string();
        let seed_file = invocation.seed_file.display().to_string();
        let time_limit = invocation.time_limit.to_string();
        let workers = invocation.workers.to_string();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{scratch_dir}", &scratch)
                    .replace("{seed_file_name}", &seed_file_name)
                    .replace("{seed_file}", &seed_file)
                    .replace("{collection}", invocation.collection)
                    .replace("{time_limit}", &time_limit)
                    .replace("{workers}", &workers)
            })
            .collect()
    }
}

/// A capture run that exited successfully
#[derive(Debug, Clone)]
pub struct CaptureReport {
    pub seed_file: PathBuf,
    pub time_limit: u64,
    pub elapsed: Duration,
}

/// Runs the capture engine for one batch at a time
pub struct CaptureDispatcher {
    scratch_dir: PathBuf,
    template: CommandTemplate,
    budget: TimeBudget,
    workers: usize,
}

impl CaptureDispatcher {
    pub fn new(
        scratch_dir: impl Into<PathBuf>,
        template: CommandTemplate,
        budget: TimeBudget,
        workers: usize,
    ) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            template,
            budget,
            workers: workers.max(1),
        }
    }

    pub fn from_config(scratch_dir: impl Into<PathBuf>, config: &CaptureConfig) -> Self {
        Self::new(
            scratch_dir,
            CommandTemplate::new(config.program.clone(), config.args.clone()),
            TimeBudget::from_config(config),
            config.workers,
        )
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// `<scratch>/<archiveName>.txt`
    pub fn seed_file_path(&self, batch: &Batch) -> PathBuf {
        seed_file_path(&self.scratch_dir, batch)
    }

    /// Write the seed file, run the engine and wait for it to exit
    ///
    /// # Errors
    ///
    /// `CaptureError::EmptyBatch` for a batch without seeds,
    /// `CaptureError::Io` if the seed file cannot be written,
    /// `CaptureError::Launch` if the engine cannot be started and
    /// `CaptureError::ExitStatus` if it exits unsuccessfully.
    pub async fn dispatch(&self, batch: &Batch) -> Result<CaptureReport, CaptureError> {
        if batch.is_empty() {
            return Err(CaptureError::EmptyBatch(batch.archive_name.clone()));
        }

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| CaptureError::io("create scratch directory", e))?;
        let scratch_dir = tokio::fs::canonicalize(&self.scratch_dir)
            .await
            .map_err(|e| CaptureError::io("resolve scratch directory", e))?;

        let seed_file = seed_file_path(&scratch_dir, batch);
        let mut contents = String::new();
        for url in batch.seed_urls() {
            contents.push_str(url);
            contents.push('\n');
        }
        tokio::fs::write(&seed_file, contents)
            .await
            .map_err(|e| CaptureError::io("write seed file", e))?;

        let time_limit = self.budget.seconds(batch.len());
        let args = self.template.render(&Invocation {
            scratch_dir: &scratch_dir,
            seed_file: &seed_file,
            collection: &batch.archive_name,
            time_limit,
            workers: self.workers,
        });

        info!(
            batch = %batch.archive_name,
            seeds = batch.len(),
            time_limit,
            workers = self.workers,
            program = %self.template.program,
            "Starting capture engine"
        );
        debug!(args = ?args, "Capture engine arguments");

        let started = Instant::now();
        let mut child = Command::new(&self.template.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CaptureError::Launch {
                program: self.template.program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .map(|out| stream_lines(out, batch.archive_name.clone(), false));
        let stderr = child
            .stderr
            .take()
            .map(|err| stream_lines(err, batch.archive_name.clone(), true));

        let status = child
            .wait()
            .await
            .map_err(|e| CaptureError::io("wait for capture engine", e))?;

        for handle in [stdout, stderr].into_iter().flatten() {
            if let Err(e) = handle.await {
                warn!(batch = %batch.archive_name, error = %e, "Engine output reader failed");
            }
        }

        let elapsed = started.elapsed();
        if !status.success() {
            return Err(CaptureError::ExitStatus(status.to_string()));
        }

        info!(
            batch = %batch.archive_name,
            elapsed_secs = elapsed.as_secs(),
            "Capture engine finished"
        );

        Ok(CaptureReport {
            seed_file,
            time_limit,
            elapsed,
        })
    }
}

pub(crate) fn seed_file_path(scratch_dir: &Path, batch: &Batch) -> PathBuf {
    scratch_dir.join(format!("{}.txt", batch.archive_name))
}

/// Forward each output line of the engine to the log as it arrives
fn stream_lines<R>(reader: R, batch: String, is_stderr: bool) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if is_stderr {
                        warn!(target: ENGINE_TARGET, batch = %batch, "{line}");
                    } else {
                        info!(target: ENGINE_TARGET, batch = %batch, "{line}");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(target: ENGINE_TARGET, batch = %batch, error = %e, "Failed reading engine output");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_budget_fixed() {
        assert_eq!(TimeBudget::Fixed(360).seconds(1), 360);
        assert_eq!(TimeBudget::Fixed(360).seconds(500), 360);
    }

    #[test]
    fn test_time_budget_per_url() {
        let budget = TimeBudget::PerUrl {
            per_url_secs: 30,
            workers: 4,
        };
        assert_eq!(budget.seconds(8), 60);
        assert_eq!(budget.seconds(5), 38);
        assert_eq!(budget.seconds(0), 1);
    }

    #[test]
    fn test_time_budget_from_config() {
        let mut config = CaptureConfig::default();
        assert!(matches!(
            TimeBudget::from_config(&config),
            TimeBudget::PerUrl { .. }
        ));

        config.time_limit_secs = Some(360);
        assert_eq!(TimeBudget::from_config(&config), TimeBudget::Fixed(360));
    }

    #[test]
    fn test_render_default_template() {
        let config = CaptureConfig::default();
        let template = CommandTemplate::new(config.program.clone(), config.args.clone());
        let args = template.render(&Invocation {
            scratch_dir: Path::new("/work/tmp"),
            seed_file: Path::new("/work/tmp/ohio-20250603T010203.txt"),
            collection: "ohio-20250603T010203",
            time_limit: 120,
            workers: 2,
        });

        assert_eq!(template.program, "docker");
        assert!(args.contains(&"/work/tmp:/crawls/".to_string()));
        assert!(args.contains(&"/crawls/ohio-20250603T010203.txt".to_string()));
        assert!(args.contains(&"ohio-20250603T010203".to_string()));
        assert!(args.contains(&"120".to_string()));
        assert!(args.contains(&"--generateWACZ".to_string()));
    }
}
