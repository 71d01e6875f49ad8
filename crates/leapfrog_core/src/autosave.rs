//! Periodic checkpoints a run can be resumed from.
//!
//! An autosave consists of a checkpoint of all components, written through the
//! [`OutputSink`], and a JSON parameter record holding everything else needed
//! to continue with the same remaining schedule.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::comm::Communicator;
use crate::component::Component;
use crate::config::{AutosaveSettings, OutputTimes};
use crate::output::OutputSink;
use crate::time::CosmicTime;

/// The parameter record written next to an autosave checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutosaveRecord {
    pub job_id: String,
    /// Parameter file of the autosaved run.
    pub params_path: Option<PathBuf>,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// The autosaved checkpoint.
    pub initial_conditions: PathBuf,
    pub a_begin: Option<f64>,
    pub t_begin: Option<f64>,
    pub initial_time_step: usize,
    pub dt_autosave: f64,
    pub dt_begin_autosave: f64,
    pub original_output_times: OutputTimes,
    pub output_times: OutputTimes,
}

impl AutosaveRecord {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read autosave record {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse autosave record {}", path.display()))
    }
}

/// State of the run at the moment of an autosave.
#[derive(Debug, Clone, Copy)]
pub struct AutosavePoint<'a> {
    pub time: &'a CosmicTime,
    pub hubble_enabled: bool,
    pub dt: f64,
    pub dt_begin: f64,
    pub original_times: &'a OutputTimes,
    pub times: &'a OutputTimes,
}

pub struct Autosaver {
    settings: AutosaveSettings,
    last: Instant,
}

impl Autosaver {
    pub fn new(settings: AutosaveSettings) -> Self {
        Self {
            settings,
            last: Instant::now(),
        }
    }

    pub fn settings(&self) -> &AutosaveSettings {
        &self.settings
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.settings.dir.join(format!(
            "autosave_{}.{}",
            self.settings.job_id, self.settings.checkpoint_extension
        ))
    }

    pub fn record_path(&self) -> PathBuf {
        self.settings
            .params_dir
            .join(format!("autosave_{}.json", self.settings.job_id))
    }

    /// Whether the autosave interval has elapsed, as judged by the master.
    pub fn due(&self, comm: &dyn Communicator) -> bool {
        let interval = self.settings.interval_secs;
        if interval <= 0.0 {
            return false;
        }
        comm.broadcast_bool(self.last.elapsed().as_secs_f64() > interval)
    }

    /// Writes the parameter record and the checkpoint for resuming at the
    /// base step following `point.time`.
    pub fn autosave(
        &mut self,
        sink: &mut dyn OutputSink,
        components: &[Box<dyn Component>],
        comm: &dyn Communicator,
        point: AutosavePoint<'_>,
    ) -> Result<()> {
        info!(time_step = point.time.time_step, "Autosaving");
        let checkpoint = self.checkpoint_path();
        let record_path = self.record_path();
        if comm.is_master() {
            let record = self.record(&checkpoint, point);
            fs::create_dir_all(&self.settings.params_dir).with_context(|| {
                format!("Failed to create {}", self.settings.params_dir.display())
            })?;
            let text = serde_json::to_string_pretty(&record)?;
            fs::write(&record_path, text)
                .with_context(|| format!("Failed to write {}", record_path.display()))?;
            fs::create_dir_all(&self.settings.dir)
                .with_context(|| format!("Failed to create {}", self.settings.dir.display()))?;
        }
        comm.barrier();
        sink.save_checkpoint(components, &checkpoint)
            .with_context(|| format!("Failed to save checkpoint {}", checkpoint.display()))?;
        comm.barrier();
        if comm.is_master() {
            self.mirror(&[record_path.as_path(), checkpoint.as_path()]);
            self.remove_superseded(&checkpoint)?;
        }
        self.last = Instant::now();
        Ok(())
    }

    fn record(&self, checkpoint: &Path, point: AutosavePoint<'_>) -> AutosaveRecord {
        let time = point.time;
        let (a_begin, t_begin) = if point.hubble_enabled {
            (Some(time.a()), None)
        } else {
            (None, Some(time.t()))
        };
        AutosaveRecord {
            job_id: self.settings.job_id.clone(),
            params_path: self.settings.params_path.clone(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            initial_conditions: checkpoint.to_path_buf(),
            a_begin,
            t_begin,
            initial_time_step: time.time_step + 1,
            dt_autosave: point.dt,
            dt_begin_autosave: point.dt_begin,
            original_output_times: point.original_times.clone(),
            output_times: point.times.remaining(time.a(), time.t()),
        }
    }

    /// Copies the autosave files to the mirror directory. A missing or
    /// failing mirror never stops the run.
    fn mirror(&self, files: &[&Path]) {
        let Some(mirror) = &self.settings.mirror_dir else {
            debug!("No autosave mirror configured, skipping");
            return;
        };
        if let Err(err) = fs::create_dir_all(mirror) {
            warn!(dir = %mirror.display(), error = %err, "Cannot create autosave mirror");
            return;
        }
        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            if let Err(err) = fs::copy(file, mirror.join(name)) {
                warn!(file = %file.display(), error = %err, "Failed to mirror autosave file");
            }
        }
    }

    /// Removes the autosave checkpoint the run was started from when a new
    /// one under a different name replaces it.
    fn remove_superseded(&self, checkpoint: &Path) -> Result<()> {
        let Some(initial) = &self.settings.initial_conditions else {
            return Ok(());
        };
        if !self.is_autosave_name(initial) || !initial.is_file() {
            return Ok(());
        }
        let same = match (fs::canonicalize(initial), fs::canonicalize(checkpoint)) {
            (Ok(old), Ok(new)) => old == new,
            _ => false,
        };
        if !same {
            debug!(path = %initial.display(), "Removing superseded autosave");
            fs::remove_file(initial)
                .with_context(|| format!("Failed to remove {}", initial.display()))?;
        }
        Ok(())
    }

    /// Whether `path` is named `autosave_<digits>.<extension>`.
    fn is_autosave_name(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let suffix = format!(".{}", self.settings.checkpoint_extension);
        name.strip_prefix("autosave_")
            .and_then(|rest| rest.strip_suffix(suffix.as_str()))
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Removes the job's autosave checkpoint once the run has completed.
    pub fn remove_checkpoint(&self, comm: &dyn Communicator) -> Result<()> {
        if !comm.is_master() {
            return Ok(());
        }
        let checkpoint = self.checkpoint_path();
        if checkpoint.is_file() {
            fs::remove_file(&checkpoint)
                .with_context(|| format!("Failed to remove {}", checkpoint.display()))?;
        }
        Ok(())
    }
}
