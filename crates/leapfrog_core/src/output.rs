//! Output scheduling: which instants to synchronize at, what to write there,
//! and under which names.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::background::Background;
use crate::comm::Communicator;
use crate::component::Component;
use crate::config::{OutputSettings, OutputTimes};
use crate::error::SchedulerError;
use crate::time::{CosmicTime, DumpTime, TimeParam};

/// Kinds of output, in the order they are written at a shared dump time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OutputKind {
    #[serde(rename = "render2D")]
    Render2D,
    #[serde(rename = "snapshot")]
    Snapshot,
    #[serde(rename = "powerspec")]
    Powerspec,
    #[serde(rename = "render3D")]
    Render3D,
}

impl OutputKind {
    pub const ALL: [OutputKind; 4] = [
        OutputKind::Render2D,
        OutputKind::Snapshot,
        OutputKind::Powerspec,
        OutputKind::Render3D,
    ];
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputKind::Render2D => "render2D",
            OutputKind::Snapshot => "snapshot",
            OutputKind::Powerspec => "powerspec",
            OutputKind::Render3D => "render3D",
        })
    }
}

/// Writes outputs and checkpoints. File formats are up to the implementation.
pub trait OutputSink {
    fn write(&mut self, kind: OutputKind, components: &[Box<dyn Component>], path: &Path)
        -> Result<()>;

    /// Saves the complete state of every component, enough to resume from.
    fn save_checkpoint(&mut self, components: &[Box<dyn Component>], path: &Path) -> Result<()>;
}

/// Filename patterns `{dir}/{base}_{param}={value}` per output kind.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFilenames {
    patterns: BTreeMap<OutputKind, Pattern>,
}

#[derive(Debug, Clone, PartialEq)]
struct Pattern {
    dir: PathBuf,
    base: String,
    decimals: usize,
}

/// Fewest decimals telling all `times` apart, and the first from zero
/// unless it is zero.
fn decimals_needed(times: &[f64]) -> usize {
    const MAX_DECIMALS: usize = 64;
    let format = |n: usize, value: f64| format!("{value:.n$}");
    let mut sorted = times.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    (0..MAX_DECIMALS)
        .find(|&n| {
            let mut names: Vec<String> = sorted.iter().map(|&v| format(n, v)).collect();
            names.dedup();
            let distinct = names.len() == sorted.len();
            let first_nonzero = match sorted.first() {
                Some(&first) => first == 0.0 || format(n, first) != format(n, 0.0),
                None => true,
            };
            distinct && first_nonzero
        })
        .unwrap_or(MAX_DECIMALS)
}

impl OutputFilenames {
    /// Derives the patterns from all output times of the run, so that names
    /// stay the same across restarts. Kinds never output get no pattern.
    pub fn new(output: &OutputSettings, a_begin: f64, t_begin: f64) -> Self {
        let mut patterns: BTreeMap<OutputKind, Pattern> = BTreeMap::new();
        let all_times = output.original_times();
        for (param, at_begin) in [(TimeParam::A, a_begin), (TimeParam::T, t_begin)] {
            for (&kind, times) in all_times.get(param) {
                if times.is_empty() {
                    continue;
                }
                let Some(dir) = output.dirs.get(&kind) else {
                    continue;
                };
                let mut with_begin = times.clone();
                with_begin.push(at_begin);
                let decimals = decimals_needed(&with_begin);
                if patterns.get(&kind).is_some_and(|p| p.decimals >= decimals) {
                    continue;
                }
                let base = output.bases.get(&kind).cloned().unwrap_or_default();
                patterns.insert(
                    kind,
                    Pattern {
                        dir: dir.clone(),
                        base,
                        decimals,
                    },
                );
            }
        }
        Self { patterns }
    }

    /// Path of the `kind` output at `param = value`. Times carry their unit.
    pub fn path(
        &self,
        kind: OutputKind,
        param: TimeParam,
        value: f64,
        unit_time: &str,
    ) -> Option<PathBuf> {
        let pattern = self.patterns.get(&kind)?;
        let sep = if pattern.base.is_empty() { "" } else { "_" };
        let unit = match param {
            TimeParam::A => "",
            TimeParam::T => unit_time,
        };
        let name = format!(
            "{}{sep}{param}={value:.decimals$}{unit}",
            pattern.base,
            decimals = pattern.decimals
        );
        Some(pattern.dir.join(name))
    }
}

/// Checks the requested output times, creates the output directories and
/// merges all output times into the sorted instants to synchronize at.
pub fn prepare_for_output(
    output: &OutputSettings,
    time: &CosmicTime,
    background: &dyn Background,
    comm: &dyn Communicator,
) -> Result<(Vec<DumpTime>, OutputFilenames)> {
    for param in [TimeParam::A, TimeParam::T] {
        let at_begin = time.value(param);
        for (kind, times) in output.times.get(param) {
            let earliest = times.iter().copied().fold(f64::INFINITY, f64::min);
            if earliest < at_begin {
                return Err(SchedulerError::OutputBeforeStart {
                    kind: kind.to_string(),
                    param: param.to_string(),
                    value: earliest,
                    begin: at_begin,
                }
                .into());
            }
        }
    }
    if comm.is_master() {
        for param in [TimeParam::A, TimeParam::T] {
            for (kind, times) in output.times.get(param) {
                if times.is_empty() {
                    continue;
                }
                if let Some(dir) = output.dirs.get(kind) {
                    fs::create_dir_all(dir).with_context(|| {
                        format!("Failed to create output directory {}", dir.display())
                    })?;
                }
            }
        }
    }
    comm.barrier();
    let filenames = OutputFilenames::new(output, time.a(), time.t());
    let dump_times = merge_dump_times(&output.times, background)?;
    Ok((dump_times, filenames))
}

/// All output instants, resolved in both coordinates, sorted by cosmic time
/// and with instants closer than a relative 1e-6 merged into the earlier.
pub fn merge_dump_times(times: &OutputTimes, background: &dyn Background) -> Result<Vec<DumpTime>> {
    let collect = |param: TimeParam| {
        let mut values: Vec<f64> = times.get(param).values().flatten().copied().collect();
        values.sort_by(f64::total_cmp);
        values.dedup();
        values
    };
    let mut dump_times: Vec<DumpTime> = collect(TimeParam::T)
        .into_iter()
        .map(|t| DumpTime {
            time_param: TimeParam::T,
            t,
            a: background.scale_factor(t),
        })
        .collect();
    let a_dumps = collect(TimeParam::A);
    if !a_dumps.is_empty() && !background.hubble_enabled() {
        return Err(SchedulerError::InvalidSetting(
            "output times given in scale factor require an expanding background".to_string(),
        )
        .into());
    }
    dump_times.extend(a_dumps.into_iter().map(|a| DumpTime {
        time_param: TimeParam::A,
        t: background.cosmic_time(a),
        a,
    }));
    dump_times.sort_by(|x, y| x.t.total_cmp(&y.t));
    let mut unique: Vec<DumpTime> = Vec::with_capacity(dump_times.len());
    for dump_time in dump_times {
        match unique.last() {
            Some(previous) if (dump_time.t - previous.t).abs() <= 1e-6 * previous.t.abs() => {}
            _ => unique.push(dump_time),
        }
    }
    Ok(unique)
}

/// Writes every output requested at `dump_time`.
pub fn dump(
    sink: &mut dyn OutputSink,
    components: &[Box<dyn Component>],
    filenames: &OutputFilenames,
    times: &OutputTimes,
    dump_time: &DumpTime,
    unit_time: &str,
) -> Result<()> {
    let param = dump_time.time_param;
    let value = dump_time.value();
    for kind in OutputKind::ALL {
        if !times.contains(param, kind, value) {
            continue;
        }
        let Some(path) = filenames.path(kind, param, value, unit_time) else {
            continue;
        };
        info!(kind = %kind, path = %path.display(), "Dumping output");
        sink.write(kind, components, &path)
            .with_context(|| format!("Failed to write {kind} to {}", path.display()))?;
    }
    Ok(())
}
