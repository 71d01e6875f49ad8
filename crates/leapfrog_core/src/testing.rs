//! Scripted collaborators shared by the unit tests.

use std::any::Any;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Metadata, Subscriber};

use crate::component::{Component, FluidVariable, Measure, Representation, RungState};
use crate::integrals::{GlobalIntegrand, Integrals, RungIntegrals};
use crate::interactions::{Force, Interaction, KickIntegrals, Method, Range};
use crate::output::{OutputKind, OutputSink};

pub(crate) fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
    let err = result.expect_err("expected error");
    let message = format!("{err:#}");
    assert!(
        message.contains(needle),
        "expected error to contain \"{needle}\", got \"{message}\""
    );
}

pub(crate) type Log = Rc<RefCell<Vec<String>>>;

/// A component with fixed background properties that logs every call.
pub(crate) struct MockComponent {
    name: String,
    species: String,
    representation: Representation,
    forces: Vec<(Force, Method)>,
    potential_gridsizes: Vec<((Force, Method), usize)>,
    gridsize: usize,
    rho_bar: f64,
    w: f64,
    w_dot: f64,
    decay_rate: f64,
    v_max: f64,
    v_rms: f64,
    linear: Vec<FluidVariable>,
    rungs: Vec<usize>,
    jumps: Vec<i8>,
    rung_state: Option<RungState>,
    assigned_rung: usize,
    jump_up_once: bool,
    log: Log,
}

impl MockComponent {
    fn new(name: &str, representation: Representation) -> Self {
        Self {
            name: name.to_owned(),
            species: "matter".to_owned(),
            representation,
            forces: Vec::new(),
            potential_gridsizes: Vec::new(),
            gridsize: 0,
            rho_bar: 0.0,
            w: 0.0,
            w_dot: 0.0,
            decay_rate: 0.0,
            v_max: 0.0,
            v_rms: 0.0,
            linear: Vec::new(),
            rungs: Vec::new(),
            jumps: Vec::new(),
            rung_state: None,
            assigned_rung: 0,
            jump_up_once: false,
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub(crate) fn particles(name: &str) -> Self {
        Self::new(name, Representation::Particles)
    }

    pub(crate) fn fluid(name: &str) -> Self {
        Self::new(name, Representation::Fluid)
    }

    pub(crate) fn with_force(mut self, force: Force, method: Method) -> Self {
        self.forces.push((force, method));
        self
    }

    pub(crate) fn with_potential_gridsize(
        mut self,
        force: Force,
        method: Method,
        size: usize,
    ) -> Self {
        self.potential_gridsizes.push(((force, method), size));
        self
    }

    pub(crate) fn with_species(mut self, species: &str) -> Self {
        self.species = species.to_owned();
        self
    }

    pub(crate) fn with_gridsize(mut self, gridsize: usize) -> Self {
        self.gridsize = gridsize;
        self
    }

    pub(crate) fn with_rho_bar(mut self, rho_bar: f64) -> Self {
        self.rho_bar = rho_bar;
        self
    }

    pub(crate) fn with_w(mut self, w: f64) -> Self {
        self.w = w;
        self
    }

    pub(crate) fn with_w_dot(mut self, w_dot: f64) -> Self {
        self.w_dot = w_dot;
        self
    }

    pub(crate) fn with_decay_rate(mut self, rate: f64) -> Self {
        self.decay_rate = rate;
        self
    }

    pub(crate) fn with_v_max(mut self, v_max: f64) -> Self {
        self.v_max = v_max;
        self
    }

    pub(crate) fn with_v_rms(mut self, v_rms: f64) -> Self {
        self.v_rms = v_rms;
        self
    }

    pub(crate) fn with_linear(mut self, variable: FluidVariable) -> Self {
        self.linear.push(variable);
        self
    }

    /// Gives the component particles on the listed rungs.
    pub(crate) fn with_rungs(mut self, n_rungs: usize, rungs: Vec<usize>) -> Self {
        self.jumps = vec![0; rungs.len()];
        self.rungs = rungs;
        self.rung_state = Some(RungState::new(n_rungs));
        self
    }

    /// Rung every particle is put on by `assign_rungs`.
    pub(crate) fn with_assigned_rung(mut self, rung: usize) -> Self {
        self.assigned_rung = rung;
        self
    }

    /// Flags the first active particle for an up-jump on the first
    /// `flag_rung_jumps` call.
    pub(crate) fn with_jump_up_once(mut self) -> Self {
        self.jump_up_once = true;
        self
    }

    pub(crate) fn log(&self) -> Log {
        Rc::clone(&self.log)
    }

    pub(crate) fn rungs(&self) -> &[usize] {
        &self.rungs
    }

    fn record(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }
}

/// Number of log entries starting with `prefix`.
pub(crate) fn count(log: &Log, prefix: &str) -> usize {
    log.borrow().iter().filter(|e| e.starts_with(prefix)).count()
}

impl Component for MockComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn species(&self) -> &str {
        &self.species
    }

    fn representation(&self) -> Representation {
        self.representation
    }

    fn forces(&self) -> &[(Force, Method)] {
        &self.forces
    }

    fn potential_gridsize(&self, force: Force, method: Method) -> usize {
        self.potential_gridsizes
            .iter()
            .find(|(key, _)| *key == (force, method))
            .map_or(0, |&(_, size)| size)
    }

    fn gridsize(&self) -> usize {
        self.gridsize
    }

    fn rho_bar(&self) -> f64 {
        self.rho_bar
    }

    fn w(&self, _a: f64) -> f64 {
        self.w
    }

    fn w_eff(&self, _a: f64) -> f64 {
        self.w
    }

    fn w_dot(&self, _a: f64) -> f64 {
        self.w_dot
    }

    fn decay_rate(&self, _a: f64) -> f64 {
        self.decay_rate
    }

    fn is_linear(&self, variable: FluidVariable) -> bool {
        self.linear.contains(&variable)
    }

    fn measure(&self, quantity: Measure) -> f64 {
        self.record(format!("measure {quantity:?}"));
        match quantity {
            Measure::VMax => self.v_max,
            Measure::VRms => self.v_rms,
        }
    }

    fn drift(&mut self, integrals: &Integrals, _a_end: Option<f64>) -> Result<()> {
        self.record(format!("drift {}", integrals.global(GlobalIntegrand::One)));
        Ok(())
    }

    fn realize_if_linear(
        &mut self,
        variable: FluidVariable,
        _a: Option<f64>,
        _a_next: Option<f64>,
    ) -> Result<()> {
        self.record(format!("realize {variable:?}"));
        Ok(())
    }

    fn apply_internal_sources(&mut self, integrals: &Integrals, _a_end: f64) -> Result<()> {
        self.record(format!("sources {}", integrals.global(GlobalIntegrand::One)));
        Ok(())
    }

    fn rung_state(&self) -> Option<&RungState> {
        self.rung_state.as_ref()
    }

    fn rung_state_mut(&mut self) -> Option<&mut RungState> {
        self.rung_state.as_mut()
    }

    fn count_rungs(&mut self) {
        if let Some(state) = self.rung_state.as_mut() {
            state.recount(self.rungs.iter().copied());
        }
    }

    fn assign_rungs(&mut self, _dt: f64, _fac_softening: f64) {
        self.record("assign_rungs".to_owned());
        let rung = self.assigned_rung;
        self.rungs.iter_mut().for_each(|r| *r = rung);
        self.jumps.iter_mut().for_each(|j| *j = 0);
        self.count_rungs();
    }

    fn flag_rung_jumps(
        &mut self,
        _dt: f64,
        _jump_fac: f64,
        _fac_softening: f64,
        _rung_integrals: &RungIntegrals,
    ) -> bool {
        self.record("flag_rung_jumps".to_owned());
        if !std::mem::take(&mut self.jump_up_once) {
            return false;
        }
        let Some(state) = self.rung_state.as_ref() else {
            return false;
        };
        let top = state.n_rungs() - 1;
        match self
            .rungs
            .iter()
            .position(|&r| state.is_active(r) && r < top)
        {
            Some(i) => {
                self.jumps[i] = 1;
                true
            }
            None => false,
        }
    }

    fn apply_rung_jumps(&mut self) {
        self.record("apply_rung_jumps".to_owned());
        for (rung, jump) in self.rungs.iter_mut().zip(self.jumps.iter_mut()) {
            *rung = (*rung as i64 + i64::from(*jump)) as usize;
            *jump = 0;
        }
        self.count_rungs();
    }

    fn nullify_momentum_buffer(&mut self) {
        self.record("nullify".to_owned());
    }

    fn apply_momentum_buffer(&mut self) {
        self.record("apply_momentum".to_owned());
    }

    fn convert_momentum_to_acceleration(&mut self, _rung_integrals: &RungIntegrals) {
        self.record("convert".to_owned());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InteractionCall {
    pub method: Method,
    pub range: Range,
    pub receivers: Vec<usize>,
    pub suppliers: Vec<usize>,
    /// The `1` integral of the scalar table, or of the highest rung slot.
    pub duration: f64,
}

/// An interaction which only records how it was invoked.
#[derive(Default)]
pub(crate) struct RecordingInteraction {
    calls: Rc<RefCell<Vec<InteractionCall>>>,
}

impl RecordingInteraction {
    pub(crate) fn calls(&self) -> Rc<RefCell<Vec<InteractionCall>>> {
        Rc::clone(&self.calls)
    }
}

impl Interaction for RecordingInteraction {
    fn apply(
        &self,
        method: Method,
        _components: &mut [Box<dyn Component>],
        receivers: &[usize],
        suppliers: &[usize],
        integrals: KickIntegrals<'_>,
        range: Range,
        _verbose: bool,
    ) -> Result<()> {
        let duration = match integrals {
            KickIntegrals::Scalar(integrals) => integrals.global(GlobalIntegrand::One),
            KickIntegrals::Rungs(rungs) => {
                rungs.global_kick(GlobalIntegrand::One, rungs.n_rungs() - 1)
            }
        };
        self.calls.borrow_mut().push(InteractionCall {
            method,
            range,
            receivers: receivers.to_vec(),
            suppliers: suppliers.to_vec(),
            duration,
        });
        Ok(())
    }
}

/// An output sink writing a marker file per call and recording the paths.
#[derive(Default)]
pub(crate) struct RecordingOutput {
    written: Rc<RefCell<Vec<(Option<OutputKind>, PathBuf)>>>,
}

impl RecordingOutput {
    pub(crate) fn written(&self) -> Rc<RefCell<Vec<(Option<OutputKind>, PathBuf)>>> {
        Rc::clone(&self.written)
    }
}

impl OutputSink for RecordingOutput {
    fn write(
        &mut self,
        kind: OutputKind,
        _components: &[Box<dyn Component>],
        path: &Path,
    ) -> Result<()> {
        fs::write(path, kind.to_string())?;
        self.written.borrow_mut().push((Some(kind), path.to_path_buf()));
        Ok(())
    }

    fn save_checkpoint(&mut self, _components: &[Box<dyn Component>], path: &Path) -> Result<()> {
        fs::write(path, "checkpoint")?;
        self.written.borrow_mut().push((None, path.to_path_buf()));
        Ok(())
    }
}

/// A subscriber keeping the messages of warning events.
#[derive(Clone, Default)]
pub(crate) struct WarningLog {
    messages: Arc<Mutex<Vec<String>>>,
}

impl WarningLog {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("warning log").clone()
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl Subscriber for WarningLog {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        if *event.metadata().level() != Level::WARN {
            return;
        }
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.messages.lock().expect("warning log").push(visitor.0);
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}
