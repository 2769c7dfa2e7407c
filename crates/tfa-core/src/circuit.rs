//! Electrical component primitives and their arenas.
//!
//! Passenger routing is posed as a minimum-dissipation problem over an
//! electrical analogue of the network. The three primitives here describe
//! convex objective terms and constraints over pairs of potential variables:
//!
//! - [`Resistor`]: energy `0.5 * C * (source - drain)^2`, carrying current
//!   `C * (source - drain)`. Travel links and waiting both reduce to this.
//! - [`Diode`]: the constraint `source - drain <= 0`, a one-way gate that
//!   conducts only when the constraint is tight.
//! - [`CurrentSource`]: the linear term `I * (source - drain)` injecting a
//!   fixed demand between two nodes.
//!
//! Components never hold variable objects. Potentials are arena indices
//! ([`VarId`]) handed out by a [`VarPool`], and components themselves live in
//! a [`CircuitBank`] addressed by typed ids, so the many-to-many references
//! between segments, transfer matrices, and trips stay cycle-free.
//!
//! Each component accumulates the potential differences realized by
//! successful solves. Per-pair subproblems are independent and linear, so a
//! resistor's flows superpose: its aggregate current is the conductance times
//! the sum of recorded voltages.

use thiserror::Error;

use crate::{DiodeId, ResistorId, SourceId, VarId};

/// Errors from component construction and mutation.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ComponentError {
    #[error("conductance must be finite and non-negative, got {0}")]
    InvalidConductance(f64),
    #[error("travel time must be finite and positive, got {0}")]
    InvalidTravelTime(f64),
    #[error("frequency must be finite and positive, got {0}")]
    InvalidFrequency(f64),
    #[error("injection must be finite and non-negative, got {0}")]
    InvalidInjection(f64),
}

/// Hands out fresh potential variables.
///
/// A pool belongs to one circuit; ids from different pools must never be
/// mixed in one problem.
#[derive(Debug, Clone, Default)]
pub struct VarPool {
    next: usize,
}

impl VarPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next potential variable.
    pub fn fresh(&mut self) -> VarId {
        let id = VarId::new(self.next);
        self.next += 1;
        id
    }

    /// Number of variables allocated so far.
    pub fn len(&self) -> usize {
        self.next
    }

    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

/// A conductance between two potentials.
///
/// Conductances are plain data here. The formulation would admit a free
/// conductance with a non-negativity constraint, but nothing in the network
/// construction produces one, so non-negativity is enforced when the value is
/// set instead.
#[derive(Debug, Clone)]
pub struct Resistor {
    source: VarId,
    drain: VarId,
    conductance: f64,
    voltage_sum: f64,
    samples: usize,
}

impl Resistor {
    pub fn new(conductance: f64, source: VarId, drain: VarId) -> Result<Self, ComponentError> {
        if !conductance.is_finite() || conductance < 0.0 {
            return Err(ComponentError::InvalidConductance(conductance));
        }
        Ok(Self {
            source,
            drain,
            conductance,
            voltage_sum: 0.0,
            samples: 0,
        })
    }

    /// Travel link: conductance is the inverse of the travel time.
    pub fn from_travel_time(
        travel_time: f64,
        source: VarId,
        drain: VarId,
    ) -> Result<Self, ComponentError> {
        if !travel_time.is_finite() || travel_time <= 0.0 {
            return Err(ComponentError::InvalidTravelTime(travel_time));
        }
        Self::new(travel_time.recip(), source, drain)
    }

    /// Boarding or transfer wait: the expected wait is half the headway, so
    /// the conductance is twice the service frequency.
    pub fn from_frequency(
        frequency: f64,
        source: VarId,
        drain: VarId,
    ) -> Result<Self, ComponentError> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(ComponentError::InvalidFrequency(frequency));
        }
        Self::new(2.0 * frequency, source, drain)
    }

    pub fn source(&self) -> VarId {
        self.source
    }

    pub fn drain(&self) -> VarId {
        self.drain
    }

    pub fn conductance(&self) -> f64 {
        self.conductance
    }

    pub fn resistance(&self) -> f64 {
        self.conductance.recip()
    }

    pub(crate) fn set_conductance(&mut self, conductance: f64) -> Result<(), ComponentError> {
        if !conductance.is_finite() || conductance < 0.0 {
            return Err(ComponentError::InvalidConductance(conductance));
        }
        self.conductance = conductance;
        Ok(())
    }

    pub(crate) fn record(&mut self, voltage: f64) {
        self.voltage_sum += voltage;
        self.samples += 1;
    }

    pub(crate) fn reset(&mut self) {
        self.voltage_sum = 0.0;
        self.samples = 0;
    }

    /// Aggregate current across all recorded solves.
    pub fn total_current(&self) -> f64 {
        self.conductance * self.voltage_sum
    }

    /// Number of solves recorded since the last reset.
    pub fn samples(&self) -> usize {
        self.samples
    }
}

/// A one-way gate: `source - drain <= 0`.
///
/// The diode contributes nothing to the objective. Flow crosses it only when
/// the constraint is tight; a recorded voltage of zero therefore means the
/// gate conducted in that solve.
#[derive(Debug, Clone)]
pub struct Diode {
    source: VarId,
    drain: VarId,
    voltage_sum: f64,
    samples: usize,
}

impl Diode {
    pub fn new(source: VarId, drain: VarId) -> Self {
        Self {
            source,
            drain,
            voltage_sum: 0.0,
            samples: 0,
        }
    }

    pub fn source(&self) -> VarId {
        self.source
    }

    pub fn drain(&self) -> VarId {
        self.drain
    }

    pub(crate) fn record(&mut self, voltage: f64) {
        self.voltage_sum += voltage;
        self.samples += 1;
    }

    pub(crate) fn reset(&mut self) {
        self.voltage_sum = 0.0;
        self.samples = 0;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }
}

/// A fixed injection between two nodes, as the linear objective term
/// `I * (source - drain)`.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    source: VarId,
    drain: VarId,
    injection: f64,
    voltage_sum: f64,
    samples: usize,
}

impl CurrentSource {
    pub fn new(injection: f64, source: VarId, drain: VarId) -> Result<Self, ComponentError> {
        if !injection.is_finite() || injection < 0.0 {
            return Err(ComponentError::InvalidInjection(injection));
        }
        Ok(Self {
            source,
            drain,
            injection,
            voltage_sum: 0.0,
            samples: 0,
        })
    }

    pub fn source(&self) -> VarId {
        self.source
    }

    pub fn drain(&self) -> VarId {
        self.drain
    }

    pub fn injection(&self) -> f64 {
        self.injection
    }

    pub(crate) fn set_injection(&mut self, injection: f64) -> Result<(), ComponentError> {
        if !injection.is_finite() || injection < 0.0 {
            return Err(ComponentError::InvalidInjection(injection));
        }
        self.injection = injection;
        Ok(())
    }

    pub(crate) fn record(&mut self, voltage: f64) {
        self.voltage_sum += voltage;
        self.samples += 1;
    }

    pub(crate) fn reset(&mut self) {
        self.voltage_sum = 0.0;
        self.samples = 0;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }
}

/// Realized potential differences from one solve, keyed by component id.
///
/// Solvers return these instead of writing into shared component state;
/// recording into the bank happens once, serially, after all solves finish.
#[derive(Debug, Clone, Default)]
pub struct ComponentVoltages {
    pub resistors: Vec<(ResistorId, f64)>,
    pub diodes: Vec<(DiodeId, f64)>,
    pub sources: Vec<(SourceId, f64)>,
}

impl ComponentVoltages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resistors.len() + self.diodes.len() + self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Arena of all circuit components in one network.
#[derive(Debug, Default)]
pub struct CircuitBank {
    resistors: Vec<Resistor>,
    diodes: Vec<Diode>,
    sources: Vec<CurrentSource>,
}

impl CircuitBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_resistor(&mut self, resistor: Resistor) -> ResistorId {
        let id = ResistorId::new(self.resistors.len());
        self.resistors.push(resistor);
        id
    }

    pub(crate) fn add_diode(&mut self, diode: Diode) -> DiodeId {
        let id = DiodeId::new(self.diodes.len());
        self.diodes.push(diode);
        id
    }

    pub(crate) fn add_source(&mut self, source: CurrentSource) -> SourceId {
        let id = SourceId::new(self.sources.len());
        self.sources.push(source);
        id
    }

    pub fn resistor(&self, id: ResistorId) -> Option<&Resistor> {
        self.resistors.get(id.value())
    }

    pub fn diode(&self, id: DiodeId) -> Option<&Diode> {
        self.diodes.get(id.value())
    }

    pub fn source(&self, id: SourceId) -> Option<&CurrentSource> {
        self.sources.get(id.value())
    }

    pub(crate) fn resistor_mut(&mut self, id: ResistorId) -> Option<&mut Resistor> {
        self.resistors.get_mut(id.value())
    }

    pub(crate) fn diode_mut(&mut self, id: DiodeId) -> Option<&mut Diode> {
        self.diodes.get_mut(id.value())
    }

    pub(crate) fn source_mut(&mut self, id: SourceId) -> Option<&mut CurrentSource> {
        self.sources.get_mut(id.value())
    }

    pub fn resistor_count(&self) -> usize {
        self.resistors.len()
    }

    pub fn diode_count(&self) -> usize {
        self.diodes.len()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn resistors(&self) -> impl Iterator<Item = (ResistorId, &Resistor)> {
        self.resistors
            .iter()
            .enumerate()
            .map(|(i, r)| (ResistorId::new(i), r))
    }

    pub fn diodes(&self) -> impl Iterator<Item = (DiodeId, &Diode)> {
        self.diodes
            .iter()
            .enumerate()
            .map(|(i, d)| (DiodeId::new(i), d))
    }

    pub fn sources(&self) -> impl Iterator<Item = (SourceId, &CurrentSource)> {
        self.sources
            .iter()
            .enumerate()
            .map(|(i, s)| (SourceId::new(i), s))
    }

    pub(crate) fn reset(&mut self) {
        for resistor in &mut self.resistors {
            resistor.reset();
        }
        for diode in &mut self.diodes {
            diode.reset();
        }
        for source in &mut self.sources {
            source.reset();
        }
    }
}
