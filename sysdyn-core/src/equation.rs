//! Equations: the nodes of the simulated network.
//!
//! An [`Equation`] combines an identity ([`Variable`]), a behavior
//! ([`Kind`]) and an optional update function. The update function slot is
//! interpreted per kind: it produces the value itself for auxiliaries and
//! rates, the net flow for levels (the engine owns the integration step) and
//! the lookup source for tables. Lag operators ignore it; their recurrence is
//! built in.

use crate::diagnostics::is_almost_zero;
use crate::lag::{Delay, PipelineDelay, Smooth};
use crate::state::{FloatValue, Values};
use crate::table::Table;

/// Handle of a registered equation, valid for the owning simulator's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EquationId(pub(crate) usize);

/// Update function attached to an equation.
///
/// The function may read any other equation's current or previous value but
/// cannot mutate the network.
pub type UpdateFn = Box<dyn Fn(&Values) -> FloatValue>;

/// Identity and diagnostic constraints of an equation.
#[derive(Debug, Clone)]
pub struct Variable {
    pub(crate) name: String,
    pub(crate) units: String,
    pub(crate) sector: Option<String>,
    pub(crate) sub_sector: Option<String>,
    pub(crate) cannot_be_negative: bool,
    pub(crate) cannot_be_zero: bool,
}

impl Variable {
    pub(crate) fn new(name: &str, units: &str) -> Self {
        Self {
            name: name.to_string(),
            units: units.to_string(),
            sector: None,
            sub_sector: None,
            cannot_be_negative: false,
            cannot_be_zero: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    /// Sector label stamped at registration time, used only for display.
    pub fn sector(&self) -> Option<&str> {
        self.sector.as_deref()
    }

    pub fn sub_sector(&self) -> Option<&str> {
        self.sub_sector.as_deref()
    }

    /// Display form of the raw name, e.g. `birthsPerYear` -> `Births Per Year`.
    pub fn friendly_name(&self) -> String {
        wordify(&self.name)
    }

    pub fn friendly_units(&self) -> String {
        wordify(&self.units)
    }
}

/// Capitalize the first character and split camelCase words with spaces.
fn wordify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    for (index, c) in raw.chars().enumerate() {
        if index == 0 {
            out.extend(c.to_uppercase());
        } else {
            if c.is_uppercase() {
                out.push(' ');
            }
            out.push(c);
        }
    }
    out
}

/// Behavior of an equation.
pub(crate) enum Kind {
    Auxiliary,
    Rate,
    Level { initial: FloatValue },
    Table(Table),
    Smooth(Smooth),
    Delay(Delay),
    PipelineDelay(PipelineDelay),
}

pub struct Equation {
    pub(crate) variable: Variable,
    pub(crate) kind: Kind,
    pub(crate) update: Option<UpdateFn>,
    pub(crate) evaluation_order: i32,
    pub(crate) logging: bool,
    pub(crate) log: Option<Vec<FloatValue>>,
    // Envelope of the values observed while logging, MAX/MIN until the first
    // sample lands.
    pub(crate) min_observed: FloatValue,
    pub(crate) max_observed: FloatValue,
}

impl Equation {
    pub(crate) fn new(variable: Variable, kind: Kind) -> Self {
        Self {
            variable,
            kind,
            update: None,
            evaluation_order: 0,
            logging: false,
            log: None,
            min_observed: FloatValue::MAX,
            max_observed: FloatValue::MIN,
        }
    }

    pub fn name(&self) -> &str {
        self.variable.name()
    }

    pub fn units(&self) -> &str {
        self.variable.units()
    }

    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    /// Position in the ordered auxiliary pass; 0 for anything never named in
    /// the declared sequence.
    pub fn evaluation_order(&self) -> i32 {
        self.evaluation_order
    }

    /// Samples collected since logging was armed, if any.
    pub fn logged(&self) -> Option<&[FloatValue]> {
        self.log.as_deref()
    }

    /// Smallest value observed while logging was active.
    pub fn min_observed(&self) -> Option<FloatValue> {
        (self.min_observed <= self.max_observed).then_some(self.min_observed)
    }

    /// Largest value observed while logging was active.
    pub fn max_observed(&self) -> Option<FloatValue> {
        (self.min_observed <= self.max_observed).then_some(self.max_observed)
    }

    /// Logged sample scaled into `[0, 1]` by the observed envelope.
    ///
    /// Returns 0 when nothing was observed or the envelope degenerates to a
    /// point, so a flat signal plots as a flat zero line rather than NaN.
    pub fn normalized_logged_value(&self, index: usize) -> FloatValue {
        let Some(log) = &self.log else {
            return 0.0;
        };
        if self.min_observed > self.max_observed {
            return 0.0;
        }
        let range = self.max_observed - self.min_observed;
        if is_almost_zero(range) {
            return 0.0;
        }
        (log[index] - self.min_observed) / range
    }

    pub(crate) fn arm_logging(&mut self) {
        self.logging = true;
        self.log = Some(Vec::with_capacity(512));
        self.min_observed = FloatValue::MAX;
        self.max_observed = FloatValue::MIN;
    }

    pub(crate) fn clear_logging(&mut self) {
        self.logging = false;
        self.log = None;
        self.min_observed = FloatValue::MAX;
        self.max_observed = FloatValue::MIN;
    }

    pub(crate) fn observe(&mut self, value: FloatValue) {
        if value > self.max_observed {
            self.max_observed = value;
        }
        if value < self.min_observed {
            self.min_observed = value;
        }
    }
}
