//! User-editable model parameters.
//!
//! Parameters follow a two-phase edit protocol so an interactive shell can
//! bind sliders directly to them: `edited_value` is mutated freely while the
//! user drags, then [`ParameterSet::commit_edits`] copies edited -> current
//! for the next run, or [`ParameterSet::cancel_edits`] throws the edits away.
//! Models read only `current_value`, typically inside `parametrize`.

use serde::{Deserialize, Serialize};

use crate::errors::{SimError, SimResult};
use crate::state::FloatValue;

/// Widget the display layer should bind this parameter to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Widget {
    #[default]
    Slider,
    Switch,
}

/// Display format for the parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NumberFormat {
    Integer,
    #[default]
    Float,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub default_value: FloatValue,
    pub min: FloatValue,
    pub max: FloatValue,
    pub step: FloatValue,
    #[serde(default)]
    pub widget: Widget,
    #[serde(default)]
    pub format: NumberFormat,
    /// Equation this parameter feeds, if the display layer wants to show the
    /// link. Purely informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equation_name: Option<String>,
    #[serde(skip)]
    current_value: FloatValue,
    #[serde(skip)]
    edited_value: FloatValue,
}

impl Parameter {
    pub fn new(
        name: &str,
        default_value: FloatValue,
        min: FloatValue,
        max: FloatValue,
        step: FloatValue,
    ) -> Self {
        Self {
            name: name.to_string(),
            default_value,
            min,
            max,
            step,
            widget: Widget::default(),
            format: NumberFormat::default(),
            equation_name: None,
            current_value: default_value,
            edited_value: default_value,
        }
    }

    pub fn with_widget(mut self, widget: Widget) -> Self {
        self.widget = widget;
        self
    }

    pub fn with_format(mut self, format: NumberFormat) -> Self {
        self.format = format;
        self
    }

    pub fn for_equation(mut self, equation_name: &str) -> Self {
        self.equation_name = Some(equation_name.to_string());
        self
    }

    /// Value the model reads during `parametrize`.
    pub fn current_value(&self) -> FloatValue {
        self.current_value
    }

    pub fn edited_value(&self) -> FloatValue {
        self.edited_value
    }

    /// Stage a new value without affecting the running model.
    pub fn set_edited_value(&mut self, value: FloatValue) {
        self.edited_value = value;
    }

    pub fn reset_to_default(&mut self) {
        self.current_value = self.default_value;
        self.edited_value = self.default_value;
    }

    pub fn commit_edits(&mut self) {
        self.current_value = self.edited_value;
    }

    pub fn cancel_edits(&mut self) {
        self.edited_value = self.default_value;
    }
}

/// The parameters of a model, looked up by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterSet {
    parameters: Vec<Parameter>,
}

impl ParameterSet {
    /// Build a set with every parameter at its default value.
    pub fn new(mut parameters: Vec<Parameter>) -> Self {
        for parameter in &mut parameters {
            parameter.reset_to_default();
        }
        Self { parameters }
    }

    /// Load parameter definitions from TOML text.
    ///
    /// Expects a `[[parameter]]` table array; every loaded parameter starts at
    /// its default value.
    pub fn from_toml_str(text: &str) -> SimResult<Self> {
        #[derive(Deserialize)]
        struct ParameterFile {
            #[serde(default)]
            parameter: Vec<Parameter>,
        }
        let file: ParameterFile = toml::from_str(text)?;
        Ok(Self::new(file.parameter))
    }

    /// Current value of a named parameter.
    pub fn get(&self, name: &str) -> SimResult<FloatValue> {
        Ok(self.from_name(name)?.current_value())
    }

    pub fn from_name(&self, name: &str) -> SimResult<&Parameter> {
        self.parameters
            .iter()
            .find(|parameter| parameter.name == name)
            .ok_or_else(|| SimError::UnknownParameter(name.to_string()))
    }

    pub fn from_name_mut(&mut self, name: &str) -> SimResult<&mut Parameter> {
        self.parameters
            .iter_mut()
            .find(|parameter| parameter.name == name)
            .ok_or_else(|| SimError::UnknownParameter(name.to_string()))
    }

    pub fn all(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn to_defaults(&mut self) {
        for parameter in &mut self.parameters {
            parameter.reset_to_default();
        }
    }

    pub fn commit_edits(&mut self) {
        for parameter in &mut self.parameters {
            parameter.commit_edits();
        }
    }

    pub fn cancel_edits(&mut self) {
        for parameter in &mut self.parameters {
            parameter.cancel_edits();
        }
    }
}
