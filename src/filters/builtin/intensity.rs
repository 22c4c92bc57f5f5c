//! Per-pixel intensity mappings.

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::node::{Category, NodeMetadata};
use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
use crate::core::raster::SampleType;
use crate::core::types::{Value, ValueType};
use crate::filters::functor::{UnaryFunctor, UnaryFunctorFilter};
use crate::filters::registry::FilterRegistry;

/// Register the intensity filters.
pub fn register<const D: usize>(registry: &mut FilterRegistry<D>) {
    registry.register(|| Box::new(ClampFilter::new(ClampFunctor::default())));
    registry.register(|| Box::new(ShiftScaleFilter::new(ShiftScaleFunctor::default())));
}

/// Limits every component to `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampFunctor {
    lower: f64,
    upper: f64,
}

pub type ClampFilter = UnaryFunctorFilter<ClampFunctor>;

impl ClampFunctor {
    pub fn new(lower: f64, upper: f64) -> PipelineResult<Self> {
        check_bounds(lower, upper)?;
        Ok(Self { lower, upper })
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }
}

impl Default for ClampFunctor {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: 255.0,
        }
    }
}

fn check_bounds(lower: f64, upper: f64) -> PipelineResult<()> {
    if lower.is_nan() || upper.is_nan() {
        return Err(PipelineError::configuration("lower", "bounds must be numbers"));
    }
    if lower > upper {
        return Err(PipelineError::configuration(
            "lower",
            format!("lower bound {} is above upper bound {}", lower, upper),
        ));
    }
    Ok(())
}

impl UnaryFunctor for ClampFunctor {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("clamp", "Clamp")
            .category(Category::Intensity)
            .description("Limits every component to [lower, upper]")
            .input(PortDefinition::new("image"))
            .parameter(ParameterDefinition::new("lower", ValueType::Float, Value::Float(0.0)))
            .parameter(ParameterDefinition::new("upper", ValueType::Float, Value::Float(255.0)))
            .build()
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> PipelineResult<()> {
        self.metadata().validate_parameter(name, value)?;
        let value = value
            .as_float()
            .ok_or_else(|| PipelineError::configuration(name, "expected a number"))?;
        let (lower, upper) = match name {
            "lower" => (value, self.upper),
            "upper" => (self.lower, value),
            _ => return Err(PipelineError::configuration(name, "unknown parameter")),
        };
        check_bounds(lower, upper)?;
        self.lower = lower;
        self.upper = upper;
        Ok(())
    }

    fn apply(&self, pixel: &[f64], out: &mut [f64]) {
        for (o, v) in out.iter_mut().zip(pixel) {
            *o = v.clamp(self.lower, self.upper);
        }
    }
}

/// `(value + shift) * scale`, written as `sample_type`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftScaleFunctor {
    shift: f64,
    scale: f64,
    sample_type: Option<SampleType>,
}

pub type ShiftScaleFilter = UnaryFunctorFilter<ShiftScaleFunctor>;

impl ShiftScaleFunctor {
    pub fn new(shift: f64, scale: f64) -> Self {
        Self {
            shift,
            scale,
            sample_type: None,
        }
    }

    /// Output sample type; the input's when unset.
    pub fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = Some(sample_type);
        self
    }
}

impl Default for ShiftScaleFunctor {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

impl UnaryFunctor for ShiftScaleFunctor {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("shift_scale", "Shift and Scale")
            .category(Category::Intensity)
            .description("Adds a shift then multiplies by a scale")
            .input(PortDefinition::new("image"))
            .parameter(ParameterDefinition::new("shift", ValueType::Float, Value::Float(0.0)))
            .parameter(ParameterDefinition::new("scale", ValueType::Float, Value::Float(1.0)))
            .parameter(
                ParameterDefinition::new("sample_type", ValueType::String, Value::from("input"))
                    .with_description("Output sample type, or 'input' to keep the input's")
                    .with_constraint(Constraint::OneOf(
                        ["input", "u8", "u16", "i16", "i32", "f32", "f64"]
                            .iter()
                            .map(|s| s.to_string())
                            .collect(),
                    )),
            )
            .build()
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> PipelineResult<()> {
        self.metadata().validate_parameter(name, value)?;
        match name {
            "shift" | "scale" => {
                let number = value
                    .as_float()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| PipelineError::configuration(name, "expected a finite number"))?;
                if name == "shift" {
                    self.shift = number;
                } else {
                    self.scale = number;
                }
            }
            "sample_type" => {
                self.sample_type = match value.as_string().unwrap_or_default() {
                    "input" => None,
                    other => Some(other.parse()?),
                };
            }
            _ => return Err(PipelineError::configuration(name, "unknown parameter")),
        }
        Ok(())
    }

    fn output_sample_type(&self, input: SampleType) -> SampleType {
        self.sample_type.unwrap_or(input)
    }

    fn apply(&self, pixel: &[f64], out: &mut [f64]) {
        for (o, v) in out.iter_mut().zip(pixel) {
            *o = (v + self.shift) * self.scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::FilterNode;

    #[test]
    fn test_clamp() {
        let functor = ClampFunctor::new(10.0, 20.0).unwrap();
        let mut out = [0.0; 3];
        functor.apply(&[5.0, 15.0, 25.0], &mut out);
        assert_eq!(out, [10.0, 15.0, 20.0]);
        assert!(ClampFunctor::new(3.0, 1.0).is_err());
    }

    #[test]
    fn test_clamp_parameters_keep_order() {
        let mut filter = ClampFilter::new(ClampFunctor::default());
        FilterNode::<2>::set_parameter(&mut filter, "upper", &Value::Float(100.0)).unwrap();
        assert!(matches!(
            FilterNode::<2>::set_parameter(&mut filter, "lower", &Value::Float(101.0)),
            Err(PipelineError::Configuration { .. })
        ));
        assert_eq!(filter.functor().bounds(), (0.0, 100.0));
    }

    #[test]
    fn test_shift_scale() {
        let functor = ShiftScaleFunctor::new(-10.0, 0.5).with_sample_type(SampleType::F32);
        let mut out = [0.0];
        functor.apply(&[30.0], &mut out);
        assert_eq!(out[0], 10.0);
        assert_eq!(functor.output_sample_type(SampleType::U8), SampleType::F32);

        let mut filter = ShiftScaleFilter::new(ShiftScaleFunctor::default());
        FilterNode::<2>::set_parameter(&mut filter, "sample_type", &Value::from("u16")).unwrap();
        assert_eq!(filter.functor().output_sample_type(SampleType::U8), SampleType::U16);
        FilterNode::<2>::set_parameter(&mut filter, "sample_type", &Value::from("input")).unwrap();
        assert_eq!(filter.functor().output_sample_type(SampleType::U8), SampleType::U8);
        assert!(FilterNode::<2>::set_parameter(&mut filter, "scale", &Value::Float(f64::INFINITY)).is_err());
    }
}
