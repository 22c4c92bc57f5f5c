//! Alpha blending of two images.

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::node::{Category, NodeMetadata};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::types::{Value, ValueType};
use crate::filters::functor::{BinaryFunctor, BinaryFunctorFilter};
use crate::filters::registry::FilterRegistry;

/// Register the blend filter.
pub fn register<const D: usize>(registry: &mut FilterRegistry<D>) {
    registry.register(|| Box::new(AlphaBlendFilter::new(AlphaBlendFunctor::new(0.5))));
}

/// `(1 - alpha) * first + alpha * second`, per component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlphaBlendFunctor {
    alpha: f64,
}

pub type AlphaBlendFilter = BinaryFunctorFilter<AlphaBlendFunctor>;

impl AlphaBlendFunctor {
    /// Alpha is clamped to `[0, 1]`.
    pub fn new(alpha: f64) -> Self {
        let mut functor = Self { alpha: 0.5 };
        if alpha.is_finite() {
            functor.alpha = alpha.clamp(0.0, 1.0);
        }
        functor
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl BinaryFunctor for AlphaBlendFunctor {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("alpha_blend", "Alpha Blend")
            .category(Category::Composite)
            .description("Weighted mix of two images of equal extent and band count")
            .input(PortDefinition::new("first"))
            .input(PortDefinition::new("second"))
            .parameter(
                ParameterDefinition::new("alpha", ValueType::Float, Value::Float(0.5))
                    .with_description("Weight of the second image, clamped to [0, 1]"),
            )
            .build()
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> PipelineResult<()> {
        self.metadata().validate_parameter(name, value)?;
        match value.as_float() {
            Some(alpha) if alpha.is_finite() => {
                self.alpha = alpha.clamp(0.0, 1.0);
                Ok(())
            }
            _ => Err(PipelineError::configuration(name, "alpha must be a finite number")),
        }
    }

    fn apply(&self, first: &[f64], second: &[f64], out: &mut [f64]) {
        for ((o, a), b) in out.iter_mut().zip(first).zip(second) {
            *o = (1.0 - self.alpha) * a + self.alpha * b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::FilterNode;

    #[test]
    fn test_blend_value() {
        let functor = AlphaBlendFunctor::new(0.25);
        let mut out = [0.0];
        functor.apply(&[100.0], &[200.0], &mut out);
        assert_eq!(out[0], 125.0);
    }

    #[test]
    fn test_alpha_clamped() {
        assert_eq!(AlphaBlendFunctor::new(1.7).alpha(), 1.0);
        assert_eq!(AlphaBlendFunctor::new(-3.0).alpha(), 0.0);

        let mut filter = AlphaBlendFilter::new(AlphaBlendFunctor::new(0.5));
        FilterNode::<2>::set_parameter(&mut filter, "alpha", &Value::Integer(2)).unwrap();
        assert_eq!(filter.functor().alpha(), 1.0);
        assert!(FilterNode::<2>::set_parameter(&mut filter, "alpha", &Value::Float(f64::NAN)).is_err());
        assert!(FilterNode::<2>::set_parameter(&mut filter, "alpha", &Value::from("half")).is_err());
    }
}
