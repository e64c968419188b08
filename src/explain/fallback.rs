use tracing::debug;

use crate::error::ExplainError;
use crate::explain::cam::ClassActivationMap;
use crate::explain::capture::{one_hot, resolve_target_class};
use crate::math::tensor::ImageTensor;
use crate::network::classifier::Classifier;
use crate::network::context::EvalContext;

/// Input-gradient saliency.
///
/// Backpropagates the target score all the way to the input, takes the
/// absolute gradient, keeps the largest value across color channels and
/// normalizes. Needs no instrumentation, so it works for any classifier that
/// is differentiable end to end. The map has the input's resolution.
///
/// Returns the map and the class it explains.
pub fn input_gradient_saliency<C>(
    classifier: &C,
    image: &ImageTensor,
    target_class: Option<usize>,
) -> Result<(ClassActivationMap, usize), ExplainError>
where
    C: Classifier + ?Sized,
{
    let mut ctx = EvalContext::with_input_grad();
    let scores = classifier.forward(image, &mut ctx)?;
    let target_class = resolve_target_class(&scores, target_class)?;

    ctx.zero_grad();
    classifier.backward(&mut ctx, &one_hot(scores.len(), target_class))?;

    let grad = ctx.input_grad().ok_or_else(|| ExplainError::InstrumentationFailure {
        layer: "input".into(),
        reason: "classifier produced no input gradient".into(),
    })?;

    let shape = grad.shape;
    let mut raw = vec![0.0f64; shape.plane()];
    for c in 0..shape.channels {
        for (r, g) in raw.iter_mut().zip(grad.channel(c)) {
            *r = r.max(g.abs());
        }
    }

    debug!(target_class, height = shape.height, width = shape.width, "input-gradient saliency computed");

    let map = ClassActivationMap::from_raw(shape.height, shape.width, raw).map_err(|err| {
        ExplainError::InstrumentationFailure { layer: "input".into(), reason: err.to_string() }
    })?;
    Ok((map, target_class))
}
