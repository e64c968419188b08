use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::error::{EvalError, ExplainError};
use crate::explain::locator::TargetLayer;
use crate::math::tensor::{ImageTensor, Tensor3};
use crate::network::classifier::Classifier;
use crate::network::context::EvalContext;

/// Activations of the instrumented layer and the gradient of the target
/// score w.r.t. them, from one forward+backward pass.
#[derive(Debug, Clone)]
pub struct CapturedTensors {
    pub activations: Tensor3,
    pub gradients: Tensor3,
}

/// Result of [`capture`].
#[derive(Debug, Clone)]
pub struct Capture {
    pub tensors: CapturedTensors,
    /// The class the gradients were taken for.
    pub target_class: usize,
    pub scores: Vec<f64>,
}

/// What one hook saw: the first tensor and how often it fired.
#[derive(Debug, Default)]
struct Slot {
    tensor: Option<Tensor3>,
    fired: usize,
}

impl Slot {
    fn record(&mut self, tensor: &Tensor3) {
        if self.tensor.is_none() {
            self.tensor = Some(tensor.clone());
        }
        self.fired += 1;
    }
}

type SharedSlot = Arc<Mutex<Slot>>;

fn take(slot: &SharedSlot) -> Slot {
    std::mem::take(&mut *slot.lock().unwrap_or_else(PoisonError::into_inner))
}

/// Index of the highest score; the first one wins ties.
pub(crate) fn argmax(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, &score) in scores.iter().enumerate() {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

/// Uses `requested` when given, otherwise the top-scoring class.
pub(crate) fn resolve_target_class(scores: &[f64], requested: Option<usize>) -> Result<usize, EvalError> {
    let num_classes = scores.len();
    match requested {
        Some(class) if class < num_classes => Ok(class),
        Some(class) => Err(EvalError::TargetClassOutOfRange { class, num_classes }),
        None => argmax(scores).ok_or(EvalError::EmptyScores),
    }
}

/// Gradient seed selecting a single class score.
pub(crate) fn one_hot(len: usize, class: usize) -> Vec<f64> {
    let mut seed = vec![0.0; len];
    seed[class] = 1.0;
    seed
}

/// Runs one instrumented forward+backward pass and returns what `layer`
/// produced and received.
///
/// Hooks live exactly as long as the instrumentation scope opened here; the
/// scope is released on every return path, including `?` exits. Concurrent
/// callers on the same classifier wait for each other.
pub fn capture<C>(
    classifier: &C,
    layer: &TargetLayer,
    image: &ImageTensor,
    target_class: Option<usize>,
) -> Result<Capture, ExplainError>
where
    C: Classifier + ?Sized,
{
    let activations: SharedSlot = Arc::default();
    let gradients: SharedSlot = Arc::default();

    let mut scope = classifier.hooks().instrument();
    {
        let slot = Arc::clone(&activations);
        scope.on_forward(layer.id, move |output| {
            slot.lock().unwrap_or_else(PoisonError::into_inner).record(output)
        });
        let slot = Arc::clone(&gradients);
        scope.on_backward(layer.id, move |grad| {
            slot.lock().unwrap_or_else(PoisonError::into_inner).record(grad)
        });
    }

    let mut ctx = EvalContext::new().with_session(scope.session());
    let scores = classifier.forward(image, &mut ctx)?;
    let target_class = resolve_target_class(&scores, target_class)?;

    ctx.zero_grad();
    classifier.backward(&mut ctx, &one_hot(scores.len(), target_class))?;
    drop(scope);

    let activations = take(&activations);
    let gradients = take(&gradients);
    debug!(
        layer = %layer.name,
        target_class,
        forward_hits = activations.fired,
        backward_hits = gradients.fired,
        "capture finished"
    );

    let failure = |reason: String| ExplainError::InstrumentationFailure {
        layer: layer.name.clone(),
        reason,
    };

    let (Some(activations_tensor), Some(gradients_tensor)) = (activations.tensor, gradients.tensor) else {
        return Err(failure(format!(
            "forward hook fired {} times, backward hook fired {} times",
            activations.fired, gradients.fired
        )));
    };
    if activations.fired != 1 || gradients.fired != 1 {
        return Err(failure(format!(
            "layer was evaluated {} times forward and {} times backward",
            activations.fired, gradients.fired
        )));
    }
    if activations_tensor.shape != gradients_tensor.shape {
        return Err(failure(format!(
            "activations {} and gradients {} differ in shape",
            activations_tensor.shape, gradients_tensor.shape
        )));
    }

    Ok(Capture {
        tensors: CapturedTensors { activations: activations_tensor, gradients: gradients_tensor },
        target_class,
        scores,
    })
}
