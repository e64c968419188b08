use crate::error::TensorError;
use crate::instrument::registry::SessionId;
use crate::math::tensor::Tensor3;

/// Gradients accumulated during one request.
///
/// Like a framework's `.grad` fields, backward passes add into the buffer;
/// unlike them, it belongs to a single request and is dropped with it.
#[derive(Debug, Default)]
pub struct GradientBuffer {
    input: Option<Tensor3>,
}

impl GradientBuffer {
    pub fn zero(&mut self) {
        self.input = None;
    }

    pub fn input(&self) -> Option<&Tensor3> {
        self.input.as_ref()
    }

    pub fn accumulate_input(&mut self, grad: Tensor3) -> Result<(), TensorError> {
        match &mut self.input {
            Some(existing) => existing.accumulate(&grad),
            None => {
                self.input = Some(grad);
                Ok(())
            }
        }
    }
}

/// Request-scoped evaluation state: the inputs each layer saw during the last
/// forward pass, the gradient buffer, and the instrumentation session (if
/// any) whose hooks should observe this evaluation.
#[derive(Debug, Default)]
pub struct EvalContext {
    tape: Vec<Tensor3>,
    requires_input_grad: bool,
    session: Option<SessionId>,
    grads: GradientBuffer,
}

impl EvalContext {
    pub fn new() -> Self {
        EvalContext::default()
    }

    /// Context whose backward pass also produces d(score)/d(input).
    pub fn with_input_grad() -> Self {
        EvalContext { requires_input_grad: true, ..EvalContext::default() }
    }

    /// Binds the context to an instrumentation session so its hooks fire.
    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn requires_input_grad(&self) -> bool {
        self.requires_input_grad
    }

    pub fn zero_grad(&mut self) {
        self.grads.zero();
    }

    pub fn input_grad(&self) -> Option<&Tensor3> {
        self.grads.input()
    }

    pub fn grads_mut(&mut self) -> &mut GradientBuffer {
        &mut self.grads
    }

    /// Forgets the previous forward pass.
    pub fn reset_tape(&mut self) {
        self.tape.clear();
    }

    pub fn record(&mut self, layer_input: Tensor3) {
        self.tape.push(layer_input);
    }

    pub fn tape(&self) -> &[Tensor3] {
        &self.tape
    }
}
