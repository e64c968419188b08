use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::error::{EvalError, ModelError};
use crate::instrument::registry::{HookKind, HookRegistry};
use crate::layers::layer::Layer;
use crate::math::tensor::{ImageTensor, Shape, Tensor3};
use crate::network::classifier::{Classifier, LayerId, LayerInfo};
use crate::network::context::EvalContext;
use crate::network::metadata::ModelMetadata;
use crate::network::spec::NetworkSpec;

/// A layer together with its position in the architecture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedLayer {
    /// `<block>.<index>`
    pub name: String,
    pub block: String,
    pub layer: Layer,
    pub output_shape: Shape,
}

/// Inference-only feed-forward network over a single C×H×W image.
///
/// The network itself is immutable during evaluation; everything a pass
/// produces is written to the caller's `EvalContext`, so one `Network` can be
/// shared behind an `Arc` by concurrent requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub input_shape: Shape,
    pub layers: Vec<NamedLayer>,
    #[serde(default)]
    pub metadata: ModelMetadata,
    #[serde(skip)]
    hooks: HookRegistry,
}

impl Network {
    /// Builds a network from `spec`, drawing initial weights from a generator
    /// seeded with `seed`.
    pub fn from_spec(spec: &NetworkSpec, seed: u64) -> Result<Network, ModelError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut shape = spec.input_shape;
        let mut layers = Vec::new();

        for block in &spec.blocks {
            for (index, layer_spec) in block.layers.iter().enumerate() {
                let layer = layer_spec.build(shape, &mut rng)?;
                let output_shape = layer.output_shape(shape)?;
                layers.push(NamedLayer {
                    name: format!("{}.{}", block.name, index),
                    block: block.name.clone(),
                    layer,
                    output_shape,
                });
                shape = output_shape;
            }
        }

        let network = Network {
            name: spec.name.clone(),
            input_shape: spec.input_shape,
            layers,
            metadata: spec.metadata.clone().unwrap_or_default(),
            hooks: HookRegistry::new(),
        };
        network.validate()?;
        debug!(name = %network.name, layers = network.layers.len(), "network built");
        Ok(network)
    }

    /// Re-derives every layer's output shape from the input shape and checks
    /// that the network ends in a non-empty score vector with usable input
    /// normalization.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.layers.is_empty() {
            return Err(ModelError::InvalidSpec("network has no layers".into()));
        }
        self.metadata.normalization().validate().map_err(ModelError::InvalidSpec)?;
        let mut shape = self.input_shape;
        for named in &self.layers {
            named.layer.validate()?;
            shape = named.layer.output_shape(shape)?;
            if shape != named.output_shape {
                return Err(ModelError::InvalidSpec(format!(
                    "layer '{}' declares output {} but produces {}",
                    named.name, named.output_shape, shape
                )));
            }
        }
        if shape.height != 1 || shape.width != 1 || shape.channels == 0 {
            return Err(ModelError::InvalidSpec(format!(
                "network must end in a score vector, ends in {}",
                shape
            )));
        }
        Ok(())
    }

    pub fn labels(&self) -> Vec<String> {
        self.metadata.labels(self.num_classes())
    }

    /// Serializes the network weights to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<(), ModelError> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a network from a JSON file previously written by
    /// `save_json`, and validates it.
    pub fn load_json(path: &str) -> Result<Network, ModelError> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let network: Network = serde_json::from_reader(reader)?;
        network.validate()?;
        Ok(network)
    }
}

impl Classifier for Network {
    fn input_shape(&self) -> Shape {
        self.input_shape
    }

    fn num_classes(&self) -> usize {
        self.layers.last().map(|named| named.output_shape.len()).unwrap_or(0)
    }

    fn layers(&self) -> Vec<LayerInfo> {
        self.layers
            .iter()
            .enumerate()
            .map(|(index, named)| LayerInfo {
                id: LayerId(index),
                name: named.name.clone(),
                block: named.block.clone(),
                kind: named.layer.kind(),
                output_shape: named.output_shape,
            })
            .collect()
    }

    fn forward(&self, input: &ImageTensor, ctx: &mut EvalContext) -> Result<Vec<f64>, EvalError> {
        if input.shape != self.input_shape {
            return Err(EvalError::InputShape { expected: self.input_shape, got: input.shape });
        }
        ctx.reset_tape();

        let mut current = input.clone();
        for (index, named) in self.layers.iter().enumerate() {
            let output = named.layer.forward(&current).map_err(|source| EvalError::Layer {
                layer: named.name.clone(),
                source,
            })?;
            self.hooks.fire(ctx.session(), LayerId(index), HookKind::Forward, &output);
            ctx.record(current);
            current = output;
        }

        if current.data.is_empty() {
            return Err(EvalError::EmptyScores);
        }
        Ok(current.data)
    }

    fn backward(&self, ctx: &mut EvalContext, seed: &[f64]) -> Result<(), EvalError> {
        if ctx.tape().len() != self.layers.len() {
            return Err(EvalError::MissingForward);
        }
        let num_classes = self.num_classes();
        if seed.len() != num_classes {
            return Err(EvalError::SeedLength { expected: num_classes, got: seed.len() });
        }

        let mut grad = Tensor3::from_data(Shape::vector(num_classes), seed.to_vec())?;
        for (index, named) in self.layers.iter().enumerate().rev() {
            // the hook sees d(score)/d(layer output)
            self.hooks.fire(ctx.session(), LayerId(index), HookKind::Backward, &grad);
            grad = named.layer.backward(&ctx.tape()[index], &grad).map_err(|source| {
                EvalError::Layer { layer: named.name.clone(), source }
            })?;
        }

        if ctx.requires_input_grad() {
            ctx.grads_mut().accumulate_input(grad)?;
        }
        Ok(())
    }

    fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::activation::ActivationFunction;
    use crate::network::metadata::Normalization;
    use crate::network::spec::{BlockSpec, LayerSpec};
    use approx::assert_abs_diff_eq;
    use rand::Rng;

    fn random_image(shape: Shape, seed: u64) -> ImageTensor {
        let mut rng = StdRng::seed_from_u64(seed);
        Tensor3::from_fn(shape, |_, _, _| rng.gen::<f64>() * 2.0 - 1.0)
    }

    fn smooth_spec() -> NetworkSpec {
        let tanh = LayerSpec::Activation { function: ActivationFunction::Tanh };
        NetworkSpec {
            name: "smooth".into(),
            input_shape: Shape::new(2, 6, 6),
            blocks: vec![
                BlockSpec::new("features", vec![
                    LayerSpec::Conv2d { out_channels: 3, kernel_size: 3, stride: 1, padding: 1 },
                    tanh.clone(),
                    LayerSpec::Conv2d { out_channels: 2, kernel_size: 3, stride: 2, padding: 1 },
                    tanh,
                ]),
                BlockSpec::new("head", vec![
                    LayerSpec::GlobalAvgPool,
                    LayerSpec::Linear { out_features: 3 },
                ]),
            ],
            metadata: None,
        }
    }

    fn score(network: &Network, input: &ImageTensor, class: usize) -> f64 {
        network.forward(input, &mut EvalContext::new()).unwrap()[class]
    }

    /// Compares the analytic input gradient with central differences.
    fn assert_input_gradient_matches(network: &Network, input: &ImageTensor, class: usize, tol: f64) {
        let mut ctx = EvalContext::with_input_grad();
        network.forward(input, &mut ctx).unwrap();
        let mut seed = vec![0.0; network.num_classes()];
        seed[class] = 1.0;
        network.backward(&mut ctx, &seed).unwrap();
        let analytic = ctx.input_grad().unwrap().clone();

        let eps = 1e-6;
        for i in 0..input.data.len() {
            let mut plus = input.clone();
            plus.data[i] += eps;
            let mut minus = input.clone();
            minus.data[i] -= eps;
            let numeric = (score(network, &plus, class) - score(network, &minus, class)) / (2.0 * eps);
            assert_abs_diff_eq!(analytic.data[i], numeric, epsilon = tol);
        }
    }

    #[test]
    fn from_spec_names_layers_by_block() {
        let net = Network::from_spec(&smooth_spec(), 1).unwrap();
        let names: Vec<String> = net.layers().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["features.0", "features.1", "features.2", "features.3", "head.0", "head.1"]);
        assert_eq!(net.num_classes(), 3);
        assert_eq!(net.block("features").len(), 4);
    }

    #[test]
    fn same_seed_same_weights() {
        let a = Network::from_spec(&smooth_spec(), 9).unwrap();
        let b = Network::from_spec(&smooth_spec(), 9).unwrap();
        let input = random_image(Shape::new(2, 6, 6), 4);
        assert_eq!(
            a.forward(&input, &mut EvalContext::new()).unwrap(),
            b.forward(&input, &mut EvalContext::new()).unwrap()
        );
    }

    #[test]
    fn input_gradient_matches_finite_differences() {
        let net = Network::from_spec(&smooth_spec(), 11).unwrap();
        let input = random_image(Shape::new(2, 6, 6), 5);
        assert_input_gradient_matches(&net, &input, 1, 1e-6);
    }

    #[test]
    fn residual_gradient_matches_finite_differences() {
        let spec = NetworkSpec::residual(Shape::new(3, 64, 64), 2);
        let small = NetworkSpec {
            input_shape: Shape::new(3, 16, 16),
            blocks: vec![
                BlockSpec::new("layer4", vec![
                    LayerSpec::Residual { out_channels: 4, stride: 2 },
                    LayerSpec::Residual { out_channels: 4, stride: 1 },
                ]),
                spec.blocks.last().unwrap().clone(),
            ],
            ..spec
        };
        let net = Network::from_spec(&small, 21).unwrap();
        let input = random_image(Shape::new(3, 16, 16), 6);
        assert_input_gradient_matches(&net, &input, 0, 1e-5);
    }

    #[test]
    fn rejects_wrong_input_shape() {
        let net = Network::from_spec(&smooth_spec(), 1).unwrap();
        let err = net.forward(&Tensor3::zeros(Shape::new(3, 6, 6)), &mut EvalContext::new()).unwrap_err();
        assert!(matches!(err, EvalError::InputShape { .. }));
    }

    #[test]
    fn backward_requires_forward() {
        let net = Network::from_spec(&smooth_spec(), 1).unwrap();
        let err = net.backward(&mut EvalContext::new(), &[1.0, 0.0, 0.0]).unwrap_err();
        assert_eq!(err, EvalError::MissingForward);
    }

    #[test]
    fn spec_must_end_in_scores() {
        let mut spec = smooth_spec();
        spec.blocks.pop();
        assert!(matches!(Network::from_spec(&spec, 1), Err(ModelError::InvalidSpec(_))));
    }

    #[test]
    fn json_round_trip_preserves_outputs() {
        let net = Network::from_spec(&smooth_spec(), 3).unwrap();
        let json = serde_json::to_string(&net).unwrap();
        let back: Network = serde_json::from_str(&json).unwrap();
        back.validate().unwrap();
        let input = random_image(Shape::new(2, 6, 6), 8);
        assert_eq!(
            net.forward(&input, &mut EvalContext::new()).unwrap(),
            back.forward(&input, &mut EvalContext::new()).unwrap()
        );
        assert!(back.hooks().is_empty());
    }

    #[test]
    fn saved_file_restores_identical_weights_and_spec() {
        let mut spec = smooth_spec();
        spec.metadata = Some(ModelMetadata {
            description: Some("stained cells".into()),
            ..ModelMetadata::default()
        });
        let reparsed: NetworkSpec = serde_json::from_str(&serde_json::to_string(&spec).unwrap()).unwrap();
        assert_eq!(reparsed, spec);

        let net = Network::from_spec(&spec, 17).unwrap();
        let path = std::env::temp_dir().join(format!("malaria_cam_weights_{}.json", std::process::id()));
        net.save_json(&path.to_string_lossy()).unwrap();
        let back = Network::load_json(&path.to_string_lossy()).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(back.metadata, net.metadata);
        for (a, b) in net.layers.iter().zip(&back.layers) {
            if let (Layer::Conv2d(x), Layer::Conv2d(y)) = (&a.layer, &b.layer) {
                assert_eq!(x.weights, y.weights);
            }
        }
        let input = random_image(Shape::new(2, 6, 6), 12);
        assert_eq!(
            net.forward(&input, &mut EvalContext::new()).unwrap(),
            back.forward(&input, &mut EvalContext::new()).unwrap()
        );
    }

    #[test]
    fn zero_std_in_model_file_is_rejected() {
        let mut spec = smooth_spec();
        spec.metadata = Some(ModelMetadata {
            normalization: Some(Normalization { mean: [0.5; 3], std: [0.2, 0.0, 0.2] }),
            ..ModelMetadata::default()
        });
        assert!(matches!(Network::from_spec(&spec, 1), Err(ModelError::InvalidSpec(_))));

        let mut net = Network::from_spec(&smooth_spec(), 1).unwrap();
        net.metadata.normalization = Some(Normalization { mean: [0.5; 3], std: [-1.0; 3] });
        let json = serde_json::to_string(&net).unwrap();
        let back: Network = serde_json::from_str(&json).unwrap();
        assert!(matches!(back.validate(), Err(ModelError::InvalidSpec(_))));
    }
}
