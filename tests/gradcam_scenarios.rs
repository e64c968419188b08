use image::{Rgb, RgbImage};

use malaria_cam::diagnose::{diagnose, predict, ExplainTarget};
use malaria_cam::error::VisualizationStage;
use malaria_cam::explain::{locate, saliency, AttributionMethod, ClassActivationMap};
use malaria_cam::layers::Layer;
use malaria_cam::preprocess::{to_tensor, PreparedImage};
use malaria_cam::visual::compose;
use malaria_cam::{Classifier, ExplainConfig, Network, NetworkSpec, Shape};

fn cell_image(size: u32) -> RgbImage {
    let centre = size as f64 / 2.0;
    RgbImage::from_fn(size, size, |x, y| {
        let (dx, dy) = (x as f64 - centre, y as f64 - centre);
        let d = (dx * dx + dy * dy).sqrt();
        if d < size as f64 * 0.08 {
            Rgb([80, 20, 110])
        } else if d < size as f64 * 0.4 {
            Rgb([220, (140.0 + dx.abs()) as u8, 165])
        } else {
            Rgb([240, 238, 236])
        }
    })
}

fn prepare(network: &Network, original: RgbImage) -> PreparedImage {
    let tensor = to_tensor(&original, network.input_shape(), &network.metadata.normalization()).unwrap();
    PreparedImage { tensor, original }
}

fn labels(network: &Network) -> Vec<String> {
    network.labels()
}

/// Makes every head weight positive so the explained class draws positive
/// evidence from every feature channel.
fn positive_head(network: &mut Network) {
    for named in network.layers.iter_mut() {
        if let Layer::Linear(linear) = &mut named.layer {
            for w in linear.weights.iter_mut() {
                *w = w.abs() + 0.01;
            }
        }
    }
}

#[test]
fn features_model_at_224_explains_top_class_with_full_bundle() {
    let shape = Shape::new(3, 224, 224);
    let mut network = Network::from_spec(&NetworkSpec::sequential_features(shape, 2), 11).unwrap();
    positive_head(&mut network);

    let prepared = prepare(&network, cell_image(256));
    let target = locate(&network).unwrap();
    assert_eq!(target.name, "features.5");

    let expected_class = predict(&network, &prepared.tensor, &labels(&network)).unwrap().class_id;
    let explanation = saliency(&network, &prepared.tensor, None).unwrap();
    assert_eq!(explanation.method, AttributionMethod::GradCam);
    assert_eq!(explanation.target_class, expected_class);
    assert_eq!(explanation.layer.as_deref(), Some("features.5"));
    assert_eq!(
        (explanation.map.height(), explanation.map.width()),
        (target.output_shape.height, target.output_shape.width)
    );
    assert_eq!(explanation.map.max(), 1.0);
    assert_eq!(explanation.map.min(), 0.0);

    let diagnosis = diagnose(
        &network,
        &prepared,
        &labels(&network),
        &ExplainConfig::default(),
        ExplainTarget::Predicted,
    )
    .unwrap();
    assert!(!diagnosis.visualization.is_degraded());
    for encoded in [
        Some(&diagnosis.visualization.original),
        diagnosis.visualization.heatmap.as_ref(),
        diagnosis.visualization.overlay.as_ref(),
    ] {
        let decoded = encoded.unwrap().decode().unwrap();
        assert_eq!(decoded.dimensions(), (256, 256));
    }
    assert!(network.hooks().is_empty());
}

#[test]
fn residual_model_explains_final_stage() {
    let shape = Shape::new(3, 64, 64);
    let network = Network::from_spec(&NetworkSpec::residual(shape, 2), 5).unwrap();
    let prepared = prepare(&network, cell_image(96));

    let explanation = saliency(&network, &prepared.tensor, Some(0)).unwrap();
    assert_eq!(explanation.method, AttributionMethod::GradCam);
    assert_eq!(explanation.layer.as_deref(), Some("layer4.1"));
    assert_eq!(explanation.target_class, 0);
    assert!(explanation.map.values().iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn model_without_convolutions_falls_back_with_full_bundle() {
    let shape = Shape::new(3, 24, 24);
    let network = Network::from_spec(&NetworkSpec::dense_only(shape, 2), 8).unwrap();
    assert!(locate(&network).is_none());

    let prepared = prepare(&network, cell_image(48));
    let diagnosis = diagnose(
        &network,
        &prepared,
        &labels(&network),
        &ExplainConfig::default(),
        ExplainTarget::Predicted,
    )
    .unwrap();

    assert_eq!(diagnosis.method, Some(AttributionMethod::InputGradient));
    assert!(!diagnosis.visualization.is_degraded());
    assert!(diagnosis.explanation.is_some());
    let overlay = diagnosis.visualization.overlay.unwrap().decode().unwrap();
    assert_eq!(overlay.dimensions(), (48, 48));

    let explanation = saliency(&network, &prepared.tensor, None).unwrap();
    assert_eq!((explanation.map.height(), explanation.map.width()), (24, 24));
}

#[test]
fn corrupt_map_degrades_without_touching_the_prediction() {
    let shape = Shape::new(3, 32, 32);
    let network = Network::from_spec(&NetworkSpec::plain_conv(shape, 2), 21).unwrap();
    let prepared = prepare(&network, cell_image(40));
    let before = predict(&network, &prepared.tensor, &labels(&network)).unwrap();

    let corrupt = ClassActivationMap::from_raw_parts(2, 2, vec![0.2, f64::NAN, f64::INFINITY, 0.4]).unwrap();
    let bundle = compose(&prepared.original, &corrupt, &ExplainConfig::default()).unwrap();
    assert!(bundle.is_degraded());
    assert!(bundle.heatmap.is_none() && bundle.overlay.is_none());
    assert_eq!(bundle.failure.map(|f| f.stage), Some(VisualizationStage::ColorMap));
    assert_eq!(bundle.original.decode().unwrap(), prepared.original);

    let after = predict(&network, &prepared.tensor, &labels(&network)).unwrap();
    assert_eq!(before, after);
}

#[test]
fn saved_model_explains_like_the_original() {
    let shape = Shape::new(3, 32, 32);
    let network = Network::from_spec(&NetworkSpec::sequential_features(shape, 2), 3).unwrap();
    let path = std::env::temp_dir().join(format!("malaria_cam_roundtrip_{}.json", std::process::id()));
    network.save_json(&path.to_string_lossy()).unwrap();
    let loaded = Network::load_json(&path.to_string_lossy()).unwrap();
    let _ = std::fs::remove_file(&path);

    let prepared = prepare(&network, cell_image(32));
    let a = saliency(&network, &prepared.tensor, Some(1)).unwrap();
    let b = saliency(&loaded, &prepared.tensor, Some(1)).unwrap();
    assert_eq!(a.layer, b.layer);
    for (x, y) in a.map.values().iter().zip(b.map.values()) {
        approx::assert_abs_diff_eq!(*x, *y, epsilon = 1e-9);
    }
}
