use image::{Rgb, RgbImage};
use malaria_cam::diagnose::{diagnose, ExplainTarget};
use malaria_cam::preprocess::to_tensor;
use malaria_cam::preprocess::PreparedImage;
use malaria_cam::{logging, Classifier, ExplainConfig, Network, NetworkSpec, Shape};

/// A pink blood cell with a dark purple inclusion, roughly how a stained
/// infected cell looks under the microscope.
fn synthetic_cell(size: u32) -> RgbImage {
    let centre = size as f64 / 2.0;
    let radius = size as f64 * 0.4;
    RgbImage::from_fn(size, size, |x, y| {
        let (dx, dy) = (x as f64 - centre, y as f64 - centre);
        let (px, py) = (x as f64 - centre * 1.3, y as f64 - centre * 0.8);
        if (px * px + py * py).sqrt() < radius * 0.18 {
            Rgb([90, 30, 120])
        } else if (dx * dx + dy * dy).sqrt() < radius {
            Rgb([225, 150, 170])
        } else {
            Rgb([245, 240, 240])
        }
    })
}

fn main() {
    logging::init_tracing(1);

    let shape = Shape::new(3, 64, 64);
    for preset in ["features", "residual", "plain", "dense"] {
        let spec = NetworkSpec::preset(preset, shape, 2).expect("known preset");
        let network = Network::from_spec(&spec, 7).expect("valid preset");

        let original = synthetic_cell(128);
        let tensor = to_tensor(&original, network.input_shape(), &network.metadata.normalization())
            .expect("RGB input");
        let prepared = PreparedImage { tensor, original };

        let diagnosis = diagnose(
            &network,
            &prepared,
            &network.labels(),
            &ExplainConfig::default(),
            ExplainTarget::Predicted,
        )
        .expect("prediction");

        println!(
            "{:>9}: {} ({:.2}%) via {:?}, heatmap {}",
            preset,
            diagnosis.prediction.label,
            diagnosis.prediction.confidence,
            diagnosis.method,
            if diagnosis.visualization.is_degraded() { "missing" } else { "rendered" },
        );
    }
}
