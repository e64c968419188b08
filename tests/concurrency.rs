use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use malaria_cam::explain::{locate, saliency};
use malaria_cam::{Classifier, EvalContext, ImageTensor, Network, NetworkSpec, Shape, Tensor3};

fn image(shape: Shape, variant: usize) -> ImageTensor {
    Tensor3::from_fn(shape, |c, y, x| {
        (((c + 1) * (y + variant) * 7 + x * (variant + 3)) % 13) as f64 / 13.0 - 0.5
    })
}

#[test]
fn concurrent_explanations_match_sequential_ones() {
    let shape = Shape::new(3, 32, 32);
    let network = Arc::new(Network::from_spec(&NetworkSpec::sequential_features(shape, 2), 99).unwrap());
    let inputs: Vec<ImageTensor> = (0..6).map(|v| image(shape, v)).collect();

    let sequential: Vec<_> = inputs
        .iter()
        .map(|input| saliency(network.as_ref(), input, None).unwrap())
        .collect();

    let handles: Vec<_> = inputs
        .into_iter()
        .map(|input| {
            let network = Arc::clone(&network);
            thread::spawn(move || saliency(network.as_ref(), &input, None).unwrap())
        })
        .collect();
    let concurrent: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(sequential, concurrent);
    assert!(network.hooks().is_empty());
}

#[test]
fn plain_predictions_run_alongside_explanations() {
    let shape = Shape::new(3, 16, 16);
    let network = Arc::new(Network::from_spec(&NetworkSpec::plain_conv(shape, 2), 4).unwrap());
    let input = image(shape, 1);
    let expected = network.forward(&input, &mut EvalContext::new()).unwrap();

    let explainers: Vec<_> = (0..3)
        .map(|_| {
            let network = Arc::clone(&network);
            let input = input.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    saliency(network.as_ref(), &input, Some(1)).unwrap();
                }
            })
        })
        .collect();
    for _ in 0..20 {
        let scores = network.forward(&input, &mut EvalContext::new()).unwrap();
        assert_eq!(scores, expected);
    }
    for handle in explainers {
        handle.join().unwrap();
    }
    assert!(network.hooks().is_empty());
}

#[test]
fn hooks_only_fire_for_their_own_session() {
    let shape = Shape::new(3, 16, 16);
    let network = Network::from_spec(&NetworkSpec::plain_conv(shape, 2), 4).unwrap();
    let layer = locate(&network).unwrap();
    let input = image(shape, 2);

    // leave nothing behind from a completed explanation
    saliency(&network, &input, None).unwrap();
    assert!(network.hooks().is_empty());

    let hits = Arc::new(AtomicUsize::new(0));
    {
        let mut scope = network.hooks().instrument();
        let counter = Arc::clone(&hits);
        scope.on_forward(layer.id, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(network.hooks().try_instrument().is_none());

        network.forward(&input, &mut EvalContext::new()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let mut ctx = EvalContext::new().with_session(scope.session());
        network.forward(&input, &mut ctx).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    assert!(network.hooks().is_empty());
    assert!(network.hooks().try_instrument().is_some());
    network.forward(&input, &mut EvalContext::new()).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
