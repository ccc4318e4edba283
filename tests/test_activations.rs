// Tests for activation functions applied through the Activation enum.

use approx::assert_relative_eq;
use rust_neural_compose::tensor::Tensor;
use rust_neural_compose::utils::activations::{gelu, sigmoid, softmax_rows};
use rust_neural_compose::utils::Activation;

const ALL: [Activation; 9] = [
    Activation::Identity,
    Activation::Sigmoid,
    Activation::Tanh,
    Activation::ReLU,
    Activation::GeLU,
    Activation::LeakyReLU,
    Activation::ELU,
    Activation::Cube,
    Activation::SoftMax,
];

#[test]
fn test_shapes_are_preserved() {
    let x = Tensor::matrix(2, 3, vec![-1.0, 0.0, 1.0, 2.0, -2.0, 0.5]).unwrap();
    for act in ALL {
        let y = act.apply(&x).unwrap();
        assert_eq!(y.shape(), x.shape(), "{} changed the shape", act);
    }
}

#[test]
fn test_sigmoid_symmetry() {
    for &v in &[0.1f32, 1.0, 3.0, 10.0] {
        assert_relative_eq!(sigmoid(v) + sigmoid(-v), 1.0, epsilon = 1e-6);
    }
}

#[test]
fn test_sigmoid_saturates_without_nan() {
    assert_relative_eq!(sigmoid(100.0), 1.0);
    assert!(sigmoid(-100.0) >= 0.0);
    assert!(!sigmoid(-1000.0).is_nan());
}

#[test]
fn test_leaky_relu_and_elu_negative_side() {
    let x = Tensor::vector(vec![-1.0, 2.0]);
    let leaky = Activation::LeakyReLU.apply(&x).unwrap();
    assert_relative_eq!(leaky.data()[0], -0.01);
    assert_relative_eq!(leaky.data()[1], 2.0);
    let elu = Activation::ELU.apply(&x).unwrap();
    assert_relative_eq!(elu.data()[0], (-1.0f32).exp() - 1.0);
}

#[test]
fn test_cube_and_tanh() {
    let x = Tensor::vector(vec![-2.0, 0.5]);
    assert_eq!(Activation::Cube.apply(&x).unwrap().data(), &[-8.0, 0.125]);
    let t = Activation::Tanh.apply(&x).unwrap();
    assert_relative_eq!(t.data()[1], 0.5f32.tanh());
}

#[test]
fn test_gelu_reference_points() {
    assert_relative_eq!(gelu(0.0), 0.0);
    assert_relative_eq!(gelu(1.0), 0.841_192, epsilon = 1e-4);
    assert!(gelu(-5.0).abs() < 1e-3);
}

#[test]
fn test_softmax_rows_sum_to_one() {
    let x = Tensor::matrix(2, 3, vec![1.0, 2.0, 3.0, 1000.0, 1000.0, 1000.0]).unwrap();
    let y = Activation::SoftMax.apply(&x).unwrap();
    for row in y.data().chunks(3) {
        assert_relative_eq!(row.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
    }
    assert_relative_eq!(y.data()[3], 1.0 / 3.0, epsilon = 1e-6);
}

#[test]
fn test_softmax_rows_in_place() {
    let mut data = vec![0.0, 0.0];
    softmax_rows(&mut data, 1, 2);
    assert_eq!(data, vec![0.5, 0.5]);
}

#[test]
fn test_display_matches_config_names() {
    let names: Vec<String> = ALL.iter().map(|a| a.to_string()).collect();
    assert_eq!(
        names,
        vec!["identity", "sigmoid", "tanh", "relu", "gelu", "leaky_relu", "elu", "cube", "softmax"]
    );
}
