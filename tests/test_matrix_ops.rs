// Tests for tensor operations: matrix products, broadcasting, reductions and
// the convolution kernels the layers are built on.

use approx::assert_relative_eq;
use rust_neural_compose::tensor::{ops, Tensor};
use rust_neural_compose::utils::SimpleRng;
use rust_neural_compose::TensorError;

fn m(rows: usize, cols: usize, data: Vec<f32>) -> Tensor {
    Tensor::matrix(rows, cols, data).unwrap()
}

mod matmul_tests {
    use super::*;

    #[test]
    fn test_matmul_identity() {
        let a = m(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let c = ops::matmul(&a, &Tensor::identity(2)).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn test_matmul_rectangular() {
        // (2x3) x (3x1)
        let a = m(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = m(3, 1, vec![1.0, 0.0, -1.0]);
        let c = ops::matmul(&a, &b).unwrap();
        assert_eq!(c.shape(), &[2, 1]);
        assert_eq!(c.data(), &[-2.0, -2.0]);
    }

    #[test]
    fn test_matmul_inner_dimension_mismatch() {
        let a = Tensor::zeros(vec![2, 3]);
        let b = Tensor::zeros(vec![4, 2]);
        assert!(matches!(
            ops::matmul(&a, &b),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_matmul_large_values() {
        let a = m(1, 2, vec![1e3, 1e3]);
        let b = m(2, 1, vec![1e3, 1e3]);
        let c = ops::matmul(&a, &b).unwrap();
        assert_relative_eq!(c.data()[0], 2e6);
    }
}

mod broadcast_tests {
    use super::*;

    #[test]
    fn test_bias_row_along_batch_axis() {
        let x = m(3, 2, vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        let b = m(1, 2, vec![10.0, 20.0]);
        let y = ops::broadcast_add(&x, &b, &[], &[0]).unwrap();
        assert_eq!(y.data(), &[11.0, 21.0, 12.0, 22.0, 13.0, 23.0]);
    }

    #[test]
    fn test_column_along_last_axis() {
        let x = m(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let c = m(2, 1, vec![1.0, 2.0]);
        let y = ops::broadcast_hadamard_prod(&x, &c, &[], &[1]).unwrap();
        assert_eq!(y.data(), &[1.0, 2.0, 3.0, 8.0, 10.0, 12.0]);
    }

    #[test]
    fn test_left_operand_broadcast() {
        let row = m(1, 2, vec![1.0, 2.0]);
        let x = m(2, 2, vec![1.0, 1.0, 1.0, 1.0]);
        let y = ops::broadcast_sub(&row, &x, &[0], &[]).unwrap();
        assert_eq!(y.data(), &[0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_axis_not_in_pattern_is_rejected() {
        let x = m(3, 2, vec![0.0; 6]);
        let b = m(1, 2, vec![0.0; 2]);
        assert!(ops::broadcast_add(&x, &b, &[], &[1]).is_err());
        assert!(ops::broadcast_add(&x, &b, &[0], &[]).is_err());
    }

    #[test]
    fn test_equal_shapes_need_no_pattern() {
        let x = m(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let y = ops::broadcast_hadamard_div(&x, &x, &[], &[]).unwrap();
        assert_eq!(y.data(), &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_plain_add_requires_equal_shapes() {
        let a = Tensor::zeros(vec![2, 2]);
        let b = Tensor::zeros(vec![1, 2]);
        assert!(ops::add(&a, &b).is_err());
        assert_eq!(ops::add(&a, &Tensor::scalar(1.0)).unwrap(), Tensor::ones(vec![2, 2]));
    }
}

mod reduction_tests {
    use super::*;

    #[test]
    fn test_mean_keepdims_rows() {
        let x = m(2, 2, vec![1.0, 3.0, 5.0, 7.0]);
        let mu = ops::mean_keepdims(&x, 1).unwrap();
        assert_eq!(mu.shape(), &[2, 1]);
        assert_eq!(mu.data(), &[2.0, 6.0]);
        let mu0 = ops::mean_keepdims(&x, 0).unwrap();
        assert_eq!(mu0.shape(), &[1, 2]);
        assert_eq!(mu0.data(), &[3.0, 5.0]);
    }

    #[test]
    fn test_mean_axis_out_of_range() {
        let x = Tensor::zeros(vec![2, 2]);
        assert!(matches!(
            ops::mean_keepdims(&x, 2),
            Err(TensorError::Axis { axis: 2, .. })
        ));
    }

    #[test]
    fn test_square_sqrt_add_scalar() {
        let x = Tensor::vector(vec![4.0, 9.0]);
        assert_eq!(ops::sqrt(&x).data(), &[2.0, 3.0]);
        assert_eq!(ops::square(&x).data(), &[16.0, 81.0]);
        assert_eq!(ops::add_scalar(&x, 1.0).data(), &[5.0, 10.0]);
    }
}

mod kernel_tests {
    use super::*;

    #[test]
    fn test_one_hot() {
        let ids = Tensor::vector(vec![1.0, 0.0]);
        let oh = ops::one_hot(&ids, 3).unwrap();
        assert_eq!(oh.shape(), &[2, 3]);
        assert_eq!(oh.data(), &[0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
        assert!(ops::one_hot(&Tensor::vector(vec![0.5]), 3).is_err());
    }

    #[test]
    fn test_conv2d_sums_window() {
        let x = Tensor::ones(vec![1, 1, 3, 3]);
        let w = Tensor::ones(vec![1, 1, 2, 2]);
        let y = ops::conv2d(&x, &w, &[0, 0], &[1, 1], &[1, 1]).unwrap();
        assert_eq!(y.shape(), &[1, 1, 2, 2]);
        assert_eq!(y.data(), &[4.0, 4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_conv2d_padding_counts_zeros() {
        let x = Tensor::ones(vec![1, 1, 2, 2]);
        let w = Tensor::ones(vec![1, 1, 3, 3]);
        let y = ops::conv2d(&x, &w, &[1, 1], &[1, 1], &[1, 1]).unwrap();
        assert_eq!(y.shape(), &[1, 1, 2, 2]);
        assert_eq!(y.data(), &[4.0, 4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_max_pool() {
        let x = Tensor::new(vec![1, 1, 2, 2], vec![1.0, -2.0, 3.0, 0.5]).unwrap();
        let y = ops::max_pool2d(&x, &[2, 2], &[0, 0], &[2, 2]).unwrap();
        assert_eq!(y.data(), &[3.0]);
    }

    #[test]
    fn test_dropout_keeps_expectation() {
        let x = Tensor::ones(vec![100, 100]);
        let mut rng = SimpleRng::new(5);
        let y = ops::dropout(&x, 0.3, &mut rng).unwrap();
        let mean = y.data().iter().sum::<f32>() / y.len() as f32;
        assert_relative_eq!(mean, 1.0, epsilon = 0.05);
        assert!(ops::dropout(&x, 1.0, &mut rng).is_err());
    }
}
