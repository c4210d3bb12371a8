use candle_core::{DType, Device, Tensor};
use localrag_embed::masked_mean_l2;

#[test]
fn padded_positions_do_not_contribute() {
    let dev = Device::Cpu;
    // One row of three tokens (H = 2); the last is padding with a large value.
    let h = Tensor::from_slice(&[3.0f32, 4.0, 3.0, 4.0, 100.0, -100.0], (1, 3, 2), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 1, 0], (1, 3), &dev).unwrap();
    let out = masked_mean_l2(&h, &mask).unwrap();
    assert_eq!(out.dims2().unwrap(), (1, 2));
    let v: Vec<Vec<f32>> = out.to_vec2().unwrap();
    assert!((v[0][0] - 0.6).abs() < 1e-6);
    assert!((v[0][1] - 0.8).abs() < 1e-6);
}

#[test]
fn mask_dtype_does_not_matter() {
    let dev = Device::Cpu;
    let h = Tensor::from_slice(&[1.0f32, 0.0, 0.0, 1.0], (1, 2, 2), &dev).unwrap();
    let as_u32 = Tensor::from_slice(&[1u32, 0], (1, 2), &dev).unwrap();
    let as_i64 = Tensor::from_slice(&[1i64, 0], (1, 2), &dev).unwrap();
    let as_f32 = as_u32.to_dtype(DType::F32).unwrap();
    let expected: Vec<Vec<f32>> = vec![vec![1.0, 0.0]];
    for mask in [as_u32, as_i64, as_f32] {
        let v: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
        assert_eq!(v, expected);
    }
}

#[test]
fn masked_mean_averages_attended_tokens() {
    let dev = Device::Cpu;
    // Row 0 attends both tokens, row 1 only the first.
    let h = Tensor::from_slice(&[3.0f32, 0.0,  0.0, 4.0,
                                 0.0, 2.0,  9.0, 9.0],
                               (2, 2, 2), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 1, 1, 0], (2, 2), &dev).unwrap();
    let v: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    // mean([3,0],[0,4]) = [1.5, 2] -> norm 2.5
    assert!((v[0][0] - 0.6).abs() < 1e-5);
    assert!((v[0][1] - 0.8).abs() < 1e-5);
    assert!((v[1][0] - 0.0).abs() < 1e-5);
    assert!((v[1][1] - 1.0).abs() < 1e-5);
}

#[test]
fn fully_masked_row_stays_finite() {
    let dev = Device::Cpu;
    let h = Tensor::from_slice(&[1.0f32, 2.0], (1, 1, 2), &dev).unwrap();
    let mask = Tensor::from_slice(&[0u32], (1, 1), &dev).unwrap();
    let v: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    assert!(v[0].iter().all(|x| x.is_finite()));
}

#[test]
fn mismatched_mask_shape_is_a_model_error() {
    let dev = Device::Cpu;
    let h = Tensor::zeros((1, 3, 2), DType::F32, &dev).unwrap();
    let mask = Tensor::zeros((1, 2), DType::F32, &dev).unwrap();
    assert!(matches!(masked_mean_l2(&h, &mask), Err(localrag_core::Error::Model(_))));
}
