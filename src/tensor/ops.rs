//! Tensor operations
//!
//! Plain elementwise operations require equal shapes (or a rank-0 operand).
//! The `broadcast_*` variants take a broadcast pattern per operand: the list of
//! axes along which that operand may be repeated. An operand can only be
//! repeated along an axis where its extent is 1 and the axis is named in its
//! pattern. Equal shapes short-circuit to the plain operation.

use super::{strides_of, Tensor};
use crate::error::TensorError;
use crate::utils::rng::SimpleRng;

/// Matrix product.
///
/// Supported operand ranks:
/// - `(m, k) × (k, n) → (m, n)`
/// - `(k) × (k, n) → (n)`
/// - `(m, k) × (k) → (m)`
pub fn matmul(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorError> {
    let (m, k, a_vec) = match a.shape() {
        [k] => (1, *k, true),
        [m, k] => (*m, *k, false),
        _ => {
            return Err(TensorError::Rank {
                op: "matmul",
                expected: 2,
                actual: a.shape().to_vec(),
            })
        }
    };
    let (k2, n, b_vec) = match b.shape() {
        [k2] if !a_vec => (*k2, 1, true),
        [k2, n] => (*k2, *n, false),
        _ => {
            return Err(TensorError::Rank {
                op: "matmul",
                expected: 2,
                actual: b.shape().to_vec(),
            })
        }
    };
    if k != k2 {
        return Err(TensorError::ShapeMismatch {
            op: "matmul",
            left: a.shape().to_vec(),
            right: b.shape().to_vec(),
        });
    }

    let lhs = a.data();
    let rhs = b.data();
    let mut out = vec![0.0f32; m * n];
    for i in 0..m {
        let row = &lhs[i * k..(i + 1) * k];
        let out_row = &mut out[i * n..(i + 1) * n];
        for (p, &av) in row.iter().enumerate() {
            if av == 0.0 {
                continue;
            }
            let rhs_row = &rhs[p * n..(p + 1) * n];
            for (o, &bv) in out_row.iter_mut().zip(rhs_row) {
                *o += av * bv;
            }
        }
    }

    let shape = match (a_vec, b_vec) {
        (true, _) => vec![n],
        (_, true) => vec![m],
        _ => vec![m, n],
    };
    Tensor::new(shape, out)
}

fn elementwise(
    op: &'static str,
    a: &Tensor,
    b: &Tensor,
    f: impl Fn(f32, f32) -> f32,
) -> Result<Tensor, TensorError> {
    if a.shape() == b.shape() {
        let data = a.data().iter().zip(b.data()).map(|(&x, &y)| f(x, y)).collect();
        return Tensor::new(a.shape().to_vec(), data);
    }
    if b.is_scalar() {
        let y = b.data()[0];
        return Ok(a.map(|x| f(x, y)));
    }
    if a.is_scalar() {
        let x = a.data()[0];
        return Ok(b.map(|y| f(x, y)));
    }
    Err(TensorError::ShapeMismatch {
        op,
        left: a.shape().to_vec(),
        right: b.shape().to_vec(),
    })
}

pub fn add(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorError> {
    elementwise("add", a, b, |x, y| x + y)
}

pub fn sub(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorError> {
    elementwise("sub", a, b, |x, y| x - y)
}

/// Elementwise product.
pub fn hadamard_prod(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorError> {
    elementwise("hadamard_prod", a, b, |x, y| x * y)
}

/// Elementwise division.
pub fn hadamard_div(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorError> {
    elementwise("hadamard_div", a, b, |x, y| x / y)
}

fn broadcast(
    op: &'static str,
    a: &Tensor,
    b: &Tensor,
    left: &[usize],
    right: &[usize],
    f: impl Fn(f32, f32) -> f32,
) -> Result<Tensor, TensorError> {
    if a.shape() == b.shape() || a.is_scalar() || b.is_scalar() {
        return elementwise(op, a, b, f);
    }
    let mismatch = || TensorError::ShapeMismatch {
        op,
        left: a.shape().to_vec(),
        right: b.shape().to_vec(),
    };
    if a.dims() != b.dims() {
        return Err(mismatch());
    }

    let mut out_shape = Vec::with_capacity(a.dims());
    for (axis, (&da, &db)) in a.shape().iter().zip(b.shape()).enumerate() {
        if da == db {
            out_shape.push(da);
        } else if da == 1 && left.contains(&axis) {
            out_shape.push(db);
        } else if db == 1 && right.contains(&axis) {
            out_shape.push(da);
        } else {
            return Err(mismatch());
        }
    }

    let out_strides = strides_of(&out_shape);
    let a_strides = a.strides();
    let b_strides = b.strides();
    let total = out_shape.iter().product::<usize>();
    let mut data = Vec::with_capacity(total);
    for linear in 0..total {
        let mut rem = linear;
        let mut ai = 0;
        let mut bi = 0;
        for axis in 0..out_shape.len() {
            let idx = rem / out_strides[axis];
            rem %= out_strides[axis];
            if a.shape()[axis] != 1 {
                ai += idx * a_strides[axis];
            }
            if b.shape()[axis] != 1 {
                bi += idx * b_strides[axis];
            }
        }
        data.push(f(a.data()[ai], b.data()[bi]));
    }
    Tensor::new(out_shape, data)
}

/// Addition where either operand may be repeated along its pattern axes.
pub fn broadcast_add(
    a: &Tensor,
    b: &Tensor,
    left: &[usize],
    right: &[usize],
) -> Result<Tensor, TensorError> {
    broadcast("broadcast_add", a, b, left, right, |x, y| x + y)
}

pub fn broadcast_sub(
    a: &Tensor,
    b: &Tensor,
    left: &[usize],
    right: &[usize],
) -> Result<Tensor, TensorError> {
    broadcast("broadcast_sub", a, b, left, right, |x, y| x - y)
}

pub fn broadcast_hadamard_prod(
    a: &Tensor,
    b: &Tensor,
    left: &[usize],
    right: &[usize],
) -> Result<Tensor, TensorError> {
    broadcast("broadcast_hadamard_prod", a, b, left, right, |x, y| x * y)
}

pub fn broadcast_hadamard_div(
    a: &Tensor,
    b: &Tensor,
    left: &[usize],
    right: &[usize],
) -> Result<Tensor, TensorError> {
    broadcast("broadcast_hadamard_div", a, b, left, right, |x, y| x / y)
}

pub fn square(a: &Tensor) -> Tensor {
    a.map(|x| x * x)
}

pub fn sqrt(a: &Tensor) -> Tensor {
    a.map(f32::sqrt)
}

pub fn add_scalar(a: &Tensor, s: f32) -> Tensor {
    a.map(|x| x + s)
}

/// Mean along `axis`, keeping the reduced axis with extent 1.
pub fn mean_keepdims(a: &Tensor, axis: usize) -> Result<Tensor, TensorError> {
    if axis >= a.dims() {
        return Err(TensorError::Axis {
            axis,
            shape: a.shape().to_vec(),
        });
    }
    let shape = a.shape();
    let n = shape[axis];
    let outer: usize = shape[..axis].iter().product();
    let inner: usize = shape[axis + 1..].iter().product();

    let mut out = vec![0.0f32; outer * inner];
    if n > 0 {
        for o in 0..outer {
            for j in 0..n {
                let base = (o * n + j) * inner;
                for i in 0..inner {
                    out[o * inner + i] += a.data()[base + i];
                }
            }
        }
        let inv = 1.0 / n as f32;
        for v in &mut out {
            *v *= inv;
        }
    }

    let mut out_shape = shape.to_vec();
    out_shape[axis] = 1;
    Tensor::new(out_shape, out)
}

/// Expand a tensor of class indices into a `(len, classes)` one-hot matrix.
pub fn one_hot(ids: &Tensor, classes: usize) -> Result<Tensor, TensorError> {
    let mut out = vec![0.0f32; ids.len() * classes];
    for (row, &v) in ids.data().iter().enumerate() {
        if !v.is_finite() || v < 0.0 || v.fract() != 0.0 {
            return Err(TensorError::InvalidArgument {
                op: "one_hot",
                reason: format!("{} is not a class index", v),
            });
        }
        let class = v as usize;
        if class >= classes {
            return Err(TensorError::ClassOutOfRange {
                op: "one_hot",
                class,
                classes,
            });
        }
        out[row * classes + class] = 1.0;
    }
    Tensor::new(vec![ids.len(), classes], out)
}

fn pair(op: &'static str, name: &str, v: &[usize]) -> Result<(usize, usize), TensorError> {
    match v {
        [h, w] => Ok((*h, *w)),
        _ => Err(TensorError::InvalidArgument {
            op,
            reason: format!("{} must have 2 entries, got {:?}", name, v),
        }),
    }
}

/// 2D convolution over an NCHW input with an `(out, in, kh, kw)` kernel.
pub fn conv2d(
    x: &Tensor,
    w: &Tensor,
    pad: &[usize],
    stride: &[usize],
    dilation: &[usize],
) -> Result<Tensor, TensorError> {
    const OP: &str = "conv2d";
    let (n, c, h, wd) = match x.shape() {
        [n, c, h, w] => (*n, *c, *h, *w),
        _ => {
            return Err(TensorError::Rank {
                op: OP,
                expected: 4,
                actual: x.shape().to_vec(),
            })
        }
    };
    let (oc, ic, kh, kw) = match w.shape() {
        [o, i, kh, kw] => (*o, *i, *kh, *kw),
        _ => {
            return Err(TensorError::Rank {
                op: OP,
                expected: 4,
                actual: w.shape().to_vec(),
            })
        }
    };
    if ic != c {
        return Err(TensorError::ShapeMismatch {
            op: OP,
            left: x.shape().to_vec(),
            right: w.shape().to_vec(),
        });
    }
    let (ph, pw) = pair(OP, "pad", pad)?;
    let (sh, sw) = pair(OP, "stride", stride)?;
    let (dh, dw) = pair(OP, "dilation", dilation)?;
    if sh == 0 || sw == 0 || dh == 0 || dw == 0 {
        return Err(TensorError::InvalidArgument {
            op: OP,
            reason: "stride and dilation must be positive".to_string(),
        });
    }
    let eff_h = dh * (kh.max(1) - 1) + 1;
    let eff_w = dw * (kw.max(1) - 1) + 1;
    if h + 2 * ph < eff_h || wd + 2 * pw < eff_w {
        return Err(TensorError::ShapeMismatch {
            op: OP,
            left: x.shape().to_vec(),
            right: w.shape().to_vec(),
        });
    }
    let oh = (h + 2 * ph - eff_h) / sh + 1;
    let ow = (wd + 2 * pw - eff_w) / sw + 1;

    let xs = x.data();
    let ws = w.data();
    let mut out = vec![0.0f32; n * oc * oh * ow];
    for b in 0..n {
        for o in 0..oc {
            for y in 0..oh {
                for z in 0..ow {
                    let mut acc = 0.0f32;
                    for ci in 0..c {
                        for ky in 0..kh {
                            let iy = (y * sh + ky * dh) as isize - ph as isize;
                            if iy < 0 || iy >= h as isize {
                                continue;
                            }
                            for kx in 0..kw {
                                let ix = (z * sw + kx * dw) as isize - pw as isize;
                                if ix < 0 || ix >= wd as isize {
                                    continue;
                                }
                                let xi = ((b * c + ci) * h + iy as usize) * wd + ix as usize;
                                let wi = ((o * c + ci) * kh + ky) * kw + kx;
                                acc += xs[xi] * ws[wi];
                            }
                        }
                    }
                    out[((b * oc + o) * oh + y) * ow + z] = acc;
                }
            }
        }
    }
    Tensor::new(vec![n, oc, oh, ow], out)
}

/// 2D max pooling over an NCHW input. Padded cells never win the max.
pub fn max_pool2d(
    x: &Tensor,
    kernel: &[usize],
    pad: &[usize],
    stride: &[usize],
) -> Result<Tensor, TensorError> {
    const OP: &str = "max_pool2d";
    let (n, c, h, wd) = match x.shape() {
        [n, c, h, w] => (*n, *c, *h, *w),
        _ => {
            return Err(TensorError::Rank {
                op: OP,
                expected: 4,
                actual: x.shape().to_vec(),
            })
        }
    };
    let (kh, kw) = pair(OP, "kernel", kernel)?;
    let (ph, pw) = pair(OP, "pad", pad)?;
    let (sh, sw) = pair(OP, "stride", stride)?;
    if kh == 0 || kw == 0 || sh == 0 || sw == 0 || ph >= kh || pw >= kw {
        return Err(TensorError::InvalidArgument {
            op: OP,
            reason: format!(
                "kernel {:?}, pad {:?} and stride {:?} are not a valid pooling window",
                kernel, pad, stride
            ),
        });
    }
    if h + 2 * ph < kh || wd + 2 * pw < kw {
        return Err(TensorError::ShapeMismatch {
            op: OP,
            left: x.shape().to_vec(),
            right: kernel.to_vec(),
        });
    }
    let oh = (h + 2 * ph - kh) / sh + 1;
    let ow = (wd + 2 * pw - kw) / sw + 1;

    let xs = x.data();
    let mut out = vec![f32::NEG_INFINITY; n * c * oh * ow];
    for plane in 0..n * c {
        let base = plane * h * wd;
        for y in 0..oh {
            for z in 0..ow {
                let mut best = f32::NEG_INFINITY;
                for ky in 0..kh {
                    let iy = (y * sh + ky) as isize - ph as isize;
                    if iy < 0 || iy >= h as isize {
                        continue;
                    }
                    for kx in 0..kw {
                        let ix = (z * sw + kx) as isize - pw as isize;
                        if ix < 0 || ix >= wd as isize {
                            continue;
                        }
                        best = best.max(xs[base + iy as usize * wd + ix as usize]);
                    }
                }
                out[(plane * oh + y) * ow + z] = best;
            }
        }
    }
    Tensor::new(vec![n, c, oh, ow], out)
}

/// Inverted dropout: zero each element with probability `prob` and scale the
/// survivors by `1 / (1 - prob)`.
pub fn dropout(x: &Tensor, prob: f64, rng: &mut SimpleRng) -> Result<Tensor, TensorError> {
    if !(0.0..1.0).contains(&prob) {
        return Err(TensorError::InvalidArgument {
            op: "dropout",
            reason: format!("probability {} must be in range [0.0, 1.0)", prob),
        });
    }
    if prob == 0.0 {
        return Ok(x.clone());
    }
    let p = prob as f32;
    let scale = 1.0 / (1.0 - p);
    let data = x
        .data()
        .iter()
        .map(|&v| if rng.next_f32() >= p { v * scale } else { 0.0 })
        .collect();
    Tensor::new(x.shape().to_vec(), data)
}
