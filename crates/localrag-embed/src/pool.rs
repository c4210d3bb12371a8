use candle_core::Tensor;
use localrag_core::error::{Error, Result};

/// Lower bound on the number of attended tokens, keeps fully-masked rows finite.
pub const MIN_MASK_SUM: f64 = 1e-9;
const MIN_NORM: f64 = 1e-12;

/// Mean of token states weighted by `attention_mask`, then L2-normalized.
///
/// `hidden` is `[B, T, H]`, `attention_mask` is `[B, T]` (any dtype, 0/1 values).
/// Returns `[B, H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    pool(hidden, attention_mask).map_err(|e| Error::Model(format!("pooling failed: {e}")))
}

fn pool(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let (batch, time, hidden_dim) = hidden.dims3()?;
    let mask_dims = attention_mask.dims();
    if mask_dims != [batch, time] {
        candle_core::bail!("attention mask shape {:?} does not match hidden [{batch}, {time}, _]", mask_dims);
    }

    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_broadcast = mask.unsqueeze(2)?.broadcast_as(hidden.shape())?;
    let sum = (hidden * &mask_broadcast)?.sum(1)?;
    let counts = mask.sum_keepdim(1)?.maximum(MIN_MASK_SUM)?;
    let mean = sum.broadcast_div(&counts)?;
    let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?.maximum(MIN_NORM)?;
    let out = mean.broadcast_div(&norm)?;
    debug_assert_eq!(out.dims(), &[batch, hidden_dim]);
    Ok(out)
}
