//! Quantile loss.
use tch::{Kind, Tensor};

/// Element-wise Huber loss with threshold `kappa`.
///
/// `0.5 * x^2` where `|x| <= kappa`, `kappa * (|x| - 0.5 * kappa)` elsewhere.
pub fn huber_loss(x: &Tensor, kappa: f64) -> Tensor {
    let abs = x.abs();
    let quadratic: Tensor = 0.5 * x.pow_tensor_scalar(2);
    let linear = kappa * (&abs - 0.5 * kappa);
    quadratic.where_self(&abs.le(kappa), &linear)
}

/// Returns the quantile Huber loss.
///
/// * `td_errors` has the shape `[batch_size, n_percent_points, n]`, where the
///   second axis is the fraction axis of the predictions.
/// * `tau` has the shape `[batch_size, n_percent_points]`.
/// * `weight`, if given, has the shape `[batch_size]` (importance-sampling
///   weights).
///
/// The element-wise loss `|tau - 1{td < 0}| * huber(td) / kappa` is summed
/// over the fraction axis, averaged over the last axis and then averaged over
/// the batch.
pub fn quantile_huber_loss(
    td_errors: &Tensor,
    tau: &Tensor,
    weight: Option<&Tensor>,
    kappa: f64,
) -> Tensor {
    let size = td_errors.size();
    let batch_size = size[0];
    let n_percent_points = size[1];
    debug_assert_eq!(size.len(), 3);
    debug_assert_eq!(tau.size().as_slice(), &[batch_size, n_percent_points]);

    let lt_0 = td_errors.lt(0.0).detach().to_kind(Kind::Float);
    let tau = tau.detach().unsqueeze(-1);
    let loss = (tau - lt_0).abs() * huber_loss(td_errors, kappa) / kappa;
    let loss = loss
        .sum_dim_intlist(Some([1i64].as_slice()), false, Kind::Float)
        .mean_dim(Some([1i64].as_slice()), false, Kind::Float);
    debug_assert_eq!(loss.size().as_slice(), &[batch_size]);

    match weight {
        Some(w) => (loss * w).mean(Kind::Float),
        None => loss.mean(Kind::Float),
    }
}
