use crate::core::params::EPS;

/// Outcome of a proportional split.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    /// Amount assigned to each input, in input order. Shares at or below
    /// `EPS` are zeroed and never executed.
    pub shares: Vec<f64>,
    /// `min(sum(maxima), requested)`, or 0 if nothing can be done.
    pub total: f64,
}

/// Split `amount` across capacities `maxima` in proportion to each capacity.
///
/// With `amount = None` the whole capacity is allocated. Each input receives
/// `max_i * total / sum(max)`, so no input exceeds its own maximum and
/// zero-capacity inputs receive nothing. Shares at or below `EPS` are
/// dropped, so the shares add up to `total` less at most `EPS` per input;
/// `total` itself is not reduced. The result does not depend on the order
/// of the inputs.
///
/// # Examples
///
/// ```
/// use contagion_engine::actions::proportional::allocate_proportionally;
///
/// let a = allocate_proportionally(&[1.0, 3.0], Some(2.0));
/// assert_eq!(a.total, 2.0);
/// assert_eq!(a.shares, vec![0.5, 1.5]);
///
/// let all = allocate_proportionally(&[1.0, 3.0], None);
/// assert_eq!(all.total, 4.0);
/// ```
pub fn allocate_proportionally(maxima: &[f64], amount: Option<f64>) -> Allocation {
    let maximum: f64 = maxima.iter().map(|m| m.max(0.0)).sum();
    let amount = amount.unwrap_or(maximum);
    if maximum <= 0.0 || amount <= 0.0 {
        return Allocation {
            shares: vec![0.0; maxima.len()],
            total: 0.0,
        };
    }

    let total = maximum.min(amount);
    let shares = maxima
        .iter()
        .map(|m| {
            let share = m.max(0.0) * total / maximum;
            if share > EPS {
                share.min(*m)
            } else {
                0.0
            }
        })
        .collect();
    Allocation { shares, total }
}
