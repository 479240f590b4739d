use crate::core::params::PriceImpactFn;

impl PriceImpactFn {
    /// Price after selling `fraction_sold` of the outstanding quantity.
    ///
    /// Never negative and never above `price`.
    pub fn apply(self, price: f64, fraction_sold: f64, coefficient: f64) -> f64 {
        match self {
            PriceImpactFn::Linear => linear(price, fraction_sold, coefficient),
            PriceImpactFn::Exponential => exponential(price, fraction_sold, coefficient),
        }
    }
}

/// `max(0, p - fraction_sold * coefficient)`
pub fn linear(price: f64, fraction_sold: f64, coefficient: f64) -> f64 {
    (price - fraction_sold * coefficient).max(0.0)
}

/// `p * exp(-fraction_sold * coefficient)`
pub fn exponential(price: f64, fraction_sold: f64, coefficient: f64) -> f64 {
    price * (-fraction_sold * coefficient).exp()
}

/// Haircut after a price move: rises linearly as the price falls below par,
/// capped at 1.
pub fn haircut(initial: f64, slope: f64, price: f64) -> f64 {
    (initial + (slope * (1.0 - price)).max(0.0)).min(1.0)
}
