use std::{
    fmt::{Debug, Display, Formatter},
    ops::Div,
};

use crate::{Quantity, energy::KilowattHours, rate::KilowattHourRate};

/// Money in minor currency units (pence).
pub type Cost = Quantity<0, 0, 1>;

impl Cost {
    pub const ONE_PENNY: Self = Self::new(1.0);
}

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} p", self.0)
    }
}

impl Debug for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}p", self.0)
    }
}

impl Div<KilowattHours> for Cost {
    type Output = KilowattHourRate;

    fn div(self, rhs: KilowattHours) -> Self::Output {
        Quantity(self.0 / rhs.0)
    }
}
