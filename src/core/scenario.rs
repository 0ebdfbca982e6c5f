use std::{
    fmt::{Display, Formatter},
    ops::{Index, IndexMut},
};

use serde::Serialize;

/// Solar percentile crossed with plan variant.
#[derive(Debug, Serialize, enumset::EnumSetType)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Central forecast, no planner intervention.
    Base,

    /// Pessimistic forecast, no planner intervention.
    Base10,

    /// Central forecast with the candidate plan.
    Best,

    /// Pessimistic forecast with the candidate plan.
    Best10,
}

impl Scenario {
    #[must_use]
    pub const fn is_pessimistic(self) -> bool {
        matches!(self, Self::Base10 | Self::Best10)
    }

    #[must_use]
    pub const fn uses_plan(self) -> bool {
        matches!(self, Self::Best | Self::Best10)
    }
}

impl Display for Scenario {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Base => write!(f, "Base"),
            Self::Base10 => write!(f, "Base 10%"),
            Self::Best => write!(f, "Best"),
            Self::Best10 => write!(f, "Best 10%"),
        }
    }
}

/// One value per [`Scenario`].
#[derive(Copy, Clone, Debug, Default, Serialize)]
pub struct PerScenario<T> {
    pub base: T,
    pub base10: T,
    pub best: T,
    pub best10: T,
}

impl<T> PerScenario<T> {
    pub fn from_fn(mut f: impl FnMut(Scenario) -> T) -> Self {
        Self {
            base: f(Scenario::Base),
            base10: f(Scenario::Base10),
            best: f(Scenario::Best),
            best10: f(Scenario::Best10),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Scenario, &T)> {
        [
            (Scenario::Base, &self.base),
            (Scenario::Base10, &self.base10),
            (Scenario::Best, &self.best),
            (Scenario::Best10, &self.best10),
        ]
        .into_iter()
    }
}

impl<T> Index<Scenario> for PerScenario<T> {
    type Output = T;

    fn index(&self, scenario: Scenario) -> &Self::Output {
        match scenario {
            Scenario::Base => &self.base,
            Scenario::Base10 => &self.base10,
            Scenario::Best => &self.best,
            Scenario::Best10 => &self.best10,
        }
    }
}

impl<T> IndexMut<Scenario> for PerScenario<T> {
    fn index_mut(&mut self, scenario: Scenario) -> &mut Self::Output {
        match scenario {
            Scenario::Base => &mut self.base,
            Scenario::Base10 => &mut self.base10,
            Scenario::Best => &mut self.best,
            Scenario::Best10 => &mut self.best10,
        }
    }
}
