//! What-if scoring of a single chosen sequence under perturbed prices.

pub mod monte_carlo;
pub mod stochastic;

pub use monte_carlo::{evaluate_monte_carlo, MonteCarloRequest, MonteCarloResult, MAX_PATHS, MIN_PATHS};
pub use stochastic::{evaluate_stochastic, ScenarioOutcome, StochasticRequest, StochasticResult};
