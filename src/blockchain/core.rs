// Chain responsibilities are split into submodules: block structure, the
// backward iterator, persisted state and UTXO scans, validation, and the
// manager that ties them together.
pub mod chain;
pub mod iter;
pub mod manager;
pub mod state;
pub mod validation;

pub use chain::*;
pub use iter::ChainIterator;
pub use manager::*;
pub use state::*;
pub use validation::*;
