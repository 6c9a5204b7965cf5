pub mod constants;
pub mod error;
pub mod records;
pub mod types;

pub use constants::*;
pub use error::GigmeshError;
pub use records::*;
pub use types::*;
