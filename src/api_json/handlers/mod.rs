pub mod grades;
pub mod import;
pub mod links;
pub mod master;
pub mod outcomes;
pub mod reports;

pub use grades::*;
pub use import::*;
pub use links::*;
pub use master::*;
pub use outcomes::*;
pub use reports::*;
