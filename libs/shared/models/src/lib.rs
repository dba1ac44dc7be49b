pub mod events;
pub mod incident;
pub mod monitor;

pub use events::*;
pub use incident::*;
pub use monitor::*;
