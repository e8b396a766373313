pub mod event;
pub mod harvest;
pub mod proxy;
pub mod validation;

pub use event::*;
pub use harvest::*;
pub use proxy::*;
pub use validation::*;
