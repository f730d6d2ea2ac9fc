//! External service integrations.

pub mod services {
    pub use crate::services::*;
}

pub mod narrative {
    pub use crate::narrative::*;
}
