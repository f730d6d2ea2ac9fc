// Analytical engines, workflows and shared errors
pub mod scoring {
    pub use crate::scoring::*;
}

pub mod investment {
    pub use crate::investment::*;
}

pub mod ratios {
    pub use crate::ratios::*;
}

pub mod orchestrator {
    pub use crate::orchestrator::*;
}

pub mod errors {
    pub use crate::errors::*;
}
