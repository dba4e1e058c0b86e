// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod table_handler {
    pub use crate::table_handler::*;
}

pub mod enrichment_handler {
    pub use crate::enrichment_handler::*;
}

pub mod workflow_handler {
    pub use crate::workflow_handler::*;
}

pub mod admin_handler {
    pub use crate::admin_handler::*;
}

pub mod routes {
    pub use crate::routes::*;
}
