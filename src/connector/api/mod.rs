mod router;

pub use router::{build_router, serve, AppState};
