pub mod handlers;
pub mod middleware;
pub mod orchestrator;
pub mod routes;
pub mod transfers;

pub use routes::create_router;
