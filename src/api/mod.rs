mod handlers;
mod pages;
pub mod response;
mod routes;

pub use routes::create_router;
