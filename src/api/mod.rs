mod errors;
mod routes;

pub use routes::router;
