pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod threads;
pub mod torznab;

#[cfg(test)]
pub(crate) mod test_support;

pub use routes::create_router;
