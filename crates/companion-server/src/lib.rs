pub mod configuration;
pub mod error;
pub mod routes;
pub mod serverless;
pub mod state;

#[cfg(test)]
mod test_support;
