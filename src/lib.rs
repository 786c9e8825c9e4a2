// Library entrypoint for the CLI binary and integration tests.
pub mod config;
pub mod graphql;
pub mod mastra;
pub mod schemas;
pub mod session;
pub mod stream;
pub mod travel;
