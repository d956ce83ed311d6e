pub mod api;
pub mod auth;
pub mod config;
pub mod onboarding;
pub mod profile;
pub mod prompt;
pub mod records;
pub mod state;
pub mod store;
pub mod templates;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;
