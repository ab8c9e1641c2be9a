pub mod cli;
pub mod gemini;
pub mod linkedin;
pub mod load_config;
pub mod mailer;

#[cfg(test)]
mod test_http;

pub use cli::{run, Cli, Commands};
