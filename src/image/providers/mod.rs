//! Image service implementations.

mod gemini;

pub use gemini::{
    GeminiProvider, GeminiProviderBuilder, API_KEY_ENV_VARS, BASE_URL_ENV_VAR, DEFAULT_BASE_URL,
};
