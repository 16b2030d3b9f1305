mod token_client_http;

pub use token_client_http::*;
