pub mod youless_http;

pub use youless_http::YoulessHttpSource;
