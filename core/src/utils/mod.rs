pub mod sanitize;

pub use sanitize::{sanitize_display_name, sanitize_text};
