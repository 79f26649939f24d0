pub mod formatter;

pub use formatter::{MAX_NAME_LEN, format_name};
