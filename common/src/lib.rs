pub mod file_format;
pub mod log_setup;

pub use file_format::{FileFormat, load_file, save_file};
