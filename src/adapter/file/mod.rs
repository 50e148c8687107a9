pub mod backend;
pub mod line_format;

pub use backend::FileBackend;
