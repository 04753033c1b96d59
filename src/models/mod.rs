pub mod record;
pub mod status;

pub use record::Record;
pub use status::Status;
