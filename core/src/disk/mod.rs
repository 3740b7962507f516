pub mod cursor;
pub mod discovery;
pub mod gpt_ops;

pub use cursor::BlockCursor;
