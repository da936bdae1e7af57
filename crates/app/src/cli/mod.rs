pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Cache, Decrypt, Encrypt, Init, Keys, Lookup, Publish, Version};
