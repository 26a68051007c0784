pub mod hash;
pub mod locator;
pub mod lookup;
pub mod manifest;
pub mod provider;
pub mod resolver;
pub mod tree;
pub mod value;
