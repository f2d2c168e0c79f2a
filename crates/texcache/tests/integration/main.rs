// See <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

pub mod async_loads;
pub mod bind;
pub mod data_uri;
pub mod legacy;
pub mod sync_loads;
pub mod thumbnails;
pub mod utils;

pub use utils::*;
