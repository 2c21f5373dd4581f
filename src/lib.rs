pub mod dsl;
pub mod settings;
pub mod util;
