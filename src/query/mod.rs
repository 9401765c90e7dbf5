pub mod packages;
pub mod monikers;

pub use packages::PackageResolver;
pub use monikers::MonikerResolver;
