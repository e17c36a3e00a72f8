pub mod command;
pub mod native_libs;
pub mod permissions;
pub mod secrets;

pub use command::CommandAnalyzer;
pub use native_libs::NativeLibsAnalyzer;
pub use permissions::PermissionsAnalyzer;
pub use secrets::SecretsAnalyzer;
