pub mod center;
pub mod defaults;
pub mod errors;
pub mod loader;
pub mod model;

pub use center::ConfigCenter;
pub use defaults::default_config;
pub use errors::ConfigError;
pub use loader::{load_config, load_config_with_options, LoadOptions};
pub use model::{
    CacheSection, ConfigSource, CorrelationSection, DispatcherSection, EnforcementConfig,
    LoggingSection,
};

#[cfg(test)]
mod tests;
