//! Configuration loading for the `vigil` binary

use vigil_types::EngineConfig;

/// Environment prefix; `VIGIL__SCORING__WINDOW_MS=20000` overrides `scoring.window_ms`.
pub const ENV_PREFIX: &str = "VIGIL";

/// Load the engine configuration: built-in defaults, then the file at
/// `path` if given, then environment overrides.
pub fn load(path: Option<&str>) -> Result<EngineConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    builder = builder.add_source(config::Config::try_from(&EngineConfig::default())?);

    if let Some(path) = path {
        builder = builder.add_source(config::File::with_name(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
