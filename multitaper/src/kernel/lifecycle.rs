use super::ConfigError;

/// Constructor validation lifecycle shared by configurable estimators.
///
/// Every estimator in this crate is built from a plain config struct. Validation
/// and defaulting happen once in [`KernelLifecycle::try_new`]; a constructed value
/// is assumed to satisfy its invariants for the rest of its lifetime.
pub trait KernelLifecycle: Sized {
    /// Kernel config type.
    type Config;

    /// Construct a validated kernel from config.
    fn try_new(config: Self::Config) -> Result<Self, ConfigError>;
}
