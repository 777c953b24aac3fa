//! Settings validation support.

use crate::error::ValidationError;

/// Trait for settings validation.
///
/// Implemented by [`RelaySettings`](super::RelaySettings); the loader calls it
/// after deserialization and rejects settings that fail.
///
/// # Examples
///
/// ```rust
/// use flag_relay::error::ValidationError;
/// use flag_relay::settings::Validate;
///
/// struct Timeouts {
///     send_ms: u64,
/// }
///
/// impl Validate for Timeouts {
///     fn validate(&self) -> Result<(), ValidationError> {
///         if self.send_ms == 0 {
///             return Err(ValidationError::invalid_field("send_ms", "must be greater than 0"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Validate {
    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
