use thiserror::Error;

/// A push payload could not be turned into a canonical action.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureNormalizationError {
    #[error("captured payload is not a JSON object")]
    NotAnObject,
    #[error("captured payload has no action name")]
    MissingActionName,
    #[error("captured action '{0}' is not reconstructable")]
    UnsupportedAction(String),
}
