use thiserror::Error;

/// Policy gate failures for specialist routing.
///
/// These are recoverable by design: the decision engine converts them into a
/// System-labeled entry in the turn result instead of making the call. The
/// `Display` strings are shown to the customer verbatim, so they must stay
/// free of internal jargon.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("product not yet agreed - cannot offer insurance")]
    ProductNotAgreed,
    #[error("product price not confirmed - cannot calculate a premium")]
    PriceNotConfirmed,
    #[error("product model not confirmed - please confirm the selected model before insurance")]
    ModelNotConfirmed,
}
