//! Output side of a pipeline stage.
//!
//! The [`Output`] trait names the item type a stage produces and the stream
//! type it returns.

// Import for rustdoc links
#[allow(unused_imports)]
use crate::input::Input;

use futures::Stream;

/// Trait for stages that produce an output stream.
pub trait Output
where
  Self::Output: Send + 'static,
{
  /// The type of items produced by this stage.
  type Output;
  /// The output stream type that yields items of type `Self::Output`.
  type OutputStream: Stream<Item = Self::Output> + Send + 'static;
}
