//! Input side of a pipeline stage.
//!
//! The [`Input`] trait names the item type a stage consumes and the stream
//! type it receives. Stages in this crate consume `Message<T>` items so the
//! sequence number of the originating bus message travels with every
//! derived item.

use futures::Stream;
// Import for rustdoc link
#[allow(unused_imports)]
use crate::output::Output;

/// Trait for stages that consume an input stream.
///
/// Paired with [`Output`] so that connecting two stages type-checks the
/// item type flowing between them.
pub trait Input
where
  Self::Input: Send + 'static,
{
  /// The type of items consumed by this stage.
  type Input;
  /// The input stream type that yields items of type `Self::Input`.
  type InputStream: Stream<Item = Self::Input> + Send + 'static;
}
