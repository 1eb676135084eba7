use futures_core::Stream;

use std::error::Error;
use std::pin::Pin;

pub use async_trait::async_trait;

/// An dynamically typed [`Stream`].
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + Sync + 'a>>;

/// An dynamically typed [`Error`].
pub type BoxError = Box<dyn Error + Send + Sync>;
