use crate::bounded::async_trait;
use crate::error::Rejection;
use crate::Context;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Loads the user of type `U` that made a request.
///
/// Fetchers are registered on the [`App`](crate::App) and made
/// available to interceptors and handlers through
/// [`Context::user_fetcher`]; the context never calls them itself.
#[async_trait]
pub trait UserFetcher<U>: Send + Sync + 'static
where
    U: Send + 'static,
{
    async fn fetch(&self, cx: &Context) -> Result<Option<U>, Rejection>;
}

/// Registered user fetchers, keyed by the user type they produce.
#[derive(Default)]
pub struct UserFetchers {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl UserFetchers {
    pub fn insert<U, F>(&mut self, fetcher: F)
    where
        U: Send + 'static,
        F: UserFetcher<U>,
    {
        let fetcher: Arc<dyn UserFetcher<U>> = Arc::new(fetcher);
        self.map.insert(TypeId::of::<U>(), Box::new(fetcher));
    }

    pub fn get<U>(&self) -> Option<&dyn UserFetcher<U>>
    where
        U: Send + 'static,
    {
        self.map
            .get(&TypeId::of::<U>())?
            .downcast_ref::<Arc<dyn UserFetcher<U>>>()
            .map(|fetcher| &**fetcher)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
