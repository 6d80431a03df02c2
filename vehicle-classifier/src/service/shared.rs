use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::providers::{Provider, TractProvider};

use super::{Service, ServiceBuilder, ServiceError};

type Init<P> = Box<dyn Fn() -> Result<Service<P>, ServiceError> + Send + Sync>;

/// A service that is built on first use and then shared by every caller.
///
/// Concurrent first calls wait for a single initialization. If it fails the error is
/// returned to the caller and the next call tries again.
pub struct SharedService<P = TractProvider> {
    cell: OnceCell<Arc<Service<P>>>,
    init: Init<P>,
}

impl<P> SharedService<P>
where
    P: Provider + 'static,
{
    pub fn new<F>(init: F) -> Self
    where
        F: Fn() -> Result<Service<P>, ServiceError> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            init: Box::new(init),
        }
    }

    pub fn get(&self) -> Result<Arc<Service<P>>, ServiceError> {
        self.cell
            .get_or_try_init(|| {
                log::debug!("Initializing shared service");
                (self.init)().map(Arc::new)
            })
            .map(Arc::clone)
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl SharedService<TractProvider> {
    pub fn from_builder(builder: ServiceBuilder) -> Self {
        Self::new(move || builder.clone().build())
    }
}
