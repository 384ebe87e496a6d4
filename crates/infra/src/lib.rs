//! Infrastructure layer: storage backends, transactional services, config,
//! external collaborators.

pub mod config;
pub mod error;
pub mod external;
pub mod services;
pub mod store;

mod postgres_integration_tests;

pub use config::{AppConfig, ConfigError};
pub use error::{ServiceError, ServiceResult};
pub use external::{
    ImageStorage, ImageType, InMemoryImageStorage, LocalImageStorage, LogNotifier, OrderNotifier,
    RecordingNotifier,
};
pub use services::{
    CartService, CatalogService, CheckoutService, ModerationService, ProductDetail, Services,
};
pub use store::{InMemoryStore, PostgresStore, Store, TxMode, UnitOfWork, connect_store};
