pub mod messaging;
pub mod repository;

pub use messaging::nats::NatsMessageBus;
pub use repository::HttpRecordRepository;
