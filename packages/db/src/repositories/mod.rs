//! Repository implementations for database operations.

mod broker_repo;
mod job_repo;

pub use broker_repo::BrokerRepository;
pub use job_repo::JobRepository;
