mod tokio_postgres;

pub use self::in_memory_test::{InMemoryTestPool, InMemoryTestResponseBuilder, RecordedQuery};
pub use self::tokio_postgres::TokioPostgresPool;
