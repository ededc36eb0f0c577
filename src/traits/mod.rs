mod driver;

pub use driver::{ConnectionPool, RawConnection};
