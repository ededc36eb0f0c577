mod model;
mod row;
mod sql_value;
mod value;

pub use model::{ModelDescriptor, UniqueKey};
pub use row::{ColumnMetadata, RawResponse, RawRow, Record, ResultHeader};
pub use sql_value::SqlValue;
pub use value::{ByteStream, RawValue, Value};
