pub mod fetch_attempt;
pub mod pools;
pub mod search_query;
pub mod search_result;

pub use fetch_attempt::*;
pub use pools::*;
pub use search_query::*;
pub use search_result::*;
